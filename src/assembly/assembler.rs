use crate::data::{FlowKind, NodeKey, Process};
use crate::error::SamplingError;
use crate::sampling::{SamplingTarget, Samples};
use serde::Serialize;
use std::fmt;

/// Matrix identity of a sampled row
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MatrixIndex {
    /// Exchange with the environment: (elementary flow, process)
    Elementary { flow: NodeKey, process: NodeKey },
    /// Exchange between processes: (source, destination, kind)
    Technosphere {
        input: NodeKey,
        output: NodeKey,
        kind: FlowKind,
    },
}

impl MatrixIndex {
    pub fn block_kind(&self) -> BlockKind {
        match self {
            MatrixIndex::Elementary { .. } => BlockKind::Biosphere,
            MatrixIndex::Technosphere { .. } => BlockKind::Technosphere,
        }
    }

    /// Flat `(row, column, kind)` form used by packaged indices
    pub fn to_triple(&self) -> (&NodeKey, &NodeKey, &'static str) {
        match self {
            MatrixIndex::Elementary { flow, process } => (flow, process, FlowKind::Biosphere.as_str()),
            MatrixIndex::Technosphere { input, output, kind } => (input, output, kind.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Biosphere,
    Technosphere,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Biosphere => "biosphere",
            BlockKind::Technosphere => "technosphere",
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rows of one dimensionality with their indices, in matching order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixBlock {
    pub kind: BlockKind,
    pub indices: Vec<MatrixIndex>,
    pub samples: Vec<Vec<f64>>,
}

impl MatrixBlock {
    pub fn new(kind: BlockKind) -> Self {
        Self {
            kind,
            indices: Vec::new(),
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, index: MatrixIndex, row: Vec<f64>) {
        self.indices.push(index);
        self.samples.push(row);
    }

    pub fn append(&mut self, other: MatrixBlock) {
        self.indices.extend(other.indices);
        self.samples.extend(other.samples);
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Row length, if any row is present
    pub fn iterations(&self) -> Option<usize> {
        self.samples.first().map(Vec::len)
    }
}

/// Maps materialized rows back to matrix identities
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultAssembler;

impl ResultAssembler {
    pub fn new() -> Self {
        Self
    }

    /// One block per kind that has rows, biosphere first, rows in flow order
    pub fn assemble(&self, process: &Process, samples: &Samples) -> Result<Vec<MatrixBlock>, SamplingError> {
        let mut biosphere = MatrixBlock::new(BlockKind::Biosphere);
        let mut technosphere = MatrixBlock::new(BlockKind::Technosphere);

        for (index, flow) in process.flows.iter().enumerate() {
            if flow.formula.active().is_none() {
                continue;
            }
            let name = SamplingTarget::flow_name(index);
            let row = samples
                .row(&name)
                .ok_or(SamplingError::MissingRow(name))?
                .to_vec();

            match flow.kind {
                FlowKind::Biosphere => biosphere.push(
                    MatrixIndex::Elementary {
                        flow: flow.input.clone(),
                        process: flow.output.clone(),
                    },
                    row,
                ),
                kind => technosphere.push(
                    MatrixIndex::Technosphere {
                        input: flow.input.clone(),
                        output: flow.output.clone(),
                        kind,
                    },
                    row,
                ),
            }
        }

        Ok([biosphere, technosphere]
            .into_iter()
            .filter(|b| !b.is_empty())
            .collect())
    }
}

/// Blocks accumulated across processes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatrixCollection {
    biosphere: MatrixBlock,
    technosphere: MatrixBlock,
}

impl Default for MatrixCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl MatrixCollection {
    pub fn new() -> Self {
        Self {
            biosphere: MatrixBlock::new(BlockKind::Biosphere),
            technosphere: MatrixBlock::new(BlockKind::Technosphere),
        }
    }

    /// Append blocks; order across calls carries no meaning
    pub fn extend(&mut self, blocks: impl IntoIterator<Item = MatrixBlock>) {
        for block in blocks {
            match block.kind {
                BlockKind::Biosphere => self.biosphere.append(block),
                BlockKind::Technosphere => self.technosphere.append(block),
            }
        }
    }

    pub fn block(&self, kind: BlockKind) -> &MatrixBlock {
        match kind {
            BlockKind::Biosphere => &self.biosphere,
            BlockKind::Technosphere => &self.technosphere,
        }
    }

    pub fn blocks(&self) -> impl Iterator<Item = &MatrixBlock> {
        [&self.biosphere, &self.technosphere].into_iter()
    }

    pub fn row_count(&self) -> usize {
        self.biosphere.len() + self.technosphere.len()
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    pub fn iterations(&self) -> Option<usize> {
        self.biosphere.iterations().or_else(|| self.technosphere.iterations())
    }
}
