use super::process::{ElementaryFlow, Process};
use super::types::NodeKey;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// On-disk shape of an inventory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct InventoryFile {
    #[serde(default)]
    processes: Vec<Process>,
    #[serde(default)]
    elementary_flows: Vec<ElementaryFlow>,
}

/// In-memory store of processes and elementary flows, indexed by key
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "InventoryFile", into = "InventoryFile")]
pub struct Inventory {
    processes: Vec<Process>,
    elementary_flows: Vec<ElementaryFlow>,
    process_index: HashMap<NodeKey, usize>,
    elementary_index: HashMap<NodeKey, usize>,
}

impl From<InventoryFile> for Inventory {
    fn from(file: InventoryFile) -> Self {
        Inventory::new(file.processes, file.elementary_flows)
    }
}

impl From<Inventory> for InventoryFile {
    fn from(inventory: Inventory) -> Self {
        InventoryFile {
            processes: inventory.processes,
            elementary_flows: inventory.elementary_flows,
        }
    }
}

impl Inventory {
    pub fn new(processes: Vec<Process>, elementary_flows: Vec<ElementaryFlow>) -> Self {
        let mut inventory = Self::default();
        for process in processes {
            inventory.add_process(process);
        }
        for flow in elementary_flows {
            inventory.add_elementary_flow(flow);
        }
        inventory
    }

    /// Load an inventory from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading inventory {}", path.display()))?;
        let inventory: Inventory = serde_json::from_str(&contents)
            .with_context(|| format!("parsing inventory {}", path.display()))?;
        Ok(inventory)
    }

    /// Write the inventory back to a JSON file
    pub fn save_json_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)
            .with_context(|| format!("writing inventory {}", path.as_ref().display()))?;
        Ok(())
    }

    /// Insert a process, replacing any process with the same key
    pub fn add_process(&mut self, process: Process) {
        match self.process_index.get(&process.key) {
            Some(&idx) => self.processes[idx] = process,
            None => {
                self.process_index.insert(process.key.clone(), self.processes.len());
                self.processes.push(process);
            }
        }
    }

    pub fn add_elementary_flow(&mut self, flow: ElementaryFlow) {
        match self.elementary_index.get(&flow.key) {
            Some(&idx) => self.elementary_flows[idx] = flow,
            None => {
                self.elementary_index.insert(flow.key.clone(), self.elementary_flows.len());
                self.elementary_flows.push(flow);
            }
        }
    }

    pub fn has_database(&self, name: &str) -> bool {
        self.processes.iter().any(|p| p.key.database == name)
            || self.elementary_flows.iter().any(|f| f.key.database == name)
    }

    pub fn process(&self, key: &NodeKey) -> Option<&Process> {
        self.process_index.get(key).map(|&idx| &self.processes[idx])
    }

    pub fn process_mut(&mut self, key: &NodeKey) -> Option<&mut Process> {
        let idx = *self.process_index.get(key)?;
        self.processes.get_mut(idx)
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    pub fn processes_in<'a>(&'a self, database: &'a str) -> impl Iterator<Item = &'a Process> + 'a {
        self.processes.iter().filter(move |p| p.key.database == database)
    }

    /// Disjoint mutable borrows of every process of a database
    pub fn processes_in_mut(&mut self, database: &str) -> Vec<&mut Process> {
        self.processes
            .iter_mut()
            .filter(|p| p.key.database == database)
            .collect()
    }

    pub fn process_keys_in(&self, database: &str) -> Vec<NodeKey> {
        self.processes_in(database).map(|p| p.key.clone()).collect()
    }

    pub fn elementary_flow(&self, key: &NodeKey) -> Option<&ElementaryFlow> {
        self.elementary_index.get(key).map(|&idx| &self.elementary_flows[idx])
    }

    pub fn elementary_flows_in<'a>(
        &'a self,
        database: &'a str,
    ) -> impl Iterator<Item = &'a ElementaryFlow> + 'a {
        self.elementary_flows.iter().filter(move |f| f.key.database == database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ElementaryKind, Flow, FlowKind};

    fn sample_inventory() -> Inventory {
        let a = NodeKey::new("db", "A");
        let water = NodeKey::new("biosphere", "water in");
        let process = Process::new(a.clone(), "process A", "product A", 1.0, "kilogram").with_flow(
            Flow::new(water.clone(), a, FlowKind::Biosphere, "kilogram", 1.0).with_formula("H2O"),
        );
        let ef = ElementaryFlow::new(water, "Water, from nature", ElementaryKind::NaturalResource, "kilogram");
        Inventory::new(vec![process], vec![ef])
    }

    #[test]
    fn test_lookup_by_key() {
        let inventory = sample_inventory();
        assert!(inventory.process(&NodeKey::new("db", "A")).is_some());
        assert!(inventory.process(&NodeKey::new("db", "B")).is_none());
        assert!(inventory.has_database("biosphere"));
        assert!(!inventory.has_database("other"));
        assert_eq!(inventory.process_keys_in("db"), vec![NodeKey::new("db", "A")]);
    }

    #[test]
    fn test_add_process_replaces_existing() {
        let mut inventory = sample_inventory();
        let key = NodeKey::new("db", "A");
        inventory.add_process(Process::new(key.clone(), "renamed", "product A", 1.0, "kilogram"));
        assert_eq!(inventory.processes().len(), 1);
        assert_eq!(inventory.process(&key).unwrap().name, "renamed");
    }

    #[test]
    fn test_json_round_trip_rebuilds_index() {
        let inventory = sample_inventory();
        let json = serde_json::to_string(&inventory).unwrap();
        let loaded: Inventory = serde_json::from_str(&json).unwrap();
        let process = loaded.process(&NodeKey::new("db", "A")).unwrap();
        assert_eq!(process.flows[0].formula.host_formula(), Some("H2O"));
        assert!(loaded.elementary_flow(&NodeKey::new("biosphere", "water in")).is_some());
    }

    #[test]
    fn test_save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventory.json");
        sample_inventory().save_json_file(&path).unwrap();
        let loaded = Inventory::from_json_file(&path).unwrap();
        assert_eq!(loaded.processes().len(), 1);
    }
}
