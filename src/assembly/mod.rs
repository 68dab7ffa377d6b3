pub mod assembler;
pub mod package;

pub use assembler::{BlockKind, MatrixBlock, MatrixCollection, MatrixIndex, ResultAssembler};
pub use package::{PackageOptions, PackageResource, SamplePackage};
