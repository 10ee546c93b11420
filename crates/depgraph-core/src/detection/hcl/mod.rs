pub mod expr;
pub mod module_source;
pub mod terraform;

pub use expr::{collect_references, parse_expr, Expr, DEFAULT_MAX_DEPTH};
pub use module_source::{classify_module_source, parse_version_constraints, ModuleSource, VersionConstraint};
pub use terraform::{detect_file as detect_terraform_file, parse_blocks, TfBlock, TfBlockKind};
