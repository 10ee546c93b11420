pub mod config;
pub mod detection;
pub mod error;
pub mod events;
pub mod index;
pub mod model;
pub mod persistence;
pub mod queue;
pub mod retry;
pub mod rollup;

pub use error::{DepGraphError, ErrorCategory, Result, Severity};
pub use model::{DependencyGraph, Edge, EdgeKind, Node, NodeKind};
