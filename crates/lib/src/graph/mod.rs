//! The declared target graph.
//!
//! Nodes are unflavored targets with their kind-specific arguments, as produced
//! by whatever parses build files. The graph is immutable once handed to a
//! resolver; flavored targets are never nodes, they are views the resolver
//! derives from a node.

mod args;
mod types;

pub use args::*;
pub use types::*;
