//! Callgraph construction.
//!
//! [`ServiceResolver`] names the well-known ports, [`CallgraphBuilder`] folds
//! event records into a deduplicated [`CallGraph`], which renders to DOT.

pub mod builder;
pub mod resolver;

pub use builder::{CallGraph, CallgraphBuilder, Edge};
pub use resolver::ServiceResolver;
