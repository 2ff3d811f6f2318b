//! Trace parsing.
//!
//! Turns the raw text captured on one host into typed [`EventRecord`]s, one per
//! line, keeping the order in which the lines were captured.

pub mod parser;
pub mod types;

pub use parser::TraceParser;
pub use types::{Direction, EventRecord};
