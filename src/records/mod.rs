//! Record types and container for collaborator results
//!
//! Defines the common record shape every collaborator adapter normalizes into,
//! the scored form produced by the relevance matcher, and per-source metadata.

mod container;
mod types;

pub use container::{DuplicateCase, RecordContainer};
pub use types::*;
