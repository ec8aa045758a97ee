//! Assessment orchestration module
//!
//! Fans a query out to every collaborator under a global deadline,
//! merges and scores the results, and hands them to the aggregator.

mod cancel;
mod executor;
mod models;

pub use cancel::CancelToken;
pub use executor::Assessor;
pub use models::*;
