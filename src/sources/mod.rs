//! Collaborator module
//!
//! Defines the collaborator contracts, one adapter per contract, the HTTP
//! implementations behind them and a registry for all configured sources.

mod adapters;
mod loader;
mod registry;
mod traits;

// Collaborator implementations
pub mod crawler;
pub mod google_news;
pub mod kvk;
pub mod openai;
pub mod rechtspraak;

pub use adapters::{
    synthetic_case_id, LegalSource, NewsSource, RegistrySource, SourceMeta, WebSource,
};
pub use loader::SourceLoader;
pub use registry::SourceRegistry;
pub use traits::*;

/// Rate-limit and metrics namespace of the scoring service
pub const SCORING_SOURCE: &str = "scoring";
