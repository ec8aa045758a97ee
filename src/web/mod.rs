//! Web server module
//!
//! Provides the HTTP API in front of the assessor.

mod handlers;
mod routes;
mod state;

pub use handlers::AssessRequest;
pub use routes::create_router;
pub use state::AppState;
