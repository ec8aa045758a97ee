//! HTTP networking module
//!
//! Provides the HTTP client used by the collaborator implementations and
//! the robots.txt rules the crawler obeys.

mod client;
mod robots;

pub use client::{classify_status, HttpClient};
pub use robots::RobotsRules;
