//! Abuse gate for high-frequency content actions.
//!
//! Three gates run in order: minimum spacing, sliding-window volume and
//! duplicate content. State lives in memory per process.

pub mod config;
pub mod guard;
pub mod types;

pub use config::*;
pub use guard::{normalize, RateGuard};
pub use types::*;
