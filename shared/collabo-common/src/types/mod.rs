//! Shared domain types.

mod board;
mod principal;

pub use board::*;
pub use principal::*;
