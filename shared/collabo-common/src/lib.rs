//! Collabo Common Library
//!
//! Domain types shared by the access core and the store adapters that back it.

pub mod types;

pub use types::*;
