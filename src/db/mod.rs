//! Database module for plugwatch.
//!
//! Provides SQLite storage with embedded migrations.

mod models;
mod store;

pub use models::*;
pub use store::*;
