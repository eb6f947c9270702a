//! plugwatch: smart-plug telemetry poller and status/energy analysis.
//!
//! The binary wires these modules together; the library is exposed so the
//! analysis engine and store can be exercised directly.

pub mod analysis;
pub mod config;
pub mod db;
pub mod scheduler;
pub mod telemetry;
pub mod web;
