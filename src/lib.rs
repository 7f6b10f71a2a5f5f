//! Power meter library
//!
//! Calendar scheduling, cascading rollups and retention for a pulse-based
//! energy meter. Exposed as a library for the binaries and for tests.

pub mod core;
pub mod db;
pub mod meter;
pub mod rollup;
pub mod schedule;
