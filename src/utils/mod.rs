//! Utility functions and helpers
//!
//! This module contains timestamp parsing and id helpers.

pub mod time;

pub use time::{parse_timestamp, update_id};
