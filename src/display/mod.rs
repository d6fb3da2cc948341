//! Display formatting for terminal output
//!
//! Provides utilities for formatting snapshots and backup plans for terminal
//! display.

pub mod snapshot;

pub use snapshot::{format_plan, format_snapshot_list};
