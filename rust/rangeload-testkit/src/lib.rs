//! Test utilities for the rangeload workspace.
//!
//! - Synthetic schemas, rows and CSV files
//! - Store wrappers that record or fail store calls
//! - Helpers that read segment files back

pub mod data_gen;
pub mod readback;
pub mod stores;
