//! Types and policies shared by the oxtel agent crates.

pub mod backoff;
pub mod types;
