//! Telemetry agent: samples metrics on one cadence and delivers them in
//! compressed, signed batches on another.

pub mod config;
pub mod delivery;
pub mod envelope;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod scheduler;
pub mod transport;
