// Core infrastructure shared by registry, context and invocation layers

pub mod config;
pub mod errors;
pub mod telemetry;

pub use config::{CandidatePolicy, DacConfig, LogConfig};
pub use errors::{DacError, LoadError, Result};
pub use telemetry::init_tracing;
