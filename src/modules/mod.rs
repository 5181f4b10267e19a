//! Built-in analysis modules. Each registers its types into
//! [`PLUGINS`](crate::registry::PLUGINS) at link time.

pub mod base;
pub mod drivetrain;
pub mod nvh;
pub mod timedata;

/// Registry document used when no registry file is configured
pub const DEFAULT_REGISTRY: &str = include_str!("registry.yaml");
