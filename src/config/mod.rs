//! Configuration
//!
//! `CoordinationConfig` gathers everything a cluster process needs to reach the
//! store and lay out its namespace. Values come from defaults, a TOML file or
//! `COORD_*` environment variables.

pub mod types;

pub use types::CoordinationConfig;

#[cfg(test)]
mod tests;
