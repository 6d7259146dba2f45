//! Shard Key Selection
//!
//! Decides which shard a record belongs to. The strategy is a capability
//! trait picked from configuration at startup.
//!
//! ## Submodules
//! - **`generator`**: `ShardKeyGenerator` and the built-in strategies.

pub mod generator;

pub use generator::{
    KeyHashGenerator, ShardKeyGenerator, ShardKeyStrategy, ShardSelector, ValueHashGenerator,
};
