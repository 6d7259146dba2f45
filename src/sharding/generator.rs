use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

/// Computes the shard a record is routed to.
///
/// Implementations must be deterministic: the same record and shard count
/// always give the same key, and the key names one of `0..shard_count`.
pub trait ShardKeyGenerator: Send + Sync {
    fn shard_key(&self, key: &[u8], value: &[u8], shard_count: u32) -> String;
}

fn bucket(bytes: &[u8], shard_count: u32) -> u32 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    (hasher.finish() % shard_count.max(1) as u64) as u32
}

/// Routes by the record key.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyHashGenerator;

impl ShardKeyGenerator for KeyHashGenerator {
    fn shard_key(&self, key: &[u8], _value: &[u8], shard_count: u32) -> String {
        bucket(key, shard_count).to_string()
    }
}

/// Routes by the record value, spreading records that share a key.
#[derive(Debug, Default, Clone, Copy)]
pub struct ValueHashGenerator;

impl ShardKeyGenerator for ValueHashGenerator {
    fn shard_key(&self, _key: &[u8], value: &[u8], shard_count: u32) -> String {
        bucket(value, shard_count).to_string()
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardKeyStrategy {
    #[default]
    KeyHash,
    ValueHash,
}

impl ShardKeyStrategy {
    pub fn generator(&self) -> Arc<dyn ShardKeyGenerator> {
        match self {
            ShardKeyStrategy::KeyHash => Arc::new(KeyHashGenerator),
            ShardKeyStrategy::ValueHash => Arc::new(ValueHashGenerator),
        }
    }
}

impl FromStr for ShardKeyStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "key_hash" | "key" => Ok(ShardKeyStrategy::KeyHash),
            "value_hash" | "value" => Ok(ShardKeyStrategy::ValueHash),
            other => Err(format!("unknown shard key strategy '{}'", other)),
        }
    }
}

/// A generator bound to a shard count.
#[derive(Clone)]
pub struct ShardSelector {
    generator: Arc<dyn ShardKeyGenerator>,
    shard_count: u32,
}

impl ShardSelector {
    pub fn new(generator: Arc<dyn ShardKeyGenerator>, shard_count: u32) -> Self {
        tracing::debug!("Shard selector uses {} shards", shard_count);
        Self {
            generator,
            shard_count,
        }
    }

    pub fn from_config(config: &crate::config::CoordinationConfig) -> Self {
        Self::new(config.shard_key_strategy.generator(), config.shard_count)
    }

    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    pub fn select(&self, key: &[u8], value: &[u8]) -> String {
        self.generator.shard_key(key, value, self.shard_count)
    }
}
