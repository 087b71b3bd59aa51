//! Sandbox selection: maps a request to one name in a fixed-size pool.

use crate::config::PoolConfig;
use crate::types::ExecutionRequest;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Placement policy for [`SandboxSelector`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    /// Uniform random draw; ignores caller and code identity.
    #[default]
    Random,
    /// Cycles through the pool in order.
    RoundRobin,
    /// Stable mapping by caller id, falling back to the code digest.
    Hash,
}

/// A selected pool member.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SandboxId {
    pub name: String,
    /// Shard index in `1..=pool_size`.
    pub index: u32,
}

impl fmt::Display for SandboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

pub struct SandboxSelector {
    prefix: String,
    pool_size: u32,
    strategy: SelectionStrategy,
    next: AtomicU32,
}

impl SandboxSelector {
    /// `pool_size` of zero is treated as one.
    pub fn new(prefix: impl Into<String>, pool_size: u32, strategy: SelectionStrategy) -> Self {
        Self {
            prefix: prefix.into(),
            pool_size: pool_size.max(1),
            strategy,
            next: AtomicU32::new(0),
        }
    }

    pub fn from_config(config: &PoolConfig) -> Self {
        Self::new(config.prefix.clone(), config.size, config.strategy)
    }

    pub fn pool_size(&self) -> u32 {
        self.pool_size
    }

    pub fn strategy(&self) -> SelectionStrategy {
        self.strategy
    }

    /// Pick the instance that will serve `request`.
    pub fn select(&self, request: &ExecutionRequest) -> SandboxId {
        let index = match self.strategy {
            SelectionStrategy::Random => rand::random_range(1..=self.pool_size),
            SelectionStrategy::RoundRobin => {
                self.next.fetch_add(1, Ordering::Relaxed) % self.pool_size + 1
            }
            SelectionStrategy::Hash => {
                let key = request.user_id.as_deref().unwrap_or(&request.code);
                hash_index(key, self.pool_size)
            }
        };
        self.id(index)
    }

    fn id(&self, index: u32) -> SandboxId {
        SandboxId {
            name: format!("{}-{index}", self.prefix),
            index,
        }
    }
}

fn hash_index(key: &str, pool_size: u32) -> u32 {
    let digest = Sha256::digest(key.as_bytes());
    let mut head = [0u8; 4];
    head.copy_from_slice(&digest[..4]);
    u32::from_be_bytes(head) % pool_size + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Language;
    use std::collections::HashMap;

    fn request(code: &str) -> ExecutionRequest {
        ExecutionRequest::new(code, Language::Python)
    }

    #[test]
    fn random_selection_stays_in_range_and_is_uniform() {
        let selector = SandboxSelector::new("executron", 3, SelectionStrategy::Random);
        let req = request("return 1");
        let trials = 10_000;

        let mut counts: HashMap<u32, u32> = HashMap::new();
        for _ in 0..trials {
            let id = selector.select(&req);
            assert!((1..=3).contains(&id.index));
            assert_eq!(id.name, format!("executron-{}", id.index));
            *counts.entry(id.index).or_default() += 1;
        }

        assert_eq!(counts.len(), 3);
        // Expected ~3333 each, standard deviation ~47.
        for (index, count) in counts {
            assert!(
                (2_933..=3_733).contains(&count),
                "index {index} drawn {count} times"
            );
        }
    }

    #[test]
    fn random_selection_ignores_caller() {
        let selector = SandboxSelector::new("executron", 3, SelectionStrategy::Random);
        let req = request("x").with_user_id("alice");
        let seen: std::collections::HashSet<u32> =
            (0..200).map(|_| selector.select(&req).index).collect();
        assert!(seen.len() > 1);
    }

    #[test]
    fn round_robin_cycles_through_pool() {
        let selector = SandboxSelector::new("sb", 3, SelectionStrategy::RoundRobin);
        let req = request("x");
        let picks: Vec<u32> = (0..7).map(|_| selector.select(&req).index).collect();
        assert_eq!(picks, vec![1, 2, 3, 1, 2, 3, 1]);
    }

    #[test]
    fn hash_selection_is_stable_per_caller() {
        let selector = SandboxSelector::new("executron", 5, SelectionStrategy::Hash);
        let a = request("print(1)").with_user_id("alice");
        let b = request("print(2)").with_user_id("alice");
        assert_eq!(selector.select(&a), selector.select(&b));

        let anon = request("print(3)");
        let first = selector.select(&anon);
        for _ in 0..10 {
            assert_eq!(selector.select(&anon), first);
        }
        assert!((1..=5).contains(&first.index));
    }

    #[test]
    fn hash_selection_spreads_keys() {
        let selector = SandboxSelector::new("executron", 4, SelectionStrategy::Hash);
        let seen: std::collections::HashSet<u32> = (0..100)
            .map(|i| selector.select(&request("x").with_user_id(format!("user-{i}"))).index)
            .collect();
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn zero_pool_size_is_clamped() {
        let selector = SandboxSelector::new("executron", 0, SelectionStrategy::Random);
        assert_eq!(selector.pool_size(), 1);
        assert_eq!(selector.select(&request("x")).name, "executron-1");
    }

    #[test]
    fn from_config_uses_prefix_and_size() {
        let config = PoolConfig {
            prefix: "runner".into(),
            size: 2,
            strategy: SelectionStrategy::RoundRobin,
        };
        let selector = SandboxSelector::from_config(&config);
        assert_eq!(selector.strategy(), SelectionStrategy::RoundRobin);
        assert_eq!(selector.select(&request("x")).name, "runner-1");
        assert_eq!(selector.select(&request("x")).name, "runner-2");
    }

    #[test]
    fn hash_index_covers_whole_pool() {
        let seen: std::collections::HashSet<u32> =
            (0..200).map(|i| hash_index(&format!("key-{i}"), 7)).collect();
        assert_eq!(seen, (1..=7).collect());
        assert_eq!(hash_index("anything", 1), 1);
    }
}
