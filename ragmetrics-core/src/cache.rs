// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Process-wide cache of constructed clients.
//!
//! Entries are keyed by a SHA-256 fingerprint of the resolved
//! [`EffectiveConfig`] and the credential, so any change to an input
//! source produces a new key and the stale entry simply ages out.
//! Population races are last-write-wins.

use crate::assembler::EffectiveConfig;
use crate::error::Result;
use crate::llm_client::{EmbeddingClient, LLMClient};
use crate::secrets::ApiKey;
use moka::sync::Cache;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cache for LLM and embedding client handles
pub struct ClientCache {
    llm: Cache<String, Arc<dyn LLMClient>>,
    embedding: Cache<String, Arc<dyn EmbeddingClient>>,
    hits: Arc<AtomicU64>,
    misses: Arc<AtomicU64>,
}

impl ClientCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        Self {
            llm: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
            embedding: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
            hits: Arc::new(AtomicU64::new(0)),
            misses: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Cache key for a resolved config and its credential
    pub fn fingerprint(config: &EffectiveConfig, api_key: &ApiKey) -> String {
        let mut hasher = Sha256::new();
        // EffectiveConfig serializes deterministically (BTreeMap extras)
        hasher.update(serde_json::to_vec(config).unwrap_or_default());
        hasher.update([0u8]);
        hasher.update(api_key.expose().as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn get_or_build_llm<F>(&self, key: String, build: F) -> Result<Arc<dyn LLMClient>>
    where
        F: FnOnce() -> Result<Arc<dyn LLMClient>>,
    {
        if let Some(client) = self.llm.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(client);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let client = build()?;
        self.llm.insert(key, client.clone());
        Ok(client)
    }

    pub fn get_or_build_embedding<F>(
        &self,
        key: String,
        build: F,
    ) -> Result<Arc<dyn EmbeddingClient>>
    where
        F: FnOnce() -> Result<Arc<dyn EmbeddingClient>>,
    {
        if let Some(client) = self.embedding.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(client);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let client = build()?;
        self.embedding.insert(key, client.clone());
        Ok(client)
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            hits,
            misses,
            hit_rate: if total > 0 {
                hits as f64 / total as f64
            } else {
                0.0
            },
        }
    }
}

impl Default for ClientCache {
    fn default() -> Self {
        Self::new(256, Duration::from_secs(300))
    }
}

/// Cache statistics
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}
