// Copyright 2025 KubePath (https://github.com/kubepath)
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

//! ID resolution cache.
//!
//! Maps a semantic key (e.g. `identity:name@namespace`) to the object
//! identifier assigned when the record entered the store. Entries are
//! write-once within a run; the test-and-set write mode lets callers turn
//! an accidental second write into a hard error instead of a logged
//! overwrite.
//!
//! Reads are concurrent; writes serialize under one lock per shard.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

use crate::error::{KubepathError, Result};
use crate::object_id::ObjectId;

/// Semantic domains the cache is sharded by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheShard {
    Node,
    Role,
    Identity,
    Container,
    PodIdentity,
    ObjectIdMap,
}

impl CacheShard {
    pub const ALL: [CacheShard; 6] = [
        CacheShard::Node,
        CacheShard::Role,
        CacheShard::Identity,
        CacheShard::Container,
        CacheShard::PodIdentity,
        CacheShard::ObjectIdMap,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheShard::Node => "node",
            CacheShard::Role => "role",
            CacheShard::Identity => "identity",
            CacheShard::Container => "container",
            CacheShard::PodIdentity => "pod-identity",
            CacheShard::ObjectIdMap => "object-id-mapping",
        }
    }
}

impl fmt::Display for CacheShard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic key constructors, one per shard's key scheme.
pub mod keys {
    /// Node shard: keyed by node name (nodes are cluster-scoped).
    pub fn node(name: &str) -> String {
        name.to_string()
    }

    /// Role shard: `namespace#role-name`; cluster-scoped roles use an
    /// empty namespace segment.
    pub fn role(namespace: &str, name: &str) -> String {
        format!("{namespace}#{name}")
    }

    /// Identity shard: `namespace#identity-name`.
    pub fn identity(namespace: &str, name: &str) -> String {
        format!("{namespace}#{name}")
    }

    /// Container shard: `namespace#pod#container`.
    pub fn container(namespace: &str, pod: &str, container: &str) -> String {
        format!("{namespace}#{pod}#{container}")
    }

    /// Pod-identity shard: `namespace#pod`.
    pub fn pod_identity(namespace: &str, pod: &str) -> String {
        format!("{namespace}#{pod}")
    }

    /// Object-id mapping shard: keyed by the source object id's hex form.
    pub fn object_id(source: &crate::object_id::ObjectId) -> String {
        source.to_hex()
    }
}

/// Write behavior for [`CacheWriter::queue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace an existing value, logging the overwrite.
    Overwrite,
    /// Fail with `CacheOverwrite` if the key is already populated,
    /// leaving the original value intact.
    TestAndSet,
}

/// Concurrent read access. Absence is data, not failure: a `None` means
/// the entity legitimately has no associated object (no identity, no
/// scheduled node), and callers that require presence use [`CacheReader::get_required`].
pub trait CacheReader: Send + Sync {
    fn get(&self, shard: CacheShard, key: &str) -> Option<ObjectId>;

    fn get_required(&self, shard: CacheShard, key: &str) -> Result<ObjectId> {
        self.get(shard, key)
            .ok_or_else(|| KubepathError::CacheEntryNotFound {
                shard: shard.to_string(),
                key: key.to_string(),
            })
    }
}

/// Serialized write access.
pub trait CacheWriter: Send + Sync {
    fn queue(&self, shard: CacheShard, key: String, value: ObjectId, mode: WriteMode)
        -> Result<()>;
}

/// In-memory cache, one `RwLock`ed map per shard.
pub struct MemCache {
    shards: HashMap<CacheShard, RwLock<HashMap<String, ObjectId>>>,
}

impl MemCache {
    pub fn new() -> Self {
        let shards = CacheShard::ALL
            .into_iter()
            .map(|shard| (shard, RwLock::new(HashMap::new())))
            .collect();
        Self { shards }
    }

    fn shard(&self, shard: CacheShard) -> &RwLock<HashMap<String, ObjectId>> {
        // All shards are populated in `new`.
        self.shards.get(&shard).expect("cache shard missing")
    }

    /// Number of entries in one shard.
    pub fn len(&self, shard: CacheShard) -> usize {
        self.shard(shard).read().len()
    }

    pub fn is_empty(&self, shard: CacheShard) -> bool {
        self.len(shard) == 0
    }
}

impl Default for MemCache {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheReader for MemCache {
    fn get(&self, shard: CacheShard, key: &str) -> Option<ObjectId> {
        self.shard(shard).read().get(key).copied()
    }
}

impl CacheWriter for MemCache {
    fn queue(
        &self,
        shard: CacheShard,
        key: String,
        value: ObjectId,
        mode: WriteMode,
    ) -> Result<()> {
        let mut map = self.shard(shard).write();
        if let Some(existing) = map.get(&key) {
            match mode {
                WriteMode::TestAndSet => {
                    return Err(KubepathError::CacheOverwrite {
                        shard: shard.to_string(),
                        key,
                    });
                }
                WriteMode::Overwrite => {
                    warn!(
                        shard = shard.as_str(),
                        key = key.as_str(),
                        old = %existing,
                        new = %value,
                        "overwriting cache entry"
                    );
                }
            }
        }
        map.insert(key, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_back() {
        let cache = MemCache::new();
        let id = ObjectId::generate();
        cache
            .queue(
                CacheShard::Node,
                keys::node("node-1"),
                id,
                WriteMode::Overwrite,
            )
            .unwrap();
        assert_eq!(cache.get(CacheShard::Node, "node-1"), Some(id));
        assert_eq!(cache.get(CacheShard::Node, "node-2"), None);
    }

    #[test]
    fn test_shards_are_isolated() {
        let cache = MemCache::new();
        let id = ObjectId::generate();
        cache
            .queue(CacheShard::Identity, "default#sa".into(), id, WriteMode::Overwrite)
            .unwrap();
        assert!(cache.get(CacheShard::Role, "default#sa").is_none());
        assert_eq!(cache.get(CacheShard::Identity, "default#sa"), Some(id));
    }

    #[test]
    fn test_test_and_set_keeps_original() {
        let cache = MemCache::new();
        let first = ObjectId::generate();
        let second = ObjectId::generate();
        cache
            .queue(CacheShard::ObjectIdMap, "k".into(), first, WriteMode::TestAndSet)
            .unwrap();
        let err = cache
            .queue(CacheShard::ObjectIdMap, "k".into(), second, WriteMode::TestAndSet)
            .unwrap_err();
        assert!(matches!(err, KubepathError::CacheOverwrite { .. }));
        assert_eq!(cache.get(CacheShard::ObjectIdMap, "k"), Some(first));
    }

    #[test]
    fn test_overwrite_mode_replaces() {
        let cache = MemCache::new();
        let first = ObjectId::generate();
        let second = ObjectId::generate();
        cache
            .queue(CacheShard::Container, "k".into(), first, WriteMode::Overwrite)
            .unwrap();
        cache
            .queue(CacheShard::Container, "k".into(), second, WriteMode::Overwrite)
            .unwrap();
        assert_eq!(cache.get(CacheShard::Container, "k"), Some(second));
    }

    #[test]
    fn test_get_required_missing_is_error() {
        let cache = MemCache::new();
        let err = cache
            .get_required(CacheShard::Node, "missing")
            .unwrap_err();
        assert!(matches!(err, KubepathError::CacheEntryNotFound { .. }));
    }
}
