//! Version-keyed permission cache.
//!
//! Caches capability answers using `DashMap` for lock-free concurrent
//! access. Every key carries the channel version it was computed under, so
//! a version bump makes older entries unreachable without deleting them.
//! Orphaned entries are swept when the cache reaches its size limit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use super::capability::ChannelPermissions;
use super::invalidation::InvalidationCoordinator;

/// Cache key. Entries are immutable once written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub channel_id: Uuid,
    pub user_id: Uuid,
    pub capability: ChannelPermissions,
    pub version: u64,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Thread-safe cache of capability answers.
pub struct PermissionCache {
    entries: DashMap<CacheKey, bool>,
    versions: Arc<InvalidationCoordinator>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl PermissionCache {
    /// Create an empty cache reading versions from `versions`.
    pub fn new(versions: Arc<InvalidationCoordinator>, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            versions,
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up an answer under the channel's current version.
    pub fn get(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
        capability: ChannelPermissions,
    ) -> Option<bool> {
        let version = self.versions.current_version(channel_id);
        self.get_at(version, channel_id, user_id, capability)
    }

    /// Store an answer under the channel's current version.
    ///
    /// Only correct when the value was computed after that version was
    /// current. The resolver uses [`Self::put_at`] with the version it read
    /// before loading data.
    pub fn put(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
        capability: ChannelPermissions,
        allowed: bool,
    ) {
        let version = self.versions.current_version(channel_id);
        self.put_at(version, channel_id, user_id, capability, allowed);
    }

    pub fn get_at(
        &self,
        version: u64,
        channel_id: Uuid,
        user_id: Uuid,
        capability: ChannelPermissions,
    ) -> Option<bool> {
        let key = CacheKey {
            channel_id,
            user_id,
            capability,
            version,
        };
        let found = self.entries.get(&key).map(|entry| *entry);
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        found
    }

    pub fn put_at(
        &self,
        version: u64,
        channel_id: Uuid,
        user_id: Uuid,
        capability: ChannelPermissions,
        allowed: bool,
    ) {
        if self.entries.len() >= self.max_entries {
            let reclaimed = self.reclaim_stale();
            if self.entries.len() >= self.max_entries {
                warn!(
                    reclaimed,
                    max_entries = self.max_entries,
                    "Permission cache full of live entries, clearing"
                );
                self.entries.clear();
            }
        }

        self.entries.insert(
            CacheKey {
                channel_id,
                user_id,
                capability,
                version,
            },
            allowed,
        );
    }

    /// Drop entries whose version is older than their channel's current one.
    ///
    /// Returns the number of entries removed.
    pub fn reclaim_stale(&self) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|key, _| key.version >= self.versions.peek_version(key.channel_id));
        let reclaimed = before.saturating_sub(self.entries.len());
        debug!(reclaimed, "Reclaimed stale permission cache entries");
        reclaimed
    }

    /// Drop every entry of one channel, whatever its version.
    pub fn purge_channel(&self, channel_id: Uuid) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.channel_id != channel_id);
        before.saturating_sub(self.entries.len())
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}
