//! Permission engine configuration.

use super::invalidation::DEFAULT_EVENT_BUFFER;

/// Configuration for the permission cache and invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionConfig {
    /// Whether capability answers are cached
    pub cache_enabled: bool,
    /// Entry count at which stale entries are swept before inserting
    pub max_cache_entries: usize,
    /// Capacity of the version bump notification channel
    pub event_buffer: usize,
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            max_cache_entries: 100_000,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

impl PermissionConfig {
    /// Creates configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PERMISSION_CACHE_ENABLED`: Enable/disable the cache (default: true)
    /// - `PERMISSION_CACHE_MAX_ENTRIES`: Sweep threshold (default: 100000)
    /// - `PERMISSION_EVENT_BUFFER`: Bump channel capacity (default: 256)
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PERMISSION_CACHE_ENABLED") {
            config.cache_enabled = val.parse().unwrap_or(true);
        }
        if let Ok(val) = std::env::var("PERMISSION_CACHE_MAX_ENTRIES") {
            if let Some(max) = parse_positive(&val) {
                config.max_cache_entries = max;
            }
        }
        if let Ok(val) = std::env::var("PERMISSION_EVENT_BUFFER") {
            if let Some(buffer) = parse_positive(&val) {
                config.event_buffer = buffer;
            }
        }

        config
    }
}

fn parse_positive(val: &str) -> Option<usize> {
    val.trim().parse().ok().filter(|n| *n > 0)
}
