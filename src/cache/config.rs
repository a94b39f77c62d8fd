//! Settings cache configuration.
//!
//! Controlled via the `[settings_cache]` section of `farmgate.toml`.

use std::time::Duration;

pub const DEFAULT_TTL_MS: u64 = 300_000;
pub const DEFAULT_FORCED_REFRESH_WINDOW_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingsCacheConfig {
    /// Age after which a cached value is served stale and revalidated.
    pub ttl: Duration,
    /// Period after an invalidation during which every cached value is
    /// treated as stale, regardless of its age.
    pub forced_refresh_window: Duration,
}

impl Default for SettingsCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_millis(DEFAULT_TTL_MS),
            forced_refresh_window: Duration::from_millis(DEFAULT_FORCED_REFRESH_WINDOW_MS),
        }
    }
}

impl From<&crate::config::SettingsCacheSettings> for SettingsCacheConfig {
    fn from(settings: &crate::config::SettingsCacheSettings) -> Self {
        Self {
            ttl: settings.ttl,
            forced_refresh_window: settings.forced_refresh_window,
        }
    }
}
