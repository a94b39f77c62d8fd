//! In-process caching.
//!
//! The settings cache keeps the singleton [`SystemSettings`] record in memory
//! with single-flight refresh:
//!
//! ```toml
//! [settings_cache]
//! ttl_ms = 300000
//! forced_refresh_window_ms = 30000
//! ```
//!
//! [`SystemSettings`]: crate::domain::settings::SystemSettings

mod config;
mod lock;
mod settings;

pub use config::{DEFAULT_FORCED_REFRESH_WINDOW_MS, DEFAULT_TTL_MS, SettingsCacheConfig};
pub use settings::{CacheInfo, SettingsCache};
