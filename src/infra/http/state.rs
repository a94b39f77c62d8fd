use std::sync::Arc;

use time::OffsetDateTime;

use crate::application::settings::SettingsService;
use crate::application::visitors::VisitorService;
use crate::cache::SettingsCache;

use super::rate_limit::FixedWindowRateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub settings_cache: Arc<SettingsCache>,
    pub settings: Arc<SettingsService>,
    pub visitors: Arc<VisitorService>,
    pub visitor_limiter: Arc<FixedWindowRateLimiter>,
    /// Served by the VAPID route when the stored settings carry no key.
    pub vapid_fallback: Option<String>,
    pub started_at: OffsetDateTime,
}
