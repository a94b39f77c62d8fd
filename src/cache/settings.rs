//! Single-flight, stale-while-revalidate cache for [`SystemSettings`].
//!
//! Readers are served from memory whenever possible:
//!
//! - **fresh**: the cached value is returned without touching the backend;
//! - **stale** (older than the TTL, or inside the forced-refresh window that
//!   follows an invalidation): the cached value is returned immediately and a
//!   background refresh is started;
//! - **cold** (nothing cached): the caller waits for the refresh.
//!
//! At most one backend fetch runs at a time. Callers that need a refresh while
//! one is in flight attach to it. A refresh started after an invalidation waits
//! for the superseded one before fetching. Refreshes run on a detached task, so
//! they complete even when every waiting caller has gone away.
//!
//! Backend failures never reach callers. A failed refresh keeps the
//! last-known-good value, and a failed cold fetch yields
//! [`SystemSettings::default`] without caching it.

use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, FutureExt, Shared};
use metrics::counter;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::application::repos::SettingsRepo;
use crate::domain::settings::SystemSettings;

use super::config::SettingsCacheConfig;
use super::lock::mutex_lock;

const SOURCE: &str = "cache::settings";

type SharedRefresh = Shared<BoxFuture<'static, Arc<SystemSettings>>>;

struct InFlight {
    generation: u64,
    refresh: SharedRefresh,
}

#[derive(Default)]
struct CacheState {
    value: Option<Arc<SystemSettings>>,
    cached_at: Option<Instant>,
    last_invalidated_at: Option<Instant>,
    last_invalidated_wall: Option<OffsetDateTime>,
    in_flight: Option<InFlight>,
    /// Refresh detached by the last invalidation; the next refresh waits on it.
    superseded: Option<SharedRefresh>,
    /// Bumped by every invalidation; refreshes started under an older
    /// generation must not write their result back.
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Freshness {
    Fresh,
    Stale,
    Forced,
    Cold,
}

impl Freshness {
    fn as_str(self) -> &'static str {
        match self {
            Freshness::Fresh => "fresh",
            Freshness::Stale => "stale",
            Freshness::Forced => "forced",
            Freshness::Cold => "cold",
        }
    }
}

impl CacheState {
    fn is_stale(&self, now: Instant, config: &SettingsCacheConfig) -> bool {
        self.cached_at
            .is_none_or(|at| now.saturating_duration_since(at) > config.ttl)
    }

    fn in_forced_window(&self, now: Instant, config: &SettingsCacheConfig) -> bool {
        self.last_invalidated_at
            .is_some_and(|at| now.saturating_duration_since(at) < config.forced_refresh_window)
    }

    fn freshness(&self, now: Instant, config: &SettingsCacheConfig) -> Freshness {
        if self.value.is_none() {
            Freshness::Cold
        } else if self.is_stale(now, config) {
            Freshness::Stale
        } else if self.in_forced_window(now, config) {
            Freshness::Forced
        } else {
            Freshness::Fresh
        }
    }
}

/// Point-in-time view of the cache, for diagnostics endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    pub has_cached_data: bool,
    pub cache_age_ms: u64,
    pub is_stale: bool,
    pub in_forced_refresh_window: bool,
    pub refresh_in_flight: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_invalidation: Option<OffsetDateTime>,
}

/// Process-wide settings cache. Construct once at startup and share via `Arc`.
pub struct SettingsCache {
    repo: Arc<dyn SettingsRepo>,
    config: SettingsCacheConfig,
    state: Arc<Mutex<CacheState>>,
}

impl SettingsCache {
    pub fn new(repo: Arc<dyn SettingsRepo>, config: SettingsCacheConfig) -> Self {
        Self {
            repo,
            config,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    pub fn config(&self) -> &SettingsCacheConfig {
        &self.config
    }

    /// Return the current settings, refreshing from the backend when needed.
    ///
    /// Suspends only when nothing is cached yet.
    pub async fn get_settings(&self) -> Arc<SystemSettings> {
        let now = Instant::now();
        let (cached, refresh) = {
            let mut state = mutex_lock(&self.state, SOURCE, "get_settings");
            let freshness = state.freshness(now, &self.config);

            if freshness == Freshness::Fresh
                && let Some(value) = state.value.clone()
            {
                counter!("farmgate_settings_cache_hit_total").increment(1);
                return value;
            }

            counter!("farmgate_settings_cache_miss_total", "reason" => freshness.as_str())
                .increment(1);
            debug!(
                target = "farmgate::cache::settings",
                reason = freshness.as_str(),
                "settings cache miss"
            );

            (state.value.clone(), self.ensure_refresh(&mut state))
        };

        match cached {
            Some(value) => value,
            None => refresh.await,
        }
    }

    /// Project a single field out of the current settings.
    pub async fn get_setting<T>(&self, select: impl FnOnce(&SystemSettings) -> T) -> T {
        let settings = self.get_settings().await;
        select(&settings)
    }

    /// Drop the cached value so the next read performs a genuine fetch.
    ///
    /// Also opens the forced-refresh window and detaches any in-flight
    /// refresh, whose result may predate the mutation that prompted this call.
    /// The detached refresh keeps running; the next refresh starts its fetch
    /// only after it settles.
    pub fn invalidate(&self) {
        let mut state = mutex_lock(&self.state, SOURCE, "invalidate");
        state.value = None;
        state.cached_at = None;
        state.last_invalidated_at = Some(Instant::now());
        state.last_invalidated_wall = Some(OffsetDateTime::now_utc());
        state.generation = state.generation.wrapping_add(1);
        if let Some(flight) = state.in_flight.take() {
            state.superseded = Some(flight.refresh);
        }
        drop(state);

        counter!("farmgate_settings_cache_invalidate_total").increment(1);
        debug!(
            target = "farmgate::cache::settings",
            "settings cache invalidated"
        );
    }

    /// Fetch once at startup so the first request is served from memory.
    pub async fn warmup(&self) {
        let settings = self.get_settings().await;
        debug!(
            target = "farmgate::cache::settings",
            from_backend = !settings.is_default(),
            "settings cache warmed"
        );
    }

    /// Wait for the refresh currently in flight, if any.
    pub async fn await_pending_refresh(&self) {
        let pending = {
            let state = mutex_lock(&self.state, SOURCE, "await_pending_refresh");
            state.in_flight.as_ref().map(|flight| flight.refresh.clone())
        };
        if let Some(refresh) = pending {
            refresh.await;
        }
    }

    pub fn info(&self) -> CacheInfo {
        let now = Instant::now();
        let state = mutex_lock(&self.state, SOURCE, "info");
        CacheInfo {
            has_cached_data: state.value.is_some(),
            cache_age_ms: state
                .cached_at
                .map(|at| now.saturating_duration_since(at).as_millis() as u64)
                .unwrap_or(0),
            is_stale: state.is_stale(now, &self.config),
            in_forced_refresh_window: state.in_forced_window(now, &self.config),
            refresh_in_flight: state.in_flight.is_some(),
            last_invalidation: state.last_invalidated_wall,
        }
    }

    /// Return the in-flight refresh, starting one if none is running.
    ///
    /// Must be called with the state lock held so that check-and-start is a
    /// single critical section.
    fn ensure_refresh(&self, state: &mut CacheState) -> SharedRefresh {
        if let Some(flight) = state.in_flight.as_ref() {
            return flight.refresh.clone();
        }

        let generation = state.generation;
        let refresh = refresh_task(
            Arc::clone(&self.repo),
            Arc::clone(&self.state),
            generation,
            state.superseded.take(),
        )
        .boxed()
        .shared();
        state.in_flight = Some(InFlight {
            generation,
            refresh: refresh.clone(),
        });

        // Detached: the refresh runs to completion whether or not anyone awaits it.
        tokio::spawn(refresh.clone());
        refresh
    }
}

async fn refresh_task(
    repo: Arc<dyn SettingsRepo>,
    state: Arc<Mutex<CacheState>>,
    generation: u64,
    superseded: Option<SharedRefresh>,
) -> Arc<SystemSettings> {
    if let Some(previous) = superseded {
        // Its value predates the invalidation and is dropped.
        previous.await;
    }

    counter!("farmgate_settings_cache_refresh_total").increment(1);
    let outcome = repo.load_system_settings().await;

    let mut guard = mutex_lock(&state, SOURCE, "complete_refresh");
    let current = guard.generation == generation;
    if current
        && guard
            .in_flight
            .as_ref()
            .is_some_and(|flight| flight.generation == generation)
    {
        guard.in_flight = None;
    }

    match outcome {
        Ok(settings) => {
            let settings = Arc::new(settings);
            if current {
                guard.value = Some(Arc::clone(&settings));
                guard.cached_at = Some(Instant::now());
            } else {
                debug!(
                    target = "farmgate::cache::settings",
                    generation,
                    current_generation = guard.generation,
                    "discarding refresh started before invalidation"
                );
            }
            settings
        }
        Err(err) => {
            counter!("farmgate_settings_cache_refresh_failed_total").increment(1);
            let fallback = guard.value.clone();
            let serving = if fallback.is_some() {
                "last_known_good"
            } else {
                "defaults"
            };
            warn!(
                target = "farmgate::cache::settings",
                error = %err,
                serving,
                "settings refresh failed"
            );
            fallback.unwrap_or_else(|| Arc::new(SystemSettings::default()))
        }
    }
}
