use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

use farmgate::application::repos::{RepoError, SettingsRepo, VisitorsRepo};
use farmgate::application::settings::SettingsService;
use farmgate::application::visitors::VisitorService;
use farmgate::cache::{SettingsCache, SettingsCacheConfig};
use farmgate::domain::settings::SystemSettings;
use farmgate::domain::visitors::{NewVisitorEntry, VisitorEntry};
use farmgate::infra::http::{AppState, FixedWindowRateLimiter, build_router};

#[derive(Default)]
struct MemoryRepo {
    settings: Mutex<Option<SystemSettings>>,
    visitors: Mutex<Vec<VisitorEntry>>,
}

#[async_trait]
impl SettingsRepo for MemoryRepo {
    async fn load_system_settings(&self) -> Result<SystemSettings, RepoError> {
        self.settings.lock().await.clone().ok_or(RepoError::NotFound)
    }

    async fn upsert_system_settings(
        &self,
        mut settings: SystemSettings,
    ) -> Result<SystemSettings, RepoError> {
        if settings.is_default() {
            settings.id = "row-1".to_string();
        }
        *self.settings.lock().await = Some(settings.clone());
        Ok(settings)
    }
}

#[async_trait]
impl VisitorsRepo for MemoryRepo {
    async fn list_visitors(&self, farm_id: Option<Uuid>) -> Result<Vec<VisitorEntry>, RepoError> {
        let visitors = self.visitors.lock().await;
        Ok(visitors
            .iter()
            .filter(|entry| farm_id.is_none_or(|id| entry.farm_id == id))
            .cloned()
            .collect())
    }

    async fn insert_visitor(&self, entry: NewVisitorEntry) -> Result<VisitorEntry, RepoError> {
        let stored = VisitorEntry {
            id: Uuid::new_v4(),
            farm_id: entry.farm_id,
            visitor_name: entry.visitor_name,
            visitor_phone: entry.visitor_phone,
            visitor_address: entry.visitor_address,
            visitor_purpose: entry.visitor_purpose,
            vehicle_number: entry.vehicle_number,
            disinfection_check: entry.disinfection_check,
            notes: entry.notes,
            consent_given: entry.consent_given,
            visit_datetime: entry.visit_datetime.unwrap_or_else(OffsetDateTime::now_utc),
            created_at: Some(OffsetDateTime::now_utc()),
        };
        self.visitors.lock().await.push(stored.clone());
        Ok(stored)
    }
}

/// Repo standing in for a service started without a backend URL.
struct DetachedRepo;

#[async_trait]
impl VisitorsRepo for DetachedRepo {
    async fn list_visitors(&self, _farm_id: Option<Uuid>) -> Result<Vec<VisitorEntry>, RepoError> {
        Err(RepoError::Unconfigured)
    }

    async fn insert_visitor(&self, _entry: NewVisitorEntry) -> Result<VisitorEntry, RepoError> {
        Err(RepoError::Unconfigured)
    }
}

struct Harness {
    router: Router,
    repo: Arc<MemoryRepo>,
}

fn harness(
    stored: Option<SystemSettings>,
    max_requests: u32,
    vapid_fallback: Option<&str>,
) -> Harness {
    let repo = Arc::new(MemoryRepo {
        settings: Mutex::new(stored),
        visitors: Mutex::new(Vec::new()),
    });
    let state = state_with(repo.clone(), repo.clone(), max_requests, vapid_fallback);
    Harness {
        router: build_router(state),
        repo,
    }
}

fn state_with(
    settings_repo: Arc<dyn SettingsRepo>,
    visitors_repo: Arc<dyn VisitorsRepo>,
    max_requests: u32,
    vapid_fallback: Option<&str>,
) -> AppState {
    let cache = Arc::new(SettingsCache::new(
        settings_repo.clone(),
        SettingsCacheConfig::default(),
    ));
    AppState {
        settings: Arc::new(SettingsService::new(settings_repo, cache.clone())),
        visitors: Arc::new(VisitorService::new(visitors_repo, cache.clone())),
        settings_cache: cache,
        visitor_limiter: Arc::new(FixedWindowRateLimiter::new(
            "visitors",
            Duration::from_secs(60),
            max_requests,
        )),
        vapid_fallback: vapid_fallback.map(str::to_string),
        started_at: OffsetDateTime::now_utc(),
    }
}

fn stored_settings() -> SystemSettings {
    SystemSettings {
        id: "row-1".to_string(),
        site_name: "Green Acres".to_string(),
        ..SystemSettings::default()
    }
}

fn json_request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request"),
        None => builder.body(Body::empty()).expect("request"),
    }
}

fn visitor_request(ip: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/visitors")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", ip)
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn visitor_payload() -> Value {
    json!({
        "farm_id": Uuid::new_v4(),
        "visitor_name": "Lee Jiwoo",
        "visitor_phone": "010-0000-1111",
        "visitor_purpose": "veterinary check",
        "disinfection_check": true,
        "consent_given": true
    })
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("json body")
}

#[tokio::test]
async fn get_settings_serves_backend_record() {
    let h = harness(Some(stored_settings()), 10, None);

    let response = h
        .router
        .oneshot(json_request(Method::GET, "/api/settings", None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["siteName"], "Green Acres");
    assert_eq!(body["requireVisitorContact"], true);
}

#[tokio::test]
async fn get_settings_falls_back_to_defaults_without_backend_row() {
    let h = harness(None, 10, None);

    let response = h
        .router
        .oneshot(json_request(Method::GET, "/api/settings", None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["id"], "default");
    assert_eq!(body["siteName"], "Farm Pass");
}

#[tokio::test]
async fn patch_settings_writes_through_and_next_read_sees_it() {
    let h = harness(Some(stored_settings()), 10, None);

    let warm = h
        .router
        .clone()
        .oneshot(json_request(Method::GET, "/api/settings", None))
        .await
        .expect("response");
    assert_eq!(body_json(warm).await["siteName"], "Green Acres");

    let response = h
        .router
        .clone()
        .oneshot(json_request(
            Method::PATCH,
            "/api/settings",
            Some(json!({ "siteName": "Blue Barn", "maintenanceMode": true })),
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["siteName"], "Blue Barn");

    let info = h
        .router
        .clone()
        .oneshot(json_request(Method::GET, "/api/settings/cache", None))
        .await
        .expect("response");
    let info = body_json(info).await;
    assert_eq!(info["hasCachedData"], false);
    assert_eq!(info["inForcedRefreshWindow"], true);

    let after = h
        .router
        .oneshot(json_request(Method::GET, "/api/settings", None))
        .await
        .expect("response");
    let after = body_json(after).await;
    assert_eq!(after["siteName"], "Blue Barn");
    assert_eq!(after["maintenanceMode"], true);

    let stored = h.repo.settings.lock().await.clone().expect("stored");
    assert_eq!(stored.site_name, "Blue Barn");
}

#[tokio::test]
async fn patch_settings_rejects_blank_site_name() {
    let h = harness(Some(stored_settings()), 10, None);

    let response = h
        .router
        .oneshot(json_request(
            Method::PATCH,
            "/api/settings",
            Some(json!({ "siteName": "   " })),
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "invalid_input");
    let stored = h.repo.settings.lock().await.clone().expect("stored");
    assert_eq!(stored.site_name, "Green Acres");
}

#[tokio::test]
async fn invalidate_endpoint_reports_cleared_cache() {
    let h = harness(Some(stored_settings()), 10, None);

    h.router
        .clone()
        .oneshot(json_request(Method::GET, "/api/settings", None))
        .await
        .expect("response");

    let response = h
        .router
        .oneshot(json_request(
            Method::POST,
            "/api/settings/cache/invalidate",
            None,
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["invalidated"], true);
    assert_eq!(body["cache"]["hasCachedData"], false);
    assert!(body["cache"]["lastInvalidation"].is_string());
}

#[tokio::test]
async fn vapid_key_prefers_settings_then_config() {
    let with_setting = harness(
        Some(SystemSettings {
            vapid_public_key: Some("BStored".to_string()),
            ..stored_settings()
        }),
        10,
        Some("BConfigured"),
    );
    let response = with_setting
        .router
        .oneshot(json_request(Method::GET, "/api/push/vapid", None))
        .await
        .expect("response");
    assert_eq!(body_json(response).await["publicKey"], "BStored");

    let with_config = harness(Some(stored_settings()), 10, Some("BConfigured"));
    let response = with_config
        .router
        .oneshot(json_request(Method::GET, "/api/push/vapid", None))
        .await
        .expect("response");
    assert_eq!(body_json(response).await["publicKey"], "BConfigured");

    let without = harness(Some(stored_settings()), 10, None);
    let response = without
        .router
        .oneshot(json_request(Method::GET, "/api/push/vapid", None))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn visitor_registration_is_rate_limited_per_ip() {
    let h = harness(Some(stored_settings()), 2, None);

    for remaining in ["1", "0"] {
        let response = h
            .router
            .clone()
            .oneshot(visitor_request("203.0.113.9", visitor_payload()))
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-ratelimit-limit"], "2");
        assert_eq!(response.headers()["x-ratelimit-remaining"], remaining);
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }

    let denied = h
        .router
        .clone()
        .oneshot(visitor_request("203.0.113.9", visitor_payload()))
        .await
        .expect("response");
    assert_eq!(denied.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(denied.headers()[header::RETRY_AFTER], "60");
    assert_eq!(denied.headers()["x-ratelimit-remaining"], "0");
    let body = body_json(denied).await;
    assert_eq!(body["retryAfter"], 60);
    assert!(body["error"].is_string());

    let other = h
        .router
        .oneshot(visitor_request("203.0.113.10", visitor_payload()))
        .await
        .expect("response");
    assert_eq!(other.status(), StatusCode::CREATED);

    assert_eq!(h.repo.visitors.lock().await.len(), 3);
}

#[tokio::test]
async fn visitor_listing_shares_the_quota_and_filters_by_farm() {
    let h = harness(Some(stored_settings()), 3, None);
    let payload = visitor_payload();
    let farm_id = payload["farm_id"].as_str().expect("farm id").to_string();

    h.router
        .clone()
        .oneshot(visitor_request("192.0.2.1", payload))
        .await
        .expect("response");
    h.router
        .clone()
        .oneshot(visitor_request("192.0.2.1", visitor_payload()))
        .await
        .expect("response");

    let request = Request::builder()
        .method(Method::GET)
        .uri(format!("/api/visitors?farmId={farm_id}"))
        .header("x-real-ip", "192.0.2.1")
        .body(Body::empty())
        .expect("request");
    let response = h.router.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-ratelimit-remaining"], "0");
    let body = body_json(response).await;
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let request = Request::builder()
        .method(Method::GET)
        .uri("/api/visitors")
        .header("x-forwarded-for", "192.0.2.1")
        .body(Body::empty())
        .expect("request");
    let response = h.router.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn visitor_without_consent_is_rejected() {
    let h = harness(Some(stored_settings()), 10, None);
    let mut payload = visitor_payload();
    payload["consent_given"] = json!(false);

    let response = h
        .router
        .oneshot(visitor_request("198.51.100.1", payload))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "invalid_input");
    assert!(h.repo.visitors.lock().await.is_empty());
}

#[tokio::test]
async fn phone_is_optional_when_contact_not_required() {
    let h = harness(
        Some(SystemSettings {
            require_visitor_contact: false,
            ..stored_settings()
        }),
        10,
        None,
    );
    let mut payload = visitor_payload();
    payload["visitor_phone"] = json!("");

    let response = h
        .router
        .oneshot(visitor_request("198.51.100.2", payload))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn visitor_routes_report_unconfigured_backend() {
    let settings_repo = Arc::new(MemoryRepo::default());
    let router = build_router(state_with(settings_repo, Arc::new(DetachedRepo), 10, None));

    let response = router
        .oneshot(visitor_request("198.51.100.3", visitor_payload()))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.headers().get("x-ratelimit-limit").is_some());
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "backend_unconfigured");
}

#[tokio::test]
async fn health_reports_cache_and_limiter() {
    let h = harness(Some(stored_settings()), 10, None);

    h.router
        .clone()
        .oneshot(visitor_request("198.51.100.4", visitor_payload()))
        .await
        .expect("response");

    let response = h
        .router
        .oneshot(json_request(Method::GET, "/api/health", None))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(body["rateLimiter"]["trackedKeys"], 1);
    assert_eq!(body["settingsCache"]["hasCachedData"], true);
}
