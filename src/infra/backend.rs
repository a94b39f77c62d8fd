//! HTTP adapter for the managed backend's PostgREST-style endpoints.

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::application::repos::{RepoError, SettingsRepo, VisitorsRepo};
use crate::config::BackendSettings;
use crate::domain::settings::SystemSettings;
use crate::domain::visitors::{NewVisitorEntry, VisitorEntry};

use super::error::InfraError;

const PREFER_REPRESENTATION: &str = "return=representation";
const PREFER_UPSERT: &str = "resolution=merge-duplicates,return=representation";

/// Client for the backend REST surface.
///
/// Built without a base URL the client runs detached: every call fails with
/// [`RepoError::Unconfigured`].
#[derive(Clone, Debug)]
pub struct BackendClient {
    client: Client,
    base: Option<Url>,
    api_key: Option<String>,
    settings_path: String,
    visitors_path: String,
}

impl BackendClient {
    pub fn new(settings: &BackendSettings) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(settings.timeout)
            .build()
            .map_err(|err| InfraError::backend(format!("failed to build http client: {err}")))?;

        let base = settings.url.clone().map(|mut url| {
            if !url.path().ends_with('/') {
                let path = format!("{}/", url.path());
                url.set_path(&path);
            }
            url
        });

        Ok(Self {
            client,
            base,
            api_key: settings.api_key.clone(),
            settings_path: settings.settings_path.trim_start_matches('/').to_string(),
            visitors_path: settings.visitors_path.trim_start_matches('/').to_string(),
        })
    }

    pub fn user_agent() -> &'static str {
        concat!("farmgate/", env!("CARGO_PKG_VERSION"))
    }

    pub fn is_configured(&self) -> bool {
        self.base.is_some()
    }

    fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, RepoError> {
        let base = self.base.as_ref().ok_or(RepoError::Unconfigured)?;
        let mut url = base.join(path).map_err(RepoError::from_persistence)?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let mut request = self
            .client
            .request(method, url)
            .header(header::ACCEPT, "application/json");
        if let Some(key) = self.api_key.as_deref() {
            request = request.header("apikey", key).bearer_auth(key);
        }
        request
    }

    async fn send(request: RequestBuilder) -> Result<Response, RepoError> {
        let response = request.send().await.map_err(map_transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => RepoError::NotFound,
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY | StatusCode::CONFLICT => {
                RepoError::InvalidInput { message: body }
            }
            StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => RepoError::Timeout,
            _ => RepoError::Persistence(format!("status {status} body {body}")),
        })
    }

    /// Decode a body that is either one object or an array holding it.
    async fn single<T: DeserializeOwned>(response: Response) -> Result<T, RepoError> {
        let value: Value = response.json().await.map_err(RepoError::from_persistence)?;
        let row = match value {
            Value::Array(mut rows) => {
                if rows.is_empty() {
                    return Err(RepoError::NotFound);
                }
                rows.swap_remove(0)
            }
            other => other,
        };
        serde_json::from_value(row).map_err(RepoError::from_persistence)
    }

    async fn write_single<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        path: &str,
        prefer: &'static str,
        body: &B,
    ) -> Result<T, RepoError> {
        let url = self.url(path, &[])?;
        let request = self
            .request(Method::POST, url)
            .header("Prefer", prefer)
            .json(body);
        let response = Self::send(request).await?;
        Self::single(response).await
    }
}

fn map_transport_error(err: reqwest::Error) -> RepoError {
    if err.is_timeout() {
        RepoError::Timeout
    } else {
        RepoError::from_persistence(err)
    }
}

#[async_trait]
impl SettingsRepo for BackendClient {
    async fn load_system_settings(&self) -> Result<SystemSettings, RepoError> {
        let url = self.url(
            &self.settings_path,
            &[("select", "*".to_string()), ("limit", "1".to_string())],
        )?;
        let response = Self::send(self.request(Method::GET, url)).await?;
        let settings: SystemSettings = Self::single(response).await?;
        debug!(
            target = "farmgate::infra::backend",
            settings_id = %settings.id,
            "loaded system settings"
        );
        Ok(settings)
    }

    async fn upsert_system_settings(
        &self,
        settings: SystemSettings,
    ) -> Result<SystemSettings, RepoError> {
        self.write_single(&self.settings_path, PREFER_UPSERT, &settings)
            .await
    }
}

#[async_trait]
impl VisitorsRepo for BackendClient {
    async fn list_visitors(&self, farm_id: Option<Uuid>) -> Result<Vec<VisitorEntry>, RepoError> {
        let mut query = vec![
            ("select", "*".to_string()),
            ("order", "visit_datetime.desc".to_string()),
        ];
        if let Some(farm_id) = farm_id {
            query.push(("farm_id", format!("eq.{farm_id}")));
        }

        let url = self.url(&self.visitors_path, &query)?;
        let response = Self::send(self.request(Method::GET, url)).await?;
        response.json().await.map_err(RepoError::from_persistence)
    }

    async fn insert_visitor(&self, entry: NewVisitorEntry) -> Result<VisitorEntry, RepoError> {
        self.write_single(&self.visitors_path, PREFER_REPRESENTATION, &entry)
            .await
    }
}
