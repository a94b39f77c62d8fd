//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::settings::SystemSettings;
use crate::domain::visitors::{NewVisitorEntry, VisitorEntry};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("backend is not configured")]
    Unconfigured,
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("backend timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[async_trait]
pub trait SettingsRepo: Send + Sync {
    async fn load_system_settings(&self) -> Result<SystemSettings, RepoError>;
    async fn upsert_system_settings(
        &self,
        settings: SystemSettings,
    ) -> Result<SystemSettings, RepoError>;
}

#[async_trait]
pub trait VisitorsRepo: Send + Sync {
    async fn list_visitors(&self, farm_id: Option<Uuid>) -> Result<Vec<VisitorEntry>, RepoError>;
    async fn insert_visitor(&self, entry: NewVisitorEntry) -> Result<VisitorEntry, RepoError>;
}
