//! Visitor registration and lookup.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::application::repos::{RepoError, VisitorsRepo};
use crate::cache::SettingsCache;
use crate::domain::error::DomainError;
use crate::domain::visitors::{NewVisitorEntry, VisitorEntry};

#[derive(Debug, Error)]
pub enum VisitorError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct VisitorService {
    repo: Arc<dyn VisitorsRepo>,
    settings: Arc<SettingsCache>,
}

impl VisitorService {
    pub fn new(repo: Arc<dyn VisitorsRepo>, settings: Arc<SettingsCache>) -> Self {
        Self { repo, settings }
    }

    pub async fn list(&self, farm_id: Option<Uuid>) -> Result<Vec<VisitorEntry>, VisitorError> {
        Ok(self.repo.list_visitors(farm_id).await?)
    }

    pub async fn register(&self, entry: NewVisitorEntry) -> Result<VisitorEntry, VisitorError> {
        let require_contact = self
            .settings
            .get_setting(|settings| settings.require_visitor_contact)
            .await;
        let entry = entry.normalize(require_contact)?;

        let stored = self.repo.insert_visitor(entry).await?;
        info!(
            target = "farmgate::application::visitors",
            visitor_id = %stored.id,
            farm_id = %stored.farm_id,
            "visitor registered"
        );
        Ok(stored)
    }
}
