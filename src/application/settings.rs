//! Settings write path: validate, persist, then invalidate the cache.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{RepoError, SettingsRepo};
use crate::cache::SettingsCache;
use crate::domain::error::DomainError;
use crate::domain::settings::{SettingsPatch, SystemSettings};

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct SettingsService {
    repo: Arc<dyn SettingsRepo>,
    cache: Arc<SettingsCache>,
}

impl SettingsService {
    pub fn new(repo: Arc<dyn SettingsRepo>, cache: Arc<SettingsCache>) -> Self {
        Self { repo, cache }
    }

    /// Current settings as served to readers.
    pub async fn current(&self) -> Arc<SystemSettings> {
        self.cache.get_settings().await
    }

    /// Apply `patch` to the stored settings.
    ///
    /// The cache is invalidated only once the backend has accepted the write,
    /// so a rejected update leaves readers on the previous value.
    pub async fn update(&self, patch: SettingsPatch) -> Result<SystemSettings, SettingsError> {
        patch.validate()?;

        let mut record = match self.repo.load_system_settings().await {
            Ok(record) => record,
            Err(RepoError::NotFound) => SystemSettings::default(),
            Err(err) => return Err(err.into()),
        };
        patch.apply(&mut record);

        let stored = self.repo.upsert_system_settings(record).await?;
        self.cache.invalidate();

        info!(
            target = "farmgate::application::settings",
            settings_id = %stored.id,
            "system settings updated"
        );
        Ok(stored)
    }
}
