//! System configuration service

use serde_json::Value;

use crate::{
    error::{AppError, AppResult},
    models::system_config::{ConfigEntry, LibraryPolicy, UpdateConfigEntry},
    repository::Repository,
};

#[derive(Clone)]
pub struct SettingsService {
    repository: Repository,
}

/// Policy that results from replacing `key` with `value` in `entries`
pub fn policy_with(entries: &[ConfigEntry], key: &str, value: &Value) -> Result<LibraryPolicy, String> {
    LibraryPolicy::from_entries(
        entries
            .iter()
            .filter(|e| e.key != key)
            .map(|e| (e.key.as_str(), &e.value))
            .chain(std::iter::once((key, value))),
    )
}

impl SettingsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn list(&self) -> AppResult<Vec<ConfigEntry>> {
        self.repository.system_config.list().await
    }

    pub async fn get(&self, key: &str) -> AppResult<ConfigEntry> {
        self.repository.system_config.get(key).await
    }

    /// Current circulation policy
    pub async fn policy(&self) -> AppResult<LibraryPolicy> {
        let entries = self.repository.system_config.list().await?;
        LibraryPolicy::from_entries(entries.iter().map(|e| (e.key.as_str(), &e.value))).map_err(|e| {
            AppError::Internal(format!("Stored library policy is invalid: {}", e))
        })
    }

    /// Write a key. The policy is rebuilt with the new value first and
    /// nothing is written if it does not parse or validate.
    pub async fn set(&self, key: &str, update: UpdateConfigEntry, user_id: i32) -> AppResult<ConfigEntry> {
        let key = key.trim();
        if key.is_empty() || key.len() > 100 {
            return Err(AppError::BadRequest("Invalid configuration key".to_string()));
        }

        let entries = self.repository.system_config.list().await?;
        policy_with(&entries, key, &update.value)
            .map_err(|e| AppError::Validation(format!("Invalid value for '{}': {}", key, e)))?;

        let entry = self
            .repository
            .system_config
            .upsert(key, &update.value, update.description.as_deref(), user_id)
            .await?;

        tracing::info!(key, user_id, "Configuration updated");
        Ok(entry)
    }
}
