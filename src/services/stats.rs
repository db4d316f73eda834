//! Statistics service

use crate::{error::AppResult, models::stats::LibraryStats, repository::Repository};

#[derive(Clone)]
pub struct StatsService {
    repository: Repository,
}

impl StatsService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn library_stats(&self) -> AppResult<LibraryStats> {
        self.repository.stats.library_stats().await
    }
}
