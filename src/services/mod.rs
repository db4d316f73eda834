//! Business logic services

pub mod auth;
pub mod catalog;
pub mod email;
pub mod fines;
pub mod loans;
pub mod maintenance;
pub mod redis;
pub mod reservations;
pub mod reviews;
pub mod settings;
pub mod stats;
pub mod users;

use std::sync::Arc;

use crate::{config::AppConfig, repository::Repository};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub repository: Repository,
    pub auth: auth::AuthService,
    pub users: users::UsersService,
    pub catalog: catalog::CatalogService,
    pub loans: loans::LoansService,
    pub reservations: reservations::ReservationsService,
    pub reviews: reviews::ReviewsService,
    pub fines: fines::FinesService,
    pub settings: settings::SettingsService,
    pub stats: stats::StatsService,
    pub redis: redis::RedisService,
}

impl Services {
    /// Create all services with the given repository
    pub fn new(
        repository: Repository,
        config: &AppConfig,
        redis_service: redis::RedisService,
        notifier: Arc<dyn email::Notifier>,
    ) -> Self {
        let settings = settings::SettingsService::new(repository.clone());

        Self {
            auth: auth::AuthService::new(repository.clone(), config.auth.clone(), redis_service.clone()),
            users: users::UsersService::new(repository.clone(), redis_service.clone()),
            catalog: catalog::CatalogService::new(repository.clone(), settings.clone(), notifier.clone()),
            loans: loans::LoansService::new(repository.clone(), settings.clone(), notifier.clone()),
            reservations: reservations::ReservationsService::new(repository.clone(), settings.clone(), notifier),
            reviews: reviews::ReviewsService::new(repository.clone()),
            fines: fines::FinesService::new(repository.clone()),
            stats: stats::StatsService::new(repository.clone()),
            settings,
            redis: redis_service,
            repository,
        }
    }

    /// Background sweeps driven by the services above
    pub fn maintenance(&self, interval_secs: u64) -> maintenance::MaintenanceTask {
        maintenance::MaintenanceTask::new(self.loans.clone(), self.reservations.clone(), interval_secs)
    }
}
