//! Periodic circulation sweeps: overdue loans and expired holds

use std::time::Duration;

use tokio::{sync::broadcast, task::JoinHandle, time::interval};

use super::{loans::LoansService, reservations::ReservationsService};

pub struct MaintenanceTask {
    loans: LoansService,
    reservations: ReservationsService,
    interval: Duration,
}

impl MaintenanceTask {
    pub fn new(loans: LoansService, reservations: ReservationsService, interval_secs: u64) -> Self {
        Self {
            loans,
            reservations,
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// One sweep. Errors are logged; the next tick tries again.
    pub async fn run_cycle(&self) {
        match self.loans.process_overdue().await {
            Ok(0) => {}
            Ok(count) => tracing::info!(count, "Maintenance: loans marked overdue"),
            Err(e) => tracing::error!("Maintenance: overdue processing failed: {}", e),
        }

        match self.reservations.expire_holds().await {
            Ok(0) => {}
            Ok(count) => tracing::info!(count, "Maintenance: holds expired"),
            Err(e) => tracing::error!("Maintenance: hold expiry failed: {}", e),
        }
    }

    /// Run sweeps every interval until `shutdown` fires
    pub fn start(self, mut shutdown: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            tracing::info!(interval_secs = self.interval.as_secs(), "Maintenance task started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.run_cycle().await,
                    _ = shutdown.recv() => {
                        tracing::info!("Maintenance task stopping");
                        break;
                    }
                }
            }
        })
    }
}
