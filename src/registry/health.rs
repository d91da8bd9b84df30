//! Microservice health checking.
//!
//! # Responsibilities
//! - Probe `pathLive` of active microservices
//! - Re-register errored and stale-pending microservices, spaced by backoff
//! - Delete microservices whose retries are exhausted
//! - Alert on down / restored / removed

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};
use uuid::Uuid;

use crate::model::{Microservice, MicroserviceStatus};
use crate::observability::metrics;
use crate::registry::notifier::{Alert, Notifier};
use crate::registry::{MicroserviceRegistry, RegistryError};
use crate::resilience::backoff::retry_due;

pub struct HealthMonitor {
    registry: Arc<MicroserviceRegistry>,
    notifier: Arc<dyn Notifier>,
}

impl HealthMonitor {
    pub fn new(registry: Arc<MicroserviceRegistry>, notifier: Arc<dyn Notifier>) -> Self {
        Self { registry, notifier }
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let config = self.registry.config().clone();
        if !config.health_checks_enabled {
            tracing::info!("Microservice health checks disabled");
            return;
        }

        tracing::info!(
            active_interval = config.active_check_interval_secs,
            error_interval = config.error_check_interval_secs,
            "Health monitor starting"
        );

        let mut active = time::interval(Duration::from_secs(config.active_check_interval_secs));
        let mut errored = time::interval(Duration::from_secs(config.error_check_interval_secs));
        active.set_missed_tick_behavior(MissedTickBehavior::Skip);
        errored.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = active.tick() => {
                    self.check_active().await;
                }
                _ = errored.tick() => {
                    self.check_errored().await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    /// One pass over active microservices.
    pub async fn check_active(&self) {
        let store = self.registry.microservice_store();
        let active = match store.microservices(Some(MicroserviceStatus::Active)).await {
            Ok(list) => list,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list active microservices");
                return;
            }
        };

        for microservice in active {
            match self.registry.info_client().ping(&microservice).await {
                Ok(()) => self.record_success(microservice.id).await,
                Err(error) => {
                    tracing::warn!(
                        microservice = %microservice.name,
                        url = %microservice.url,
                        error = %error,
                        "Liveness check failed"
                    );
                    self.record_failure(microservice.id, error).await;
                }
            }
        }
        self.record_gauges().await;
    }

    /// One pass over errored and stale-pending microservices.
    pub async fn check_errored(&self) {
        let config = self.registry.config();
        let store = self.registry.microservice_store();
        let all = match store.microservices(None).await {
            Ok(list) => list,
            Err(e) => {
                tracing::error!(error = %e, "Failed to list microservices");
                return;
            }
        };

        let now = Utc::now();
        let pending_timeout = chrono::Duration::seconds(
            i64::try_from(config.pending_timeout_secs).unwrap_or(i64::MAX),
        );
        let candidates = all.into_iter().filter(|m| match m.status {
            MicroserviceStatus::Error => true,
            MicroserviceStatus::Pending => now - m.updated_at > pending_timeout,
            MicroserviceStatus::Active => false,
        });

        for microservice in candidates {
            let retries = microservice.info_status.num_retries;
            if retries > config.delete_after_retries {
                self.remove_exhausted(&microservice).await;
                continue;
            }
            if !retry_due(
                microservice.info_status.last_check,
                retries,
                config.retry_base_delay_ms,
                config.retry_max_delay_ms,
                now,
            ) {
                continue;
            }

            let previous = microservice.status;
            match self
                .registry
                .register(microservice.registration_request(), None)
                .await
            {
                Ok(registered) => {
                    if previous == MicroserviceStatus::Error {
                        self.notifier
                            .notify(&Alert::Restored {
                                name: registered.name,
                                url: registered.url,
                            })
                            .await;
                    }
                }
                Err(RegistryError::Conflict { .. }) => {
                    tracing::debug!(url = %microservice.url, "Registration already running, skipping");
                }
                Err(e) => self.record_failure(microservice.id, e.to_string()).await,
            }
        }
        self.record_gauges().await;
    }

    async fn record_success(&self, id: Uuid) {
        let store = self.registry.microservice_store();
        let Ok(Some(mut current)) = store.get_microservice(id).await else {
            return;
        };
        if current.status != MicroserviceStatus::Active {
            return;
        }
        current.info_status.num_retries = 0;
        current.info_status.error = None;
        current.info_status.last_check = Some(Utc::now());
        if let Err(e) = store.save_microservice(current).await {
            tracing::error!(error = %e, "Failed to save health state");
        }
    }

    /// Count a failure; alert exactly when the count reaches the threshold.
    async fn record_failure(&self, id: Uuid, error: String) {
        let store = self.registry.microservice_store();
        let Ok(Some(mut current)) = store.get_microservice(id).await else {
            return;
        };

        current.info_status.num_retries += 1;
        current.info_status.error = Some(error);
        current.info_status.last_check = Some(Utc::now());
        current.status = MicroserviceStatus::Error;

        let num_retries = current.info_status.num_retries;
        let alert = (num_retries == self.registry.config().alert_after_retries).then(|| Alert::Down {
            name: current.name.clone(),
            url: current.url.clone(),
            num_retries,
            error: current.info_status.error.clone(),
        });

        if let Err(e) = store.save_microservice(current).await {
            tracing::error!(error = %e, "Failed to save health state");
            return;
        }
        if let Some(alert) = alert {
            self.notifier.notify(&alert).await;
        }
    }

    async fn remove_exhausted(&self, microservice: &Microservice) {
        match self.registry.delete(microservice.id).await {
            Ok(_) => {
                self.notifier
                    .notify(&Alert::Removed {
                        name: microservice.name.clone(),
                        url: microservice.url.clone(),
                        num_retries: microservice.info_status.num_retries,
                    })
                    .await;
            }
            Err(e) => tracing::error!(
                microservice = %microservice.name,
                error = %e,
                "Failed to delete exhausted microservice"
            ),
        }
    }

    async fn record_gauges(&self) {
        let Ok(all) = self.registry.microservice_store().microservices(None).await else {
            return;
        };
        for status in [
            MicroserviceStatus::Pending,
            MicroserviceStatus::Active,
            MicroserviceStatus::Error,
        ] {
            let count = all.iter().filter(|m| m.status == status).count();
            metrics::record_microservices(status.as_str(), count);
        }
    }
}
