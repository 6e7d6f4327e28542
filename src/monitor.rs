//! Destination health monitor
//!
//! A supervised subsystem that pings every registered destination on a
//! fixed interval and logs the ones that stop answering. It exits when the
//! supervisor cancels it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::destination::DestinationRegistry;
use crate::error::Result;
use crate::supervisor::Subsystem;

/// Outcome of one round of health checks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HealthReport {
    pub healthy: Vec<String>,
    pub unhealthy: Vec<(String, String)>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.unhealthy.is_empty()
    }
}

/// Periodic destination health checks
pub struct HealthMonitor {
    registry: Arc<DestinationRegistry>,
    interval: Duration,
}

impl HealthMonitor {
    pub fn new(registry: Arc<DestinationRegistry>, interval: Duration) -> Self {
        Self { registry, interval }
    }

    /// Ping every destination once
    pub async fn check_all(&self) -> HealthReport {
        let mut report = HealthReport::default();
        for destination in self.registry.all().await {
            let name = destination.name().to_string();
            match destination.ping().await {
                Ok(()) => report.healthy.push(name),
                Err(e) => {
                    warn!("Destination '{}' failed health check: {}", name, e);
                    report.unhealthy.push((name, e.to_string()));
                }
            }
        }
        report.healthy.sort();
        report.unhealthy.sort();
        report
    }
}

#[async_trait]
impl Subsystem for HealthMonitor {
    fn name(&self) -> &str {
        "health-monitor"
    }

    async fn run(&self, shutdown: CancellationToken) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Health monitor running every {:?}", self.interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.check_all().await;
                    debug!(
                        "Health check: {} healthy, {} unhealthy",
                        report.healthy.len(),
                        report.unhealthy.len()
                    );
                }
            }
        }

        debug!("Health monitor stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::destination::{Destination, MemoryDestination};
    use crate::supervisor::{Lifecycle, Supervisor};

    async fn registry_with(names: &[&str]) -> Arc<DestinationRegistry> {
        let registry = Arc::new(DestinationRegistry::new());
        for name in names {
            registry
                .register(Arc::new(MemoryDestination::new(*name, Vec::new())))
                .await
                .unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn test_check_all_reports_closed_destinations() {
        let registry = registry_with(&["a", "b"]).await;
        registry.get("b").await.unwrap().close().await.unwrap();

        let monitor = HealthMonitor::new(registry, Duration::from_secs(30));
        let report = monitor.check_all().await;

        assert_eq!(report.healthy, vec!["a".to_string()]);
        assert_eq!(report.unhealthy.len(), 1);
        assert_eq!(report.unhealthy[0].0, "b");
        assert!(!report.is_healthy());
    }

    #[tokio::test]
    async fn test_monitor_stops_on_cancel() {
        let registry = registry_with(&["a"]).await;
        let monitor = Arc::new(HealthMonitor::new(registry.clone(), Duration::from_millis(5)));

        let mut supervisor = Supervisor::new();
        supervisor.register_subsystem(monitor).unwrap();
        let teardown_registry = registry.clone();
        supervisor
            .on_stopped(move || async move {
                teardown_registry.close_all().await;
            })
            .unwrap();

        supervisor.start_with_signal(std::future::pending()).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        supervisor.shutdown();
        supervisor.wait().await.unwrap();

        assert_eq!(supervisor.state(), Lifecycle::Stopped);
        assert_eq!(supervisor.completed(), 1);
        assert!(registry.is_closed());
    }
}
