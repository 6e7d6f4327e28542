//! Destination registry
//!
//! Named set of destinations shared by every subsystem. Connections are
//! closed once, by [`DestinationRegistry::close_all`], after the supervisor
//! has stopped every subsystem.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::RwLock;
use tracing::{error, info};

use crate::config::{DestinationConfig, DestinationKind};
use crate::error::{ConfigError, ConnectionError, Result};

use super::memory::MemoryDestination;
use super::Destination;

/// Registry of named destinations
#[derive(Default)]
pub struct DestinationRegistry {
    destinations: RwLock<HashMap<String, Arc<dyn Destination>>>,
    closed: AtomicBool,
}

impl DestinationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from configured destinations, loading any seeds
    pub async fn from_config(configs: &[DestinationConfig]) -> Result<Self> {
        let registry = Self::new();
        for config in configs {
            let destination: Arc<dyn Destination> = match config.kind {
                DestinationKind::Memory => match &config.seed {
                    Some(seed) => Arc::new(MemoryDestination::from_ndjson_file(&config.name, seed).await?),
                    None => Arc::new(MemoryDestination::new(&config.name, Vec::new())),
                },
            };
            registry.register(destination).await?;
        }
        Ok(registry)
    }

    /// Add a destination under its own name
    ///
    /// # Returns
    /// * `Err(ConfigError::InvalidValue)` - A destination with this name exists
    pub async fn register(&self, destination: Arc<dyn Destination>) -> Result<()> {
        let name = destination.name().to_string();
        let mut destinations = self.destinations.write().await;
        if destinations.contains_key(&name) {
            return Err(ConfigError::InvalidValue {
                field: "destinations.name".to_string(),
                value: name,
            }
            .into());
        }
        destinations.insert(name, destination);
        Ok(())
    }

    /// Look up a destination by name
    pub async fn get(&self, name: &str) -> Result<Arc<dyn Destination>> {
        self.destinations
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| ConnectionError::UnknownDestination(name.to_string()).into())
    }

    /// Registered names, sorted
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.destinations.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Snapshot of every registered destination
    pub async fn all(&self) -> Vec<Arc<dyn Destination>> {
        self.destinations.read().await.values().cloned().collect()
    }

    /// Close every destination
    ///
    /// Only the first call closes anything; later calls return 0. Close
    /// failures are logged and do not stop the remaining closes.
    ///
    /// # Returns
    /// * `usize` - Number of destinations closed successfully by this call
    pub async fn close_all(&self) -> usize {
        if self.closed.swap(true, Ordering::AcqRel) {
            return 0;
        }

        let mut closed = 0;
        for destination in self.all().await {
            match destination.close().await {
                Ok(()) => closed += 1,
                Err(e) => error!("Failed to close destination '{}': {}", destination.name(), e),
            }
        }
        info!("Closed {} destination(s)", closed);
        closed
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
