//! Registered provider adapters and their batch operations
//!
//! Batch operations run one task per provider in a `JoinSet`. Each task's
//! outcome is collected individually, so a provider that fails or panics never
//! stops the others from completing.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tracing::{error, info};

use super::http_feed::HttpFeedProvider;
use super::traits::ProviderAdapter;
use crate::config::Config;
use crate::errors::{AppResult, ProviderError, ProviderResult};
use crate::models::Event;

/// Per-provider outcome of a batch
pub type BatchOutcome<T> = BTreeMap<String, ProviderResult<T>>;

#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<BTreeMap<String, Arc<dyn ProviderAdapter>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build HTTP feed adapters for every enabled provider declaration
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let mut providers: BTreeMap<String, Arc<dyn ProviderAdapter>> = BTreeMap::new();
        for declaration in config.providers.iter().filter(|p| p.enabled) {
            let adapter = HttpFeedProvider::new(declaration.clone(), config.timers.upstream_timeout)?;
            providers.insert(declaration.name.clone(), Arc::new(adapter));
        }
        info!("Registered {} provider(s)", providers.len());
        Ok(Self {
            providers: RwLock::new(providers),
        })
    }

    pub async fn register(&self, adapter: Arc<dyn ProviderAdapter>) {
        self.providers
            .write()
            .await
            .insert(adapter.name().to_string(), adapter);
    }

    pub async fn unregister(&self, name: &str) -> bool {
        self.providers.write().await.remove(name).is_some()
    }

    pub async fn get(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.providers.read().await.get(name).cloned()
    }

    async fn all(&self) -> Vec<Arc<dyn ProviderAdapter>> {
        self.providers.read().await.values().cloned().collect()
    }

    pub async fn initialize_all(&self) -> BatchOutcome<()> {
        self.run_batch("initialize", |adapter| async move { adapter.initialize().await })
            .await
    }

    pub async fn fetch_all_schedules(&self) -> BatchOutcome<Vec<Event>> {
        self.run_batch("schedule fetch", |adapter| async move {
            adapter.get_schedule().await
        })
        .await
    }

    pub async fn refresh_all_tokens(&self) -> BatchOutcome<()> {
        self.run_batch("token refresh", |adapter| async move {
            adapter.refresh_tokens().await
        })
        .await
    }

    async fn run_batch<T, F, Fut>(&self, operation: &str, op: F) -> BatchOutcome<T>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn ProviderAdapter>) -> Fut,
        Fut: std::future::Future<Output = ProviderResult<T>> + Send + 'static,
    {
        let mut set = JoinSet::new();
        let mut pending = BTreeSet::new();
        for adapter in self.all().await {
            let name = adapter.name().to_string();
            pending.insert(name.clone());
            let fut = op(adapter);
            set.spawn(async move { (name, fut.await) });
        }

        let mut outcome = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((name, result)) => {
                    if let Err(e) = &result {
                        error!("Provider {} {} failed: {}", name, operation, e);
                    }
                    pending.remove(&name);
                    outcome.insert(name, result);
                }
                Err(join_error) => error!("Provider {} task aborted: {}", operation, join_error),
            }
        }
        // Whatever is still pending panicked before reporting back
        for name in pending {
            let err = ProviderError::unavailable(&name, format!("{operation} task panicked"));
            outcome.insert(name, Err(err));
        }
        outcome
    }
}
