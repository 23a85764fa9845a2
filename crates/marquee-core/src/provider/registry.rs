//! Provider capability table

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use super::{Provider, ProviderFactory};
use crate::error::{Error, Result};
use crate::types::{PlaylistItem, SourceKind};

/// Fetches provider factories that are not bundled up front
#[async_trait]
pub trait ProviderLoader: Send + Sync {
    async fn load(&self, name: &str) -> Result<Arc<dyn ProviderFactory>>;
}

/// One row of the capability table
#[derive(Clone)]
pub struct ProviderEntry {
    pub name: String,
    pub supports: Vec<SourceKind>,
    factory: Option<Arc<dyn ProviderFactory>>,
}

impl ProviderEntry {
    /// Entry whose factory is available immediately
    pub fn loaded(factory: Arc<dyn ProviderFactory>, supports: Vec<SourceKind>) -> Self {
        Self {
            name: factory.name().to_string(),
            supports,
            factory: Some(factory),
        }
    }

    /// Entry whose factory is fetched through the loader on first use
    pub fn deferred(name: impl Into<String>, supports: Vec<SourceKind>) -> Self {
        Self {
            name: name.into(),
            supports,
            factory: None,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.factory.is_some()
    }
}

impl std::fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("name", &self.name)
            .field("supports", &self.supports)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

type FactoryFuture = Shared<BoxFuture<'static, Result<Arc<dyn ProviderFactory>>>>;

/// Ordered capability table; the first entry supporting a source wins
pub struct ProviderRegistry {
    entries: Mutex<Vec<ProviderEntry>>,
    loader: Option<Arc<dyn ProviderLoader>>,
    in_flight: Mutex<HashMap<String, FactoryFuture>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            loader: None,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_loader(loader: Arc<dyn ProviderLoader>) -> Self {
        Self {
            loader: Some(loader),
            ..Self::new()
        }
    }

    pub fn register(&self, entry: ProviderEntry) {
        debug!(name = %entry.name, supports = ?entry.supports, "Registering provider");
        self.entries.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<ProviderEntry> {
        self.entries.lock().clone()
    }

    /// Name of the provider that should play `item`
    pub fn choose(&self, item: &PlaylistItem) -> Result<String> {
        let source = item.first_source().ok_or(Error::NoMedia)?;
        let kind = source.kind();
        self.entries
            .lock()
            .iter()
            .find(|entry| entry.supports.contains(&kind))
            .map(|entry| entry.name.clone())
            .ok_or_else(|| Error::NoSuitableProvider(format!("{} ({})", source.file, kind)))
    }

    /// Whether the provider already chosen for an item can also play `item`
    pub fn provider_can_play(&self, provider: &dyn Provider, item: &PlaylistItem) -> bool {
        self.choose(item)
            .map(|name| name == provider.name())
            .unwrap_or(false)
    }

    /// Factory for `name`, loading it first if it is deferred.
    ///
    /// Concurrent requests for the same provider share one load.
    #[instrument(skip(self))]
    pub async fn factory(&self, name: &str) -> Result<Arc<dyn ProviderFactory>> {
        let fut = {
            let entries = self.entries.lock();
            let entry = entries
                .iter()
                .find(|e| e.name == name)
                .ok_or_else(|| Error::NoSuitableProvider(name.to_string()))?;
            if let Some(factory) = &entry.factory {
                return Ok(factory.clone());
            }
            drop(entries);

            let loader = self.loader.clone().ok_or_else(|| Error::ProviderLoad {
                name: name.to_string(),
                reason: "no provider loader configured".to_string(),
            })?;
            let mut in_flight = self.in_flight.lock();
            in_flight
                .entry(name.to_string())
                .or_insert_with(|| {
                    let name = name.to_string();
                    async move {
                        info!(provider = %name, "Loading provider");
                        loader.load(&name).await.map_err(|e| match e {
                            Error::ProviderLoad { .. } => e,
                            other => Error::ProviderLoad {
                                name,
                                reason: other.to_string(),
                            },
                        })
                    }
                    .boxed()
                    .shared()
                })
                .clone()
        };

        let result = fut.await;
        self.in_flight.lock().remove(name);
        match &result {
            Ok(factory) => {
                let mut entries = self.entries.lock();
                if let Some(entry) = entries.iter_mut().find(|e| e.name == name) {
                    entry.factory = Some(factory.clone());
                }
            }
            Err(e) => warn!(provider = %name, error = %e, "Provider load failed"),
        }
        result
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
