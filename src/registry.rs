//! Create-if-absent wiring for producer templates.
//!
//! Applications build one [`ProducerRegistry`] at startup and pass it (or
//! the templates it hands out) to whatever needs to publish. Asking twice
//! for the same [`ProducerConfig`] yields the same shared template, so a
//! process never opens two clients for one configuration.
//!
//! # Example
//!
//! ```rust,no_run
//! use kafka_template::{ProducerConfig, ProducerRegistry};
//! use std::sync::Arc;
//!
//! # fn example() -> kafka_template::Result<()> {
//! let registry = ProducerRegistry::new();
//! let config = ProducerConfig::new(["localhost:9092"]);
//!
//! let first = registry.get_or_create(&config)?;
//! let second = registry.get_or_create(&config)?;
//! assert!(Arc::ptr_eq(&first, &second));
//! # Ok(())
//! # }
//! ```

use crate::config::ProducerConfig;
use crate::kafka::ProducerTemplate;
use crate::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

type Factory<T> = Box<dyn Fn(&ProducerConfig) -> Result<T> + Send + Sync>;

pub struct ProducerRegistry<T = ProducerTemplate> {
    factory: Factory<T>,
    instances: Mutex<HashMap<ProducerConfig, Arc<T>>>,
}

impl ProducerRegistry<ProducerTemplate> {
    pub fn new() -> Self {
        Self::with_factory(ProducerTemplate::new)
    }

    /// Closes every template, flushing each within its `close_timeout_ms`.
    ///
    /// Templates still shared elsewhere are flushed but stay open until
    /// their last handle drops. Blocks; returns the first flush error.
    pub fn close_all(self) -> Result<()> {
        let instances = self
            .instances
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut result = Ok(());

        for (config, template) in instances {
            let closed = match Arc::try_unwrap(template) {
                Ok(template) => template.close(),
                Err(shared) => shared.flush(Duration::from_millis(config.close_timeout_ms)),
            };
            if let Err(e) = closed {
                warn!(brokers = %config.brokers(), "Failed to flush producer: {}", e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }

        result
    }
}

impl Default for ProducerRegistry<ProducerTemplate> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ProducerRegistry<T> {
    /// Creates a registry that builds instances with `factory`.
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn(&ProducerConfig) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            instances: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the instance for `config`, building it on first request.
    ///
    /// Construction errors are returned and nothing is cached, so a later
    /// call retries.
    pub fn get_or_create(&self, config: &ProducerConfig) -> Result<Arc<T>> {
        let mut instances = self.lock();

        if let Some(existing) = instances.get(config) {
            debug!(brokers = %config.brokers(), "Reusing existing producer");
            return Ok(Arc::clone(existing));
        }

        let created = Arc::new((self.factory)(config)?);
        instances.insert(config.clone(), Arc::clone(&created));
        info!(
            brokers = %config.brokers(),
            producers = instances.len(),
            "Registered new producer"
        );
        Ok(created)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ProducerConfig, Arc<T>>> {
        // the map stays consistent even if a factory panicked mid-insert
        self.instances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
