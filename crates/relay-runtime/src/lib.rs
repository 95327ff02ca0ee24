//! # Relay Runtime
//!
//! One explicit context object per process instead of global singletons:
//! [`RelayContext`] is constructed at startup from a broker connector and a
//! durable config store, owns every relay subsystem, and is passed (or
//! injected) wherever broker access is needed. Lifecycle is created at
//! startup, torn down via [`RelayContext::shutdown`].
//!
//! ## Startup Sequence
//!
//! 1. `init_tracing` (once per process)
//! 2. `RelayContext::initialize(connector, store)`
//! 3. `context.config.load()` + `context.config.start_listener()`
//! 4. Application runs, publishing through `context.dispatcher`
//! 5. `context.shutdown()` drains flush tasks and closes the pool

use relay_broker::{BrokerConnector, BrokerError, BrokerPool};
use relay_config::{ConfigError, ConfigStore, SyncedConfig};
use relay_dispatch::EventDispatcher;
use relay_sync::ConcurrencyManager;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Errors surfaced while bringing a context up.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The broker could not be reached during initialization.
    #[error("Runtime broker error: {0}")]
    Broker(#[from] BrokerError),

    /// The configuration subsystem failed to come up.
    #[error("Runtime config error: {0}")]
    Config(#[from] ConfigError),
}

/// Process-wide context owning every relay subsystem.
pub struct RelayContext {
    /// Shared broker connection pool.
    pub pool: Arc<BrokerPool>,
    /// Throttled publish/subscribe facade.
    pub dispatcher: Arc<EventDispatcher>,
    /// Distributed locks and event deduplication.
    pub concurrency: ConcurrencyManager,
    /// Cross-process configuration cache.
    pub config: SyncedConfig,
}

impl RelayContext {
    /// Build the full context from a connector and a config store.
    ///
    /// Establishes the shared broker handle eagerly so startup fails fast
    /// when the broker is unreachable.
    pub async fn initialize(
        connector: Arc<dyn BrokerConnector>,
        store: Arc<dyn ConfigStore>,
    ) -> Result<Self, RuntimeError> {
        let pool = Arc::new(BrokerPool::new(connector));
        let broker = pool.get_connection().await?;

        let dispatcher = Arc::new(EventDispatcher::new(Arc::clone(&pool)));
        let concurrency = ConcurrencyManager::new(Arc::clone(&pool));
        let config = SyncedConfig::new(store, broker);

        info!("Relay context initialized");
        Ok(Self {
            pool,
            dispatcher,
            concurrency,
            config,
        })
    }

    /// Tear the context down: drain and stop flush tasks, close the pool.
    pub async fn shutdown(&self) {
        self.dispatcher.close().await;
        info!("Relay context shut down");
    }
}

/// Install the process-wide tracing subscriber.
///
/// Honors `RUST_LOG` when set, falling back to `default_filter`. Safe to
/// call more than once; later calls are no-ops.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init();
}
