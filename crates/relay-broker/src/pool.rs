//! # Broker Connection Pool
//!
//! A lazily-initialized, lock-protected shared handle to the broker, plus a
//! time-gated health check. All components in a process share one pool; the
//! pool resolves any creation race into a single shared handle.

use crate::broker::Broker;
use crate::error::BrokerError;
use crate::memory::MemoryBroker;
use crate::{DEFAULT_HEALTH_CHECK_INTERVAL_SECS, DEFAULT_MAX_CONNECTIONS};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Factory for broker handles.
///
/// This is the seam where a networked client implementation plugs in; the
/// pool itself only cares that it gets a shared [`Broker`] handle back.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Create (or connect to) the broker, sized to `max_connections`.
    async fn connect(&self, max_connections: usize) -> Result<Arc<dyn Broker>, BrokerError>;
}

/// Connector handing out handles to one shared [`MemoryBroker`].
#[derive(Clone, Default)]
pub struct MemoryConnector {
    broker: MemoryBroker,
}

impl MemoryConnector {
    /// Wrap an existing broker so multiple pools (simulating multiple
    /// processes) can share its state.
    #[must_use]
    pub fn new(broker: MemoryBroker) -> Self {
        Self { broker }
    }

    /// Direct access to the underlying broker (test aid).
    #[must_use]
    pub fn broker(&self) -> MemoryBroker {
        self.broker.clone()
    }
}

#[async_trait]
impl BrokerConnector for MemoryConnector {
    async fn connect(&self, _max_connections: usize) -> Result<Arc<dyn Broker>, BrokerError> {
        // Connection multiplexing is meaningless in-process; every handle
        // already shares the same state.
        Ok(Arc::new(self.broker.clone()))
    }
}

struct HealthState {
    last_probe: Option<Instant>,
    last_result: bool,
}

/// Pooled broker handle with health monitoring.
pub struct BrokerPool {
    connector: Arc<dyn BrokerConnector>,
    max_connections: usize,
    shared: Mutex<Option<Arc<dyn Broker>>>,
    health: Mutex<HealthState>,
    check_interval: Duration,
}

impl BrokerPool {
    /// Create a pool with the default connection count and probe interval.
    pub fn new(connector: Arc<dyn BrokerConnector>) -> Self {
        Self::with_settings(
            connector,
            DEFAULT_MAX_CONNECTIONS,
            Duration::from_secs(DEFAULT_HEALTH_CHECK_INTERVAL_SECS),
        )
    }

    /// Create a pool with explicit sizing and probe interval.
    pub fn with_settings(
        connector: Arc<dyn BrokerConnector>,
        max_connections: usize,
        check_interval: Duration,
    ) -> Self {
        Self {
            connector,
            max_connections,
            shared: Mutex::new(None),
            health: Mutex::new(HealthState {
                last_probe: None,
                last_result: true,
            }),
            check_interval,
        }
    }

    /// Maximum connection count requested from the connector.
    #[must_use]
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Get the shared broker handle, creating it on first use.
    ///
    /// Creation happens at most once per pool; concurrent first callers
    /// serialize on the guard and all observe the same handle.
    pub async fn get_connection(&self) -> Result<Arc<dyn Broker>, BrokerError> {
        let mut shared = self.shared.lock().await;
        if let Some(broker) = shared.as_ref() {
            return Ok(Arc::clone(broker));
        }

        let broker = self.connector.connect(self.max_connections).await?;
        info!(
            max_connections = self.max_connections,
            "Broker connection pool created"
        );
        *shared = Some(Arc::clone(&broker));
        Ok(broker)
    }

    /// Tear down the pool. Idempotent; safe when nothing was created.
    pub async fn close(&self) {
        let mut shared = self.shared.lock().await;
        if shared.take().is_some() {
            info!("Broker connection pool closed");
        }
    }

    /// Probe broker health, rate-limited to one round trip per interval.
    ///
    /// Within the interval window the cached result is returned without a
    /// round trip. A probe failure is logged and reported as `false`; this
    /// method never errors.
    pub async fn health_check(&self) -> bool {
        let now = Instant::now();
        {
            let health = self.health.lock().await;
            if let Some(last) = health.last_probe {
                if now.duration_since(last) < self.check_interval {
                    return health.last_result;
                }
            }
        }

        let result = match self.get_connection().await {
            Ok(broker) => match broker.ping().await {
                Ok(()) => {
                    debug!("Broker health check passed");
                    true
                }
                Err(e) => {
                    error!(error = %e, "Broker health check failed");
                    false
                }
            },
            Err(e) => {
                error!(error = %e, "Broker health check failed to connect");
                false
            }
        };

        let mut health = self.health.lock().await;
        health.last_probe = Some(now);
        health.last_result = result;
        result
    }
}
