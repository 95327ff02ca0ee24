//! # Transport Failure Tests
//!
//! Every public operation degrades rather than propagates when the broker
//! is unreachable: locks report failed attempts, the deduplicator follows
//! its configured error policy, publishes surface as `false`, and the
//! health check reports `false`. A broker double whose every operation
//! fails drives each path.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use relay_broker::{
        Broker, BrokerConnector, BrokerError, BrokerPool, ServerStats, Subscription,
    };
    use relay_config::MemoryConfigStore;
    use relay_dispatch::EventDispatcher;
    use relay_runtime::RelayContext;
    use relay_sync::{DistributedLock, ErrorPolicy, EventDeduplicator};
    use serde_json::json;

    /// Broker double simulating a dead transport: every operation errors.
    struct UnreachableBroker;

    fn transport_error() -> BrokerError {
        BrokerError::Transport {
            reason: "connection refused".to_string(),
        }
    }

    #[async_trait]
    impl Broker for UnreachableBroker {
        async fn set_nx_ex(&self, _: &str, _: &str, _: Duration) -> Result<bool, BrokerError> {
            Err(transport_error())
        }
        async fn set_ex(&self, _: &str, _: &str, _: Duration) -> Result<(), BrokerError> {
            Err(transport_error())
        }
        async fn get(&self, _: &str) -> Result<Option<String>, BrokerError> {
            Err(transport_error())
        }
        async fn compare_and_delete(&self, _: &str, _: &str) -> Result<bool, BrokerError> {
            Err(transport_error())
        }
        async fn hash_set(&self, _: &str, _: &str, _: &str) -> Result<(), BrokerError> {
            Err(transport_error())
        }
        async fn hash_get(&self, _: &str, _: &str) -> Result<Option<String>, BrokerError> {
            Err(transport_error())
        }
        async fn hash_delete(&self, _: &str, _: &str) -> Result<bool, BrokerError> {
            Err(transport_error())
        }
        async fn hash_len(&self, _: &str) -> Result<usize, BrokerError> {
            Err(transport_error())
        }
        async fn hash_fields(&self, _: &str) -> Result<Vec<String>, BrokerError> {
            Err(transport_error())
        }
        async fn expire(&self, _: &str, _: Duration) -> Result<bool, BrokerError> {
            Err(transport_error())
        }
        async fn publish(&self, _: &str, _: &str) -> Result<usize, BrokerError> {
            Err(transport_error())
        }
        async fn publish_batch(&self, _: &str, _: &[String]) -> Result<usize, BrokerError> {
            Err(transport_error())
        }
        async fn subscribe(&self, _: &str) -> Result<Subscription, BrokerError> {
            Err(transport_error())
        }
        async fn ping(&self) -> Result<(), BrokerError> {
            Err(transport_error())
        }
        async fn server_stats(&self) -> Result<ServerStats, BrokerError> {
            Err(transport_error())
        }
    }

    /// Connector that connects, but to a dead broker.
    struct UnreachableConnector;

    #[async_trait]
    impl BrokerConnector for UnreachableConnector {
        async fn connect(&self, _: usize) -> Result<Arc<dyn Broker>, BrokerError> {
            Ok(Arc::new(UnreachableBroker))
        }
    }

    /// Connector whose connection attempt itself fails.
    struct RefusingConnector;

    #[async_trait]
    impl BrokerConnector for RefusingConnector {
        async fn connect(&self, _: usize) -> Result<Arc<dyn Broker>, BrokerError> {
            Err(transport_error())
        }
    }

    fn dead_pool() -> Arc<BrokerPool> {
        Arc::new(BrokerPool::new(Arc::new(UnreachableConnector)))
    }

    #[tokio::test]
    async fn test_nonblocking_acquire_fails_on_transport_error() {
        let mut lock = DistributedLock::new(dead_pool(), "orders");
        assert!(!lock.acquire(false, Duration::ZERO).await);
        assert!(!lock.locked());
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocking_acquire_retries_then_gives_up() {
        let mut lock = DistributedLock::new(dead_pool(), "orders");

        let started = tokio::time::Instant::now();
        assert!(!lock.acquire(true, Duration::from_secs(1)).await);
        // Errors are retried like contention, so the full wait was spent.
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(!lock.locked());
    }

    #[tokio::test]
    async fn test_dedup_fail_open_admits_events() {
        let dedup = EventDeduplicator::with_settings(
            dead_pool(),
            EventDeduplicator::DEFAULT_TTL,
            ErrorPolicy::FailOpen,
        );

        // Markers cannot be planted, so every sighting reads as new.
        assert!(!dedup.is_duplicate("order_created", &json!({"id": 1})).await);
        assert!(!dedup.is_duplicate("order_created", &json!({"id": 1})).await);
        assert!(!dedup.mark_processed("order_created", &json!({"id": 1})).await);
    }

    #[tokio::test]
    async fn test_dedup_fail_closed_suppresses_events() {
        let dedup = EventDeduplicator::with_settings(
            dead_pool(),
            EventDeduplicator::DEFAULT_TTL,
            ErrorPolicy::FailClosed,
        );

        assert!(dedup.is_duplicate("order_created", &json!({"id": 1})).await);
    }

    #[tokio::test]
    async fn test_health_check_reports_failure() {
        let pool = BrokerPool::new(Arc::new(UnreachableConnector));
        assert!(!pool.health_check().await);
        // Cached result inside the probe window is the failure too.
        assert!(!pool.health_check().await);
    }

    #[tokio::test]
    async fn test_health_check_reports_connect_failure() {
        let pool = BrokerPool::new(Arc::new(RefusingConnector));
        assert!(!pool.health_check().await);
    }

    #[tokio::test]
    async fn test_dispatcher_degrades_without_raising() {
        let dispatcher = EventDispatcher::new(dead_pool());

        // Immediate path surfaces the failure as `false`.
        assert!(!dispatcher.publish("error", json!({"code": 500})).await);
        assert!(
            !dispatcher
                .publish_on("alerts", "page_view", json!({}), true)
                .await
        );

        assert!(!dispatcher.store_hash("sessions", "u1", &json!(1), None).await);
        assert_eq!(dispatcher.get_hash("sessions", "u1").await, None);
        assert!(dispatcher.memory_info().await.is_none());

        dispatcher.close().await;
    }

    #[tokio::test]
    async fn test_context_initialize_fails_fast_when_unreachable() {
        let result = RelayContext::initialize(
            Arc::new(RefusingConnector),
            Arc::new(MemoryConfigStore::new()),
        )
        .await;
        assert!(result.is_err());
    }
}
