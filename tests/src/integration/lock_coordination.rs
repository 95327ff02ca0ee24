//! # Lock Coordination Tests
//!
//! Distributed locks and event deduplication exercised the way competing
//! workers would use them: several tasks over one shared broker, exactly
//! one inside the critical section at a time, each event processed once.

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    use relay_broker::{BrokerPool, MemoryBroker, MemoryConnector};
    use relay_sync::{ConcurrencyManager, DistributedLock, LockOptions, LockOutcome};
    use serde_json::json;

    fn pool_over(broker: MemoryBroker) -> Arc<BrokerPool> {
        Arc::new(BrokerPool::new(Arc::new(MemoryConnector::new(broker))))
    }

    #[tokio::test]
    async fn test_one_holder_at_a_time() {
        let pool = pool_over(MemoryBroker::new());
        let mut first = DistributedLock::new(Arc::clone(&pool), "report");
        let mut second = DistributedLock::new(Arc::clone(&pool), "report");

        assert!(first.acquire(false, Duration::ZERO).await);
        assert!(!second.acquire(false, Duration::ZERO).await);

        assert!(first.release().await);
        assert!(second.acquire(false, Duration::ZERO).await);
        assert!(second.release().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_acquires_after_release() {
        let pool = pool_over(MemoryBroker::new());
        let mut holder = DistributedLock::new(Arc::clone(&pool), "job");
        assert!(holder.acquire(false, Duration::ZERO).await);

        let waiter_pool = Arc::clone(&pool);
        let waiter = tokio::spawn(async move {
            let mut lock = DistributedLock::new(waiter_pool, "job");
            lock.acquire(true, DistributedLock::DEFAULT_MAX_WAIT).await
        });

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(holder.release().await);

        assert!(waiter.await.expect("waiter task"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lock_passes_to_successor() {
        let pool = pool_over(MemoryBroker::new());
        let ttl = Duration::from_secs(1);
        let mut first = DistributedLock::with_ttl(Arc::clone(&pool), "job", ttl);
        assert!(first.acquire(false, Duration::ZERO).await);

        tokio::time::sleep(ttl + Duration::from_millis(100)).await;

        let mut second = DistributedLock::new(Arc::clone(&pool), "job");
        assert!(second.acquire(false, Duration::ZERO).await);

        // The marker now belongs to the successor, so the expired holder's
        // release must not remove it.
        assert!(!first.release().await);
        assert!(second.locked());
        assert!(second.release().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_with_lock_serializes_workers() {
        let pool = pool_over(MemoryBroker::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let runs = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::new();
        for _ in 0..4 {
            let manager = ConcurrencyManager::new(Arc::clone(&pool));
            let inside = Arc::clone(&inside);
            let runs = Arc::clone(&runs);
            workers.push(tokio::spawn(async move {
                manager
                    .execute_with_lock(
                        "shared-job",
                        async move {
                            assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            inside.fetch_sub(1, Ordering::SeqCst);
                            runs.fetch_add(1, Ordering::SeqCst);
                        },
                        LockOptions::default(),
                    )
                    .await
            }));
        }

        for worker in workers {
            let outcome = timeout(Duration::from_secs(30), worker)
                .await
                .expect("worker timed out")
                .expect("worker task");
            assert!(outcome.completed());
        }
        assert_eq!(runs.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_execute_without_wait_reports_not_acquired() {
        let pool = pool_over(MemoryBroker::new());
        let manager = ConcurrencyManager::new(Arc::clone(&pool));

        let mut holder = manager.lock("batch");
        assert!(holder.acquire(false, Duration::ZERO).await);

        let options = LockOptions {
            wait: false,
            ..LockOptions::default()
        };
        let outcome = manager
            .execute_with_lock("batch", async { 7 }, options)
            .await;
        assert_eq!(outcome, LockOutcome::NotAcquired);

        assert!(holder.release().await);
    }

    #[tokio::test]
    async fn test_dedup_across_managers_sharing_a_broker() {
        let pool = pool_over(MemoryBroker::new());
        let receiver_a = ConcurrencyManager::new(Arc::clone(&pool));
        let receiver_b = ConcurrencyManager::new(Arc::clone(&pool));

        let payload = json!({"id": "order-9", "total": 12.5});

        // First receiver claims the event; every other receiver sees a
        // duplicate regardless of which handle asks.
        assert!(!receiver_a.is_duplicate_event("order_created", &payload).await);
        assert!(receiver_b.is_duplicate_event("order_created", &payload).await);
        assert!(receiver_a.is_duplicate_event("order_created", &payload).await);

        // A different id is a different event.
        let other = json!({"id": "order-10", "total": 12.5});
        assert!(!receiver_b.is_duplicate_event("order_created", &other).await);
    }

    #[tokio::test]
    async fn test_lock_and_dedup_compose_for_single_processing() {
        let pool = pool_over(MemoryBroker::new());
        let processed = Arc::new(AtomicUsize::new(0));

        // Two workers race on the same event; dedup inside the lock means
        // exactly one processes it.
        let mut workers = Vec::new();
        for _ in 0..2 {
            let manager = ConcurrencyManager::new(Arc::clone(&pool));
            let processed = Arc::clone(&processed);
            workers.push(tokio::spawn(async move {
                let payload = json!({"id": "evt-1"});
                manager
                    .execute_with_lock(
                        "evt-1",
                        async {
                            if !manager.is_duplicate_event("task_done", &payload).await {
                                processed.fetch_add(1, Ordering::SeqCst);
                            }
                        },
                        LockOptions::default(),
                    )
                    .await
            }));
        }

        for worker in workers {
            assert!(worker.await.expect("worker task").completed());
        }
        assert_eq!(processed.load(Ordering::SeqCst), 1);
    }
}
