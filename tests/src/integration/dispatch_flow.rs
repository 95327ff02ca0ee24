//! # Dispatch Flow Tests
//!
//! End-to-end publishing behavior over a shared broker:
//!
//! 1. **Critical bypass**: `error`/`critical` events reach subscribers
//!    immediately, never a queue.
//! 2. **Size-threshold flush**: the event that fills a queue to the
//!    threshold goes out immediately.
//! 3. **Capacity cap**: a saturated channel drops new events; only a
//!    forced publish bypasses the queue.
//! 4. **Shutdown drain**: `close()` flushes every queued event exactly once.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    use relay_broker::{Broker, BrokerPool, MemoryBroker, MemoryConnector, Subscription};
    use relay_dispatch::{
        EventDispatcher, EventThrottler, WireEvent, DEFAULT_CHANNEL,
    };
    use serde_json::json;

    fn dispatcher_over(broker: MemoryBroker) -> EventDispatcher {
        let pool = Arc::new(BrokerPool::new(Arc::new(MemoryConnector::new(broker))));
        EventDispatcher::new(pool)
    }

    async fn recv_wire(sub: &mut Subscription) -> WireEvent {
        let raw = timeout(Duration::from_secs(1), sub.recv())
            .await
            .expect("timed out waiting for event")
            .expect("subscription closed");
        serde_json::from_str(&raw).expect("wire event")
    }

    #[tokio::test]
    async fn test_critical_events_reach_subscribers_immediately() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe(DEFAULT_CHANNEL).await.unwrap();
        let dispatcher = dispatcher_over(broker);

        assert!(dispatcher.publish("error", json!({"code": 500})).await);
        assert!(dispatcher.publish("critical", json!({"code": 503})).await);

        assert_eq!(recv_wire(&mut sub).await.event_type, "error");
        assert_eq!(recv_wire(&mut sub).await.event_type, "critical");

        let stats = dispatcher.stats();
        assert_eq!(stats.events_published, 2);
        assert_eq!(stats.events_throttled, 0);

        dispatcher.close().await;
    }

    #[tokio::test]
    async fn test_size_threshold_triggers_immediate_publish() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe(DEFAULT_CHANNEL).await.unwrap();
        let dispatcher = dispatcher_over(broker);

        // Fill the queue to one below the threshold; nothing goes out.
        for n in 0..EventThrottler::DEFAULT_SIZE_THRESHOLD - 1 {
            assert!(dispatcher.publish("page_view", json!({ "n": n })).await);
        }
        assert!(matches!(sub.try_recv(), Ok(None)));

        // The threshold event is published immediately.
        assert!(dispatcher.publish("page_view", json!({"n": "last"})).await);
        let wire = recv_wire(&mut sub).await;
        assert_eq!(wire.payload, json!({"n": "last"}));

        let stats = dispatcher.stats();
        assert_eq!(stats.events_published, 1);
        assert_eq!(
            stats.events_throttled,
            (EventThrottler::DEFAULT_SIZE_THRESHOLD - 1) as u64
        );

        dispatcher.close().await;
    }

    #[tokio::test]
    async fn test_saturated_channel_drops_new_events() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe(DEFAULT_CHANNEL).await.unwrap();
        let dispatcher = dispatcher_over(broker);

        // Saturate the queue directly; publishing through the dispatcher
        // would flush it at the size threshold first.
        for n in 0..EventThrottler::DEFAULT_HARD_CAP {
            dispatcher
                .throttler()
                .add_event(DEFAULT_CHANNEL, "page_view", json!({ "n": n }));
        }

        // The capacity check runs before the criticality check, so a
        // saturated channel rejects critical events too.
        assert!(dispatcher.publish("page_view", json!({"n": "over"})).await);
        assert!(dispatcher.publish("error", json!({"code": 500})).await);
        assert_eq!(dispatcher.stats().events_rejected, 2);
        assert!(matches!(sub.try_recv(), Ok(None)));

        // A forced publish never touches the queue.
        assert!(
            dispatcher
                .publish_on(DEFAULT_CHANNEL, "error", json!({"code": 503}), true)
                .await
        );
        let wire = recv_wire(&mut sub).await;
        assert_eq!(wire.payload, json!({"code": 503}));

        dispatcher.close().await;
    }

    #[tokio::test]
    async fn test_close_drains_every_queued_event_once() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe(DEFAULT_CHANNEL).await.unwrap();
        let dispatcher = dispatcher_over(broker);

        for n in 0..5 {
            assert!(dispatcher.publish("page_view", json!({ "n": n })).await);
        }
        dispatcher.close().await;

        for n in 0..5 {
            let wire = recv_wire(&mut sub).await;
            assert_eq!(wire.payload, json!({ "n": n }));
        }
        assert!(matches!(sub.try_recv(), Ok(None)));
        assert_eq!(dispatcher.stats().events_batched, 5);
    }

    #[tokio::test]
    async fn test_channels_are_throttled_independently() {
        let broker = MemoryBroker::new();
        let mut alerts = broker.subscribe("alerts").await.unwrap();
        let mut app = broker.subscribe(DEFAULT_CHANNEL).await.unwrap();
        let dispatcher = dispatcher_over(broker);

        assert!(dispatcher.publish("page_view", json!({"n": 1})).await);
        assert!(
            dispatcher
                .publish_on("alerts", "page_view", json!({"n": 2}), true)
                .await
        );

        // Forced publish on one channel leaves the other channel queued.
        let wire = recv_wire(&mut alerts).await;
        assert_eq!(wire.payload, json!({"n": 2}));
        assert!(matches!(app.try_recv(), Ok(None)));

        dispatcher.close().await;
    }
}
