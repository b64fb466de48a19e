//! The RPC client: publishes request events and rendezvouses replies
//! with waiting callers through the correlation registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::RpcError;
use crate::rpc::broker::{BrokerTransport, Delivery};
use crate::rpc::envelope::{derive_routing_key, AgentReply, EventEnvelope};
use crate::rpc::registry::CorrelationRegistry;

/// Blocking request/response client over a topic-routed broker.
///
/// One `RpcClient` serves every concurrent HTTP request: calls register a
/// correlation id, publish, and suspend until the background consumer
/// delivers the matching reply or the deadline passes.
pub struct RpcClient {
    transport: Arc<dyn BrokerTransport>,
    registry: Arc<CorrelationRegistry>,
    closed: AtomicBool,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl RpcClient {
    /// Create a client over `transport` and start the consumer loop on
    /// the delivery stream.
    pub fn new(transport: Arc<dyn BrokerTransport>, deliveries: mpsc::Receiver<Delivery>) -> Self {
        let registry = Arc::new(CorrelationRegistry::new());
        let consumer = tokio::spawn(consume(registry.clone(), deliveries));
        Self {
            transport,
            registry,
            closed: AtomicBool::new(false),
            consumer: Mutex::new(Some(consumer)),
        }
    }

    /// Publish `payload` as `event_type` and wait for the correlated
    /// reply.
    ///
    /// Returns the reply, [`RpcError::Timeout`] when `timeout` elapses
    /// first, or the publish failure. Cancelling the returned future
    /// abandons the wait; in every case the correlation id leaves the
    /// registry before this call resolves or is dropped.
    pub async fn call(
        &self,
        event_type: &str,
        payload: Map<String, Value>,
        timeout: Duration,
    ) -> Result<AgentReply, RpcError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RpcError::Closed);
        }

        let correlation_id = Uuid::new_v4().to_string();
        let receiver = self.registry.register(&correlation_id)?;
        let _cleanup = RemoveOnExit {
            registry: &self.registry,
            id: &correlation_id,
        };

        let envelope = EventEnvelope::new(event_type, payload);
        let body = serde_json::to_vec(&envelope)?;
        let routing_key = derive_routing_key(event_type);

        self.transport
            .publish(
                &routing_key,
                &correlation_id,
                self.transport.reply_queue(),
                &body,
            )
            .await?;

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(reply)) => Ok(reply),
            // The sender can only vanish if the registration was torn down
            // underneath us, which means the client is shutting down.
            Ok(Err(_)) => Err(RpcError::Closed),
            Err(_) => Err(RpcError::Timeout),
        }
    }

    /// Whether the broker connection is usable.
    pub fn ready(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.transport.is_open()
    }

    /// Number of calls currently awaiting a reply.
    pub fn in_flight(&self) -> usize {
        self.registry.len()
    }

    /// Mark the client closed and tear down the transport. Subsequent
    /// calls fail fast with [`RpcError::Closed`].
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.transport.close().await;
        if let Some(consumer) = self.consumer.lock().take() {
            consumer.abort();
        }
    }
}

/// Removes a correlation id from the registry when the owning call exits,
/// whether by reply, timeout, error, or cancellation.
struct RemoveOnExit<'a> {
    registry: &'a CorrelationRegistry,
    id: &'a str,
}

impl Drop for RemoveOnExit<'_> {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

/// Decode each delivery and hand it to the waiting caller. Unknown
/// correlation ids legitimately belong to other gateway instances on the
/// shared exchange and are dropped without fuss. The loop ends when the
/// delivery stream closes; waiting callers are left to their timeouts.
async fn consume(registry: Arc<CorrelationRegistry>, mut deliveries: mpsc::Receiver<Delivery>) {
    while let Some(delivery) = deliveries.recv().await {
        let Some(correlation_id) = delivery.correlation_id else {
            debug!("discarding delivery without correlation id");
            continue;
        };

        let reply: AgentReply = match serde_json::from_slice(&delivery.body) {
            Ok(reply) => reply,
            Err(err) => {
                warn!("failed to parse reply event: {err}");
                continue;
            }
        };

        if !registry.deliver(&correlation_id, reply) {
            debug!(%correlation_id, "discarding reply with no pending call");
        }
    }
    debug!("reply consumer loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::testing::MemoryBus;
    use serde_json::json;

    fn payload(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    fn reply_body(event_type: &str, data: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "specversion": "1.0",
            "id": "e-1",
            "type": event_type,
            "source": "/auth-agent",
            "time": "2026-01-01T00:00:00Z",
            "datacontenttype": "application/json",
            "data": data,
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn call_resolves_with_matching_reply() {
        let MemoryBus {
            transport,
            mut published,
            replies,
            deliveries,
        } = MemoryBus::new();
        let client = RpcClient::new(transport.clone(), deliveries);

        let responder = tokio::spawn(async move {
            let event = published.recv().await.unwrap();
            assert_eq!(event.routing_key, "auth.login.requested");
            assert_eq!(event.reply_to, transport.reply_queue());

            let envelope: EventEnvelope = serde_json::from_slice(&event.body).unwrap();
            assert_eq!(envelope.data["user"], "a");

            replies
                .send(Delivery {
                    correlation_id: Some(event.correlation_id.clone()),
                    body: reply_body(
                        "io.agenteco.auth.login.succeeded.v1",
                        json!({"token": "T"}),
                    ),
                })
                .await
                .unwrap();
        });

        let reply = client
            .call(
                "io.agenteco.auth.login.requested.v1",
                payload(&[("user", "a")]),
                Duration::from_secs(1),
            )
            .await
            .unwrap();

        assert_eq!(reply.event_type, "io.agenteco.auth.login.succeeded.v1");
        assert_eq!(reply.data["token"], "T");
        assert_eq!(client.in_flight(), 0);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn call_times_out_and_cleans_registry() {
        let bus = MemoryBus::new();
        let client = RpcClient::new(bus.transport.clone(), bus.deliveries);

        let err = client
            .call(
                "io.agenteco.auth.login.requested.v1",
                Map::new(),
                Duration::from_millis(50),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, RpcError::Timeout));
        assert_eq!(client.in_flight(), 0);
    }

    #[tokio::test]
    async fn cancelled_call_cleans_registry() {
        let MemoryBus {
            transport,
            mut published,
            deliveries,
            ..
        } = MemoryBus::new();
        let client = RpcClient::new(transport, deliveries);

        let call = client.call(
            "io.agenteco.auth.login.requested.v1",
            Map::new(),
            Duration::from_secs(60),
        );
        // Abandon the call long before its own deadline.
        let result = tokio::time::timeout(Duration::from_millis(50), call).await;
        assert!(result.is_err());
        assert_eq!(client.in_flight(), 0);

        // The publish itself was committed before the caller gave up.
        assert!(published.recv().await.is_some());
    }

    #[tokio::test]
    async fn publish_failure_is_returned_and_cleaned_up() {
        let bus = MemoryBus::new();
        bus.transport.fail_publishes(true);
        let client = RpcClient::new(bus.transport.clone(), bus.deliveries);

        let err = client
            .call("io.agenteco.a.b.c.v1", Map::new(), Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(err, RpcError::Publish(_)));
        assert_eq!(client.in_flight(), 0);
    }

    #[tokio::test]
    async fn closed_client_fails_fast() {
        let bus = MemoryBus::new();
        let client = RpcClient::new(bus.transport.clone(), bus.deliveries);

        client.close().await;
        assert!(!client.ready());

        let err = client
            .call("io.agenteco.a.b.c.v1", Map::new(), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::Closed));
    }

    #[tokio::test]
    async fn foreign_correlation_id_is_discarded() {
        let bus = MemoryBus::new();
        let client = RpcClient::new(bus.transport.clone(), bus.deliveries);

        bus.replies
            .send(Delivery {
                correlation_id: Some("someone-elses-call".to_string()),
                body: reply_body("io.agenteco.a.b.c.v1", json!({})),
            })
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(client.in_flight(), 0);
        assert!(client.ready());
    }

    #[tokio::test]
    async fn malformed_reply_does_not_kill_the_consumer() {
        let MemoryBus {
            transport,
            mut published,
            replies,
            deliveries,
        } = MemoryBus::new();
        let client = RpcClient::new(transport, deliveries);

        replies
            .send(Delivery {
                correlation_id: Some("c-1".to_string()),
                body: b"not json at all".to_vec(),
            })
            .await
            .unwrap();

        // A well-formed exchange still succeeds afterwards.
        let responder = tokio::spawn(async move {
            let event = published.recv().await.unwrap();
            replies
                .send(Delivery {
                    correlation_id: Some(event.correlation_id.clone()),
                    body: reply_body("io.agenteco.a.b.done.v1", json!({"ok": true})),
                })
                .await
                .unwrap();
        });

        let reply = client
            .call("io.agenteco.a.b.c.v1", Map::new(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply.data["ok"], true);
        responder.await.unwrap();
    }

    #[tokio::test]
    async fn ready_reflects_transport_liveness() {
        let bus = MemoryBus::new();
        let client = RpcClient::new(bus.transport.clone(), bus.deliveries);

        assert!(client.ready());
        bus.transport.set_open(false);
        assert!(!client.ready());
    }
}
