//! In-memory broker transport for tests.
//!
//! Stands in for [`crate::rpc::AmqpTransport`]: publishes are recorded on
//! a channel the test drains, and the test injects reply deliveries on
//! the stream the [`crate::rpc::RpcClient`] consumes.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::RpcError;
use crate::rpc::broker::{BrokerTransport, Delivery};

/// One recorded publish.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub routing_key: String,
    pub correlation_id: String,
    pub reply_to: String,
    pub body: Vec<u8>,
}

/// In-memory [`BrokerTransport`] with switchable liveness and publish
/// failure injection.
pub struct MemoryTransport {
    published: mpsc::UnboundedSender<PublishedEvent>,
    reply_queue: String,
    open: AtomicBool,
    fail_publish: AtomicBool,
}

impl MemoryTransport {
    /// Simulate a broker connection drop (or recovery).
    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    /// Make subsequent publishes fail.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BrokerTransport for MemoryTransport {
    async fn publish(
        &self,
        routing_key: &str,
        correlation_id: &str,
        reply_to: &str,
        body: &[u8],
    ) -> Result<(), RpcError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(RpcError::Publish("injected publish failure".to_string()));
        }
        let event = PublishedEvent {
            routing_key: routing_key.to_string(),
            correlation_id: correlation_id.to_string(),
            reply_to: reply_to.to_string(),
            body: body.to_vec(),
        };
        self.published
            .send(event)
            .map_err(|_| RpcError::Publish("publish recorder dropped".to_string()))?;
        Ok(())
    }

    fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// Both ends of an in-memory broker: the transport plus the test-side
/// handles for observing publishes and injecting replies.
pub struct MemoryBus {
    pub transport: Arc<MemoryTransport>,
    /// Publishes made through the transport, in order.
    pub published: mpsc::UnboundedReceiver<PublishedEvent>,
    /// Inject reply deliveries here.
    pub replies: mpsc::Sender<Delivery>,
    /// Hand this to [`crate::rpc::RpcClient::new`].
    pub deliveries: mpsc::Receiver<Delivery>,
}

impl MemoryBus {
    pub fn new() -> Self {
        let (published_tx, published_rx) = mpsc::unbounded_channel();
        let (replies_tx, deliveries_rx) = mpsc::channel(16);
        Self {
            transport: Arc::new(MemoryTransport {
                published: published_tx,
                reply_queue: "amq.gen-test-reply".to_string(),
                open: AtomicBool::new(true),
                fail_publish: AtomicBool::new(false),
            }),
            published: published_rx,
            replies: replies_tx,
            deliveries: deliveries_rx,
        }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}
