//! Transport seam between the correlation engine and the broker client.

use async_trait::async_trait;

use crate::error::RpcError;

/// A reply delivery taken off the gateway's reply queue.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Correlation id carried on the broker message, if any.
    pub correlation_id: Option<String>,
    /// Raw message body.
    pub body: Vec<u8>,
}

/// Publish/liveness/teardown capability the RPC client consumes.
///
/// Implementations own the broker connection and the exclusive reply
/// queue; deliveries from that queue arrive on the stream handed to
/// [`crate::rpc::RpcClient::new`].
#[async_trait]
pub trait BrokerTransport: Send + Sync {
    /// Publish an event body under `routing_key`, carrying the
    /// correlation id and reply queue name as message properties.
    async fn publish(
        &self,
        routing_key: &str,
        correlation_id: &str,
        reply_to: &str,
        body: &[u8],
    ) -> Result<(), RpcError>;

    /// Name of the exclusive reply queue.
    fn reply_queue(&self) -> &str;

    /// Whether the underlying connection is open.
    fn is_open(&self) -> bool;

    /// Tear down the channel, then the connection.
    async fn close(&self);
}
