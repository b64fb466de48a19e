//! RabbitMQ transport backed by lapin.

use async_trait::async_trait;
use futures::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::RpcError;
use crate::rpc::broker::{BrokerTransport, Delivery};

/// Consumer tag used on the reply queue.
const CONSUMER_TAG: &str = "agent-gateway";

/// Buffered deliveries between the broker consumer and the RPC client.
const DELIVERY_BUFFER: usize = 64;

/// AMQP 0.9.1 transport: one connection, one channel, a durable topic
/// exchange, and a server-named exclusive auto-delete reply queue.
pub struct AmqpTransport {
    connection: Connection,
    channel: Channel,
    exchange: String,
    reply_queue: String,
}

impl AmqpTransport {
    /// Dial the broker and set up the reply path.
    ///
    /// Declares `exchange` as a durable topic exchange, declares the
    /// reply queue, binds it with each of `bind_patterns`, and starts an
    /// auto-ack exclusive consumer. Deliveries arrive on the returned
    /// channel; the stream closes when the broker channel closes.
    pub async fn connect(
        url: &str,
        exchange: &str,
        bind_patterns: &[String],
    ) -> Result<(Self, mpsc::Receiver<Delivery>), RpcError> {
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        let reply_queue = queue.name().as_str().to_string();

        for pattern in bind_patterns {
            channel
                .queue_bind(
                    &reply_queue,
                    exchange,
                    pattern,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }

        let consumer = channel
            .basic_consume(
                &reply_queue,
                CONSUMER_TAG,
                BasicConsumeOptions {
                    no_ack: true,
                    exclusive: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        let (tx, rx) = mpsc::channel(DELIVERY_BUFFER);
        tokio::spawn(forward_deliveries(consumer, tx));

        Ok((
            Self {
                connection,
                channel,
                exchange: exchange.to_string(),
                reply_queue,
            },
            rx,
        ))
    }
}

/// Forward broker deliveries into the client's delivery stream until the
/// consumer or the receiving side goes away.
async fn forward_deliveries(mut consumer: Consumer, tx: mpsc::Sender<Delivery>) {
    while let Some(result) = consumer.next().await {
        match result {
            Ok(delivery) => {
                let correlation_id = delivery
                    .properties
                    .correlation_id()
                    .as_ref()
                    .map(|id| id.as_str().to_string());
                let forwarded = Delivery {
                    correlation_id,
                    body: delivery.data,
                };
                if tx.send(forwarded).await.is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!("reply consumer error: {err}");
                break;
            }
        }
    }
    debug!("reply delivery stream closed");
}

#[async_trait]
impl BrokerTransport for AmqpTransport {
    async fn publish(
        &self,
        routing_key: &str,
        correlation_id: &str,
        reply_to: &str,
        body: &[u8],
    ) -> Result<(), RpcError> {
        let properties = BasicProperties::default()
            .with_content_type("application/json".to_string().into())
            .with_correlation_id(correlation_id.to_string().into())
            .with_reply_to(reply_to.to_string().into());

        self.channel
            .basic_publish(
                &self.exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                properties,
            )
            .await?;
        Ok(())
    }

    fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    fn is_open(&self) -> bool {
        self.connection.status().connected()
    }

    async fn close(&self) {
        if let Err(err) = self.channel.close(200, "shutting down").await {
            debug!("channel close: {err}");
        }
        if let Err(err) = self.connection.close(200, "shutting down").await {
            debug!("connection close: {err}");
        }
    }
}
