//! RPC-over-broker correlation engine.
//!
//! One long-lived broker connection multiplexes many in-flight HTTP
//! requests against asynchronous replies:
//!
//! ```text
//! caller                registry                 consumer loop
//!   │  register(id) ──────► slot                       │
//!   │  publish(event, id, reply_to) ──► broker ──► delivery
//!   │  await slot ◄───────  deliver(id, reply) ◄───────┘
//!   │  remove(id) on every exit path
//! ```
//!
//! The transport seam ([`BrokerTransport`]) keeps the engine independent
//! of the wire client; [`amqp::AmqpTransport`] is the production
//! implementation, [`testing::MemoryBus`] the in-memory one.

mod amqp;
mod broker;
mod client;
mod envelope;
mod registry;
pub mod testing;

pub use amqp::AmqpTransport;
pub use broker::{BrokerTransport, Delivery};
pub use client::RpcClient;
pub use envelope::{derive_routing_key, AgentReply, EventEnvelope};
pub use registry::CorrelationRegistry;
