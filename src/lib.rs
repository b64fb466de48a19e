//! HTTP-to-message-bus gateway.
//!
//! Synthesizes a REST API from declarative agent manifests and bridges
//! each incoming HTTP request to a request/response exchange over a
//! topic-routed broker. Clients see ordinary HTTP; agents only see
//! events on the bus. The gateway owns the correlation between the two.
//!
//! ```text
//! HTTP request ──► middleware ──► action handler ──► RpcClient.call
//!                                                        │ publish
//!                                                     RabbitMQ
//!                                                        │ reply
//! HTTP response ◄── status mapping ◄── registry ◄── consumer loop
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod manifest;
pub mod router;
pub mod rpc;
pub mod server;

pub use config::Config;
pub use error::Error;
pub use server::Server;
