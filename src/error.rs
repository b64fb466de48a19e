//! Error types for the agent gateway.

use axum::http::Method;

/// Top-level error type for the gateway.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Manifest parsing and loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read manifest {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse manifest: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("manifest name is required")]
    MissingName,
}

/// Bearer extraction and JWT verification errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingHeader,

    #[error("invalid Authorization header format")]
    MalformedHeader,

    #[error("empty token")]
    EmptyToken,

    #[error("unexpected algorithm: {0}")]
    UnexpectedAlgorithm(String),

    #[error("missing kid in token header")]
    MissingKeyId,

    #[error("unknown kid: {0}")]
    UnknownKeyId(String),

    #[error("token verification failed: {0}")]
    Verification(#[from] jsonwebtoken::errors::Error),

    #[error("Failed to read public key {path}: {source}")]
    KeyRead {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse public key: {0}")]
    KeyParse(jsonwebtoken::errors::Error),
}

/// RPC-over-broker errors.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("request timeout")]
    Timeout,

    #[error("rpc client is closed")]
    Closed,

    #[error("correlation id already registered: {0}")]
    DuplicateCorrelation(String),

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Broker error: {0}")]
    Broker(#[from] lapin::Error),

    #[error("Publish failed: {0}")]
    Publish(String),
}

/// HTTP server and route synthesis errors.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),

    #[error("duplicate route: {method} {pattern}")]
    DuplicateRoute { method: Method, pattern: String },

    #[error("invalid CORS origin: {0}")]
    InvalidOrigin(String),

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),
}
