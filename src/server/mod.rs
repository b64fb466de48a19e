//! HTTP surface: middleware stack, health endpoints, and the serve loop.

pub mod middleware;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::from_fn;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use crate::auth::JwtVerifier;
use crate::config::{Config, CorsSettings};
use crate::error::ServerError;
use crate::manifest::{Loader, Manifest};
use crate::router::RouteBuilder;
use crate::rpc::{AmqpTransport, RpcClient};

/// Issuer expected on agent-issued tokens.
const JWT_ISSUER: &str = "agenteco";
/// Audience expected on agent-issued tokens.
const JWT_AUDIENCE: &str = "agent-gateway";

/// The HTTP gateway server.
pub struct Server {
    config: Config,
    rpc: Arc<RpcClient>,
    router: Router,
}

impl Server {
    /// Connect to the broker, load manifests and keys, and assemble the
    /// router.
    ///
    /// A manifest or key that fails to load is logged as a warning and
    /// skipped; that agent's routes are simply absent.
    pub async fn new(config: Config) -> Result<Self, ServerError> {
        let rabbit = &config.infrastructure.rabbitmq;
        let (transport, deliveries) =
            AmqpTransport::connect(&rabbit.url, &rabbit.exchange, &rabbit.reply_bind_patterns)
                .await?;
        info!("connected to rabbitmq at {}", rabbit.url);
        let rpc = Arc::new(RpcClient::new(Arc::new(transport), deliveries));

        let manifests = load_manifests(&config);

        let mut verifier = JwtVerifier::new(JWT_ISSUER, JWT_AUDIENCE);
        load_jwt_keys(&mut verifier, &manifests);

        let router = build_router(&config, &manifests, rpc.clone(), Arc::new(verifier))?;

        Ok(Self {
            config,
            rpc,
            router,
        })
    }

    /// Bind the listener and serve until a shutdown signal arrives, then
    /// release broker resources.
    pub async fn run(self) -> Result<(), ServerError> {
        let addr = format!("0.0.0.0:{}", self.config.gateway.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!("agent-gateway listening on {addr}");

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await?;

        self.rpc.close().await;
        Ok(())
    }
}

/// Assemble the full router: synthesized agent routes, health endpoints,
/// and the middleware stack.
///
/// Layer order, outermost first: request id, security headers, panic
/// recovery, CORS, access log.
pub fn build_router(
    config: &Config,
    manifests: &[Manifest],
    rpc: Arc<RpcClient>,
    verifier: Arc<JwtVerifier>,
) -> Result<Router, ServerError> {
    let agent_routes = RouteBuilder::new(rpc.clone(), verifier).build(manifests)?;

    let readiness = rpc.clone();
    let router = Router::new()
        .route("/healthz", get(health))
        .route(
            "/readyz",
            get(move || {
                let rpc = readiness.clone();
                async move { ready(rpc).await }
            }),
        )
        .merge(agent_routes)
        .layer(from_fn(middleware::access_log))
        .layer(cors_layer(&config.gateway.cors)?)
        .layer(from_fn(middleware::recover))
        .layer(from_fn(middleware::security_headers))
        .layer(from_fn(middleware::request_id));

    Ok(router)
}

async fn health() -> Response {
    Json(json!({"status": "ok"})).into_response()
}

async fn ready(rpc: Arc<RpcClient>) -> Response {
    if rpc.ready() {
        Json(json!({"status": "ready"})).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "not_ready", "reason": "rabbitmq disconnected"})),
        )
            .into_response()
    }
}

fn cors_layer(cors: &CorsSettings) -> Result<CorsLayer, ServerError> {
    let mut origins = Vec::with_capacity(cors.allowed_origins.len());
    for origin in &cors.allowed_origins {
        let value = origin
            .parse::<HeaderValue>()
            .map_err(|_| ServerError::InvalidOrigin(origin.clone()))?;
        origins.push(value);
    }

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::ACCEPT,
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-request-id"),
        ])
        .expose_headers([HeaderName::from_static("x-request-id")])
        .allow_credentials(true)
        .max_age(Duration::from_secs(300)))
}

/// Load each configured agent's manifest, warning and continuing on
/// failure.
fn load_manifests(config: &Config) -> Vec<Manifest> {
    let loader = Loader::new(".");
    let mut manifests = Vec::new();
    for agent in &config.agents {
        match loader.load(&agent.manifest_path) {
            Ok(manifest) => {
                info!(
                    "loaded manifest: {} v{} ({} actions)",
                    manifest.name,
                    manifest.version,
                    manifest.actions.len()
                );
                manifests.push(manifest);
            }
            Err(err) => warn!("failed to load {} manifest: {err}", agent.name),
        }
    }
    manifests
}

/// Load public keys declared by manifests, resolving relative paths
/// against each manifest's directory. Failures are warnings; the
/// affected `auth: bearer` routes then reject at request time.
fn load_jwt_keys(verifier: &mut JwtVerifier, manifests: &[Manifest]) {
    for manifest in manifests {
        let Some(jwt) = &manifest.jwt else { continue };
        if jwt.public_key.is_empty() {
            continue;
        }

        let mut key_path = PathBuf::from(&jwt.public_key);
        if key_path.is_relative() {
            if let Some(dir) = manifest
                .source_path
                .as_deref()
                .and_then(|path| path.parent())
            {
                key_path = dir.join(key_path);
            }
        }

        let key_id = jwt
            .key_id
            .clone()
            .unwrap_or_else(|| format!("{}-v1", manifest.name));

        match verifier.load_public_key(&key_id, &key_path) {
            Ok(()) => info!("loaded public key: {key_id} from {}", key_path.display()),
            Err(err) => warn!("failed to load public key for {}: {err}", manifest.name),
        }
    }

    if !verifier.has_keys() {
        warn!("no JWT public keys loaded - auth:bearer routes will fail");
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
