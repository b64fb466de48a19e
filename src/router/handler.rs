//! The per-action request pipeline: auth, body parse, payload
//! enrichment, RPC call, and reply-to-status mapping.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{ConnectInfo, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::auth::{extract_bearer_token, Claims, JwtVerifier};
use crate::error::RpcError;
use crate::manifest::{Action, AuthMode};
use crate::rpc::RpcClient;
use crate::server::middleware::{error_response, RequestId};

/// Timeout used when an action declares none (or zero) at the handler
/// level.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Cap on request body size when buffering for JSON decode.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Everything one synthesized route needs, captured at build time.
pub(crate) struct ActionRoute {
    pub agent: String,
    pub action: Action,
    pub rpc: Arc<RpcClient>,
    pub verifier: Arc<JwtVerifier>,
}

/// Run one HTTP request through the action pipeline.
pub(crate) async fn handle_action(route: Arc<ActionRoute>, request: Request) -> Response {
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    // Authentication, before the body is touched. No publish happens for
    // rejected requests.
    let mut claims: Option<Claims> = None;
    if route.action.auth == AuthMode::Bearer {
        let token = match extract_bearer_token(request.headers()) {
            Ok(token) => token.to_string(),
            Err(err) => {
                debug!(request_id = %request_id, "bearer extraction failed: {err}");
                return error_response(
                    StatusCode::UNAUTHORIZED,
                    "unauthorized",
                    "Missing or invalid token",
                    &request_id,
                );
            }
        };
        match route.verifier.verify(&token) {
            Ok(verified) => claims = Some(verified),
            Err(err) => {
                warn!(request_id = %request_id, "JWT verification failed: {err}");
                return error_response(
                    StatusCode::UNAUTHORIZED,
                    "unauthorized",
                    "Invalid token",
                    &request_id,
                );
            }
        }
    }

    // Body: empty means an empty payload; anything present must be a JSON
    // object.
    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                "Invalid JSON",
                &request_id,
            );
        }
    };
    let mut payload: Map<String, Value> = if body.is_empty() {
        Map::new()
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(map)) => map,
            _ => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "invalid_request",
                    "Invalid JSON",
                    &request_id,
                );
            }
        }
    };

    // Reserved `_`-prefixed keys are owned by the gateway and overwrite
    // anything the caller supplied.
    if let Some(claims) = &claims {
        payload.insert(
            "_auth".to_string(),
            json!({
                "user_id": claims.user_id,
                "username": claims.username,
                "roles": claims.roles,
            }),
        );
    }
    payload.insert("_client_ip".to_string(), Value::String(client_ip));
    payload.insert(
        "_request_id".to_string(),
        Value::String(request_id.clone()),
    );

    let timeout = if route.action.timeout.is_zero() {
        DEFAULT_CALL_TIMEOUT
    } else {
        route.action.timeout
    };

    match route
        .rpc
        .call(&route.action.request.event, payload, timeout)
        .await
    {
        Ok(reply) => {
            let failure = &route.action.response.failure;
            let status = if reply.event_type == failure.event {
                StatusCode::from_u16(failure.status).unwrap_or(StatusCode::UNAUTHORIZED)
            } else {
                // Non-failure replies map to 200; declared success
                // mappings are not consulted.
                StatusCode::OK
            };
            (status, Json(Value::Object(reply.data))).into_response()
        }
        Err(RpcError::Timeout) => error_response(
            StatusCode::GATEWAY_TIMEOUT,
            "gateway_timeout",
            "Agent did not respond",
            &request_id,
        ),
        Err(err) => {
            warn!(
                request_id = %request_id,
                agent = %route.agent,
                "RPC call failed: {err}"
            );
            error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                "Agent unavailable",
                &request_id,
            )
        }
    }
}
