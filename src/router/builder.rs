//! Walks loaded manifests and synthesizes the `/api` routing table.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::Request;
use axum::http::Method;
use axum::routing::{on, MethodFilter};
use axum::Router;
use tracing::{info, warn};

use crate::auth::JwtVerifier;
use crate::error::ServerError;
use crate::manifest::Manifest;
use crate::router::handler::{handle_action, ActionRoute};
use crate::rpc::RpcClient;

/// Creates HTTP routes from agent manifests.
pub struct RouteBuilder {
    rpc: Arc<RpcClient>,
    verifier: Arc<JwtVerifier>,
}

impl RouteBuilder {
    pub fn new(rpc: Arc<RpcClient>, verifier: Arc<JwtVerifier>) -> Self {
        Self { rpc, verifier }
    }

    /// Synthesize one route per action, in manifest declaration order.
    ///
    /// Unknown HTTP methods are logged and skipped; a duplicate
    /// `(method, path)` pair is a startup error.
    pub fn build(&self, manifests: &[Manifest]) -> Result<Router, ServerError> {
        let mut router = Router::new();
        let mut registered: HashSet<(Method, String)> = HashSet::new();

        for manifest in manifests {
            for action in &manifest.actions {
                let pattern = format!("/api{}", action.http.path);

                let (method, filter) = match action.http.method.as_str() {
                    "GET" => (Method::GET, MethodFilter::GET),
                    "POST" => (Method::POST, MethodFilter::POST),
                    "PUT" => (Method::PUT, MethodFilter::PUT),
                    "DELETE" => (Method::DELETE, MethodFilter::DELETE),
                    other => {
                        warn!("unknown method {other} for {pattern}, skipping");
                        continue;
                    }
                };

                if !registered.insert((method.clone(), pattern.clone())) {
                    return Err(ServerError::DuplicateRoute { method, pattern });
                }

                info!(
                    "route: {method} {pattern} -> {}.{} (auth: {})",
                    manifest.name, action.name, action.auth
                );

                let route = Arc::new(ActionRoute {
                    agent: manifest.name.clone(),
                    action: action.clone(),
                    rpc: self.rpc.clone(),
                    verifier: self.verifier.clone(),
                });
                let handler = move |request: Request| handle_action(route.clone(), request);

                router = router.route(&pattern, on(filter, handler));
            }
        }

        Ok(router)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest;
    use crate::rpc::testing::MemoryBus;

    fn builder() -> RouteBuilder {
        let bus = MemoryBus::new();
        let rpc = Arc::new(RpcClient::new(bus.transport.clone(), bus.deliveries));
        let verifier = Arc::new(JwtVerifier::new("agenteco", "agent-gateway"));
        RouteBuilder::new(rpc, verifier)
    }

    #[tokio::test]
    async fn duplicate_method_and_path_is_a_startup_error() {
        let m = manifest::parse(
            r#"
name: a
actions:
  - name: one
    http: { method: POST, path: /login }
  - name: two
    http: { method: POST, path: /login }
"#,
        )
        .unwrap();

        let err = builder().build(&[m]).unwrap_err();
        match err {
            ServerError::DuplicateRoute { method, pattern } => {
                assert_eq!(method, Method::POST);
                assert_eq!(pattern, "/api/login");
            }
            other => panic!("expected DuplicateRoute, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn same_path_with_different_methods_is_fine() {
        let m = manifest::parse(
            r#"
name: a
actions:
  - name: read
    http: { method: GET, path: /thing }
  - name: write
    http: { method: POST, path: /thing }
"#,
        )
        .unwrap();

        assert!(builder().build(&[m]).is_ok());
    }

    #[tokio::test]
    async fn unknown_method_is_skipped_not_fatal() {
        let m = manifest::parse(
            r#"
name: a
actions:
  - name: odd
    http: { method: PATCH, path: /odd }
  - name: fine
    http: { method: GET, path: /fine }
"#,
        )
        .unwrap();

        // PATCH is skipped; the build still succeeds with the GET route.
        assert!(builder().build(&[m]).is_ok());
    }

    #[tokio::test]
    async fn duplicate_across_manifests_collides() {
        let a = manifest::parse(
            "name: a\nactions:\n  - name: x\n    http: { method: POST, path: /same }\n",
        )
        .unwrap();
        let b = manifest::parse(
            "name: b\nactions:\n  - name: y\n    http: { method: POST, path: /same }\n",
        )
        .unwrap();

        assert!(matches!(
            builder().build(&[a, b]),
            Err(ServerError::DuplicateRoute { .. })
        ));
    }
}
