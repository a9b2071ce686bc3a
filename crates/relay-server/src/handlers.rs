//! HTTP control and ingest surface.

use crate::relay::Relay;
use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use relay_core::{ConfigError, Event};
use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

type Reply = (StatusCode, Json<Value>);

/// Build the HTTP router.
pub fn router(relay: Arc<Relay>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/rules", get(rules_handler))
        .route("/reload", post(reload_handler))
        .route("/events", post(events_handler))
        .with_state(relay)
}

/// Serve HTTP until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound or the server fails.
pub async fn run_server(
    relay: Arc<Relay>,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Relay listening on {}", addr);

    axum::serve(listener, router(relay))
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}

/// Health check handler.
async fn health_handler(State(relay): State<Arc<Relay>>) -> Json<Value> {
    let snapshot = relay.snapshot();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "rules": snapshot.table.len(),
        "table_version": snapshot.version,
    }))
}

/// Active rules in evaluation order.
async fn rules_handler(State(relay): State<Arc<Relay>>) -> Json<Value> {
    let snapshot = relay.snapshot();
    let rules: Vec<Value> = snapshot
        .table
        .rules()
        .iter()
        .map(|rule| {
            json!({
                "name": rule.name,
                "from": rule.from,
                "to": rule.to,
            })
        })
        .collect();
    let warnings: Vec<String> = snapshot
        .table
        .warnings()
        .iter()
        .map(ToString::to_string)
        .collect();

    Json(json!({
        "version": snapshot.version,
        "rules": rules,
        "warnings": warnings,
    }))
}

/// Re-read the configuration file.
async fn reload_handler(State(relay): State<Arc<Relay>>) -> Reply {
    match relay.reload() {
        Ok(version) => {
            info!(version, "Rules reloaded");
            (StatusCode::OK, Json(json!({ "version": version })))
        }
        Err(e) => {
            warn!(error = %e, "Reload failed");
            match e.downcast_ref::<ConfigError>() {
                Some(invalid) => {
                    let issues: Vec<String> =
                        invalid.issues.iter().map(ToString::to_string).collect();
                    (
                        StatusCode::UNPROCESSABLE_ENTITY,
                        Json(json!({ "error": "invalid rules", "issues": issues })),
                    )
                }
                None => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": format!("{e:#}") })),
                ),
            }
        }
    }
}

/// Inject an event into its protocol's adapter.
async fn events_handler(State(relay): State<Arc<Relay>>, Json(event): Json<Event>) -> Reply {
    let Some(handle) = relay.handle(&event.protocol) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("unknown protocol: {}", event.protocol) })),
        );
    };

    let id = event.id;
    debug!(event = id, protocol = %event.protocol, kind = %event.kind, "Event received over HTTP");

    match handle.emit(event).await {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "id": id }))),
        Err(e) => {
            warn!(protocol = %handle.protocol(), error = %e, "Event rejected");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": e.to_string() })),
            )
        }
    }
}
