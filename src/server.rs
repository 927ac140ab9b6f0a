//! HTTP surface
//!
//! `GET /leaderboard` (also mounted at `/api/top-stakers`), `GET /health` and
//! `GET /rpc/status`.

use crate::error::UnauthorizedRefreshError;
use crate::leaderboard::LeaderboardSnapshot;
use crate::service::{LeaderboardRequest, LeaderboardService};
use crate::status::{self, EndpointStatus};
use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Response header naming where the snapshot came from (cache, fresh, fallback).
pub const SOURCE_HEADER: &str = "x-leaderboard-source";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<LeaderboardService>,
    /// Endpoints reported by `/rpc/status`
    pub endpoints: Arc<Vec<String>>,
    pub status_client: reqwest::Client,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

type HttpError = (StatusCode, Json<ErrorResponse>);

/// Query parameters as a plain map: repeated keys keep the last value, and
/// an unparseable query string is treated as empty rather than a 400.
fn leaderboard_request(query: Option<Query<HashMap<String, String>>>) -> LeaderboardRequest {
    let Some(Query(mut params)) = query else {
        return LeaderboardRequest::default();
    };
    LeaderboardRequest {
        // Only the literal "true" forces a refresh
        force: params.get("force").map(String::as_str) == Some("true"),
        secret: params.remove("secret"),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/leaderboard", get(leaderboard))
        .route("/api/top-stakers", get(leaderboard))
        .route("/health", get(health))
        .route("/rpc/status", get(rpc_status))
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl+C.
pub async fn serve(state: AppState, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!(?addr, "Leaderboard server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received Ctrl+C, shutting down gracefully...");
            }
        })
        .await
        .context("HTTP server error")
}

async fn leaderboard(
    State(state): State<AppState>,
    query: Option<Query<HashMap<String, String>>>,
) -> Result<([(&'static str, &'static str); 1], Json<LeaderboardSnapshot>), HttpError> {
    let request = leaderboard_request(query);
    let served = state
        .service
        .leaderboard(&request)
        .await
        .map_err(to_http_error)?;
    Ok(([(SOURCE_HEADER, served.source.as_str())], Json(served.snapshot)))
}

async fn health() -> &'static str {
    "ok"
}

async fn rpc_status(State(state): State<AppState>) -> Json<Vec<EndpointStatus>> {
    Json(status::probe_all(&state.status_client, &state.endpoints).await)
}

fn to_http_error(_: UnauthorizedRefreshError) -> HttpError {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "Unauthorized".to_string(),
        }),
    )
}
