//! Status route handlers. All endpoints return JSON.

use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

use crate::engine::StatusSnapshot;

/// Handlers only ever read the latest published snapshot.
pub struct DashboardState {
    status: watch::Receiver<StatusSnapshot>,
}

impl DashboardState {
    pub fn new(status: watch::Receiver<StatusSnapshot>) -> Self {
        Self { status }
    }

    pub fn current(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }
}

pub type AppState = Arc<DashboardState>;

#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    #[serde(flatten)]
    pub snapshot: StatusSnapshot,
    pub uptime_secs: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// GET /api/status
pub async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let snapshot = state.current();
    let uptime_secs = snapshot
        .started_at
        .map_or(0, |t| (Utc::now() - t).num_seconds().max(0));
    Json(StatusResponse {
        snapshot,
        uptime_secs,
    })
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
