use axum::{extract::State, Json};
use serde::Serialize;

use super::AdminState;
use crate::net::RelaySummary;
use crate::session::SessionInfo;

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub sessions: usize,
    pub ws_relays: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    #[serde(flatten)]
    pub info: SessionInfo,
    pub idle_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct SessionsReport {
    pub sessions: Vec<SessionSummary>,
    pub relays: Vec<RelaySummary>,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        sessions: state.registry.len(),
        ws_relays: state.connections.active_count(),
    })
}

pub async fn get_sessions(State(state): State<AdminState>) -> Json<SessionsReport> {
    let mut sessions: Vec<SessionSummary> = state
        .registry
        .snapshot()
        .into_iter()
        .map(|(info, idle)| SessionSummary {
            info,
            idle_secs: idle.as_secs(),
        })
        .collect();
    sessions.sort_by(|a, b| a.info.sid.cmp(&b.info.sid));

    Json(SessionsReport {
        sessions,
        relays: state.connections.snapshot(),
    })
}
