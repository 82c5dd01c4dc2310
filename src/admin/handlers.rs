use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub backends: usize,
    pub rotation_size: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BackendStatus {
    pub id: usize,
    pub endpoint: String,
    pub state: String,
    pub healthy: bool,
    pub in_rotation: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RotationEntry {
    pub id: usize,
    pub endpoint: String,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let rotation_size = state.selector.current().map_or(0, |r| r.len());
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        backends: state.registry.len(),
        rotation_size,
    })
}

pub async fn get_backends(State(state): State<AdminState>) -> Json<Vec<BackendStatus>> {
    let rotation = state.selector.current();
    let statuses = state
        .registry
        .all()
        .iter()
        .map(|b| BackendStatus {
            id: b.id,
            endpoint: b.endpoint.to_string(),
            state: b.health().to_string(),
            healthy: b.is_healthy(),
            in_rotation: rotation
                .as_ref()
                .is_some_and(|r| r.position(b.id).is_some()),
        })
        .collect();

    Json(statuses)
}

pub async fn get_rotation(State(state): State<AdminState>) -> Json<Vec<RotationEntry>> {
    let entries = state
        .selector
        .current()
        .map(|r| {
            r.members()
                .iter()
                .map(|b| RotationEntry {
                    id: b.id,
                    endpoint: b.endpoint.to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    Json(entries)
}
