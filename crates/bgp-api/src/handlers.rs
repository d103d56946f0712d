//! Axum handlers over the peering catalog and anomaly query path.
//! Intentionally minimal: CRUD plumbing, auth, and the wider REST/GraphQL
//! surface are out of scope — this is just enough boundary to drive the
//! core from an HTTP client.

use crate::error::ApiError;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use bgp_anomaly::AnomalyDetector;
use bgp_catalog::{Paging, PeeringFilter, Storage};
use bgp_common::{Peering, PeeringDraft, PeeringPatch, PeeringStatus, Severity};
use serde::Deserialize;
use std::sync::Arc;

/// Shared state handed to every handler.
pub struct AppState {
    pub catalog: Arc<dyn Storage>,
    pub anomalies: Arc<AnomalyDetector>,
}

/// Builds the router. Callers mount this under whatever prefix/middleware
/// stack (auth, tracing) the deployment needs.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/peerings", post(create_peering).get(list_peerings))
        .route("/peerings/:id", get(get_peering).patch(update_peering).delete(delete_peering))
        .route("/anomalies", get(list_anomalies))
        .with_state(state)
}

#[derive(Deserialize)]
struct ListQuery {
    device: Option<String>,
    status: Option<PeeringStatus>,
    peer_asn: Option<u32>,
    offset: Option<usize>,
    limit: Option<usize>,
}

async fn create_peering(State(state): State<Arc<AppState>>, Json(draft): Json<PeeringDraft>) -> Result<Json<Peering>, ApiError> {
    let peering = state.catalog.create(draft, "api", None, &uuid::Uuid::new_v4().to_string()).await?;
    Ok(Json(peering))
}

async fn list_peerings(State(state): State<Arc<AppState>>, Query(q): Query<ListQuery>) -> Json<Vec<Peering>> {
    let filter = PeeringFilter { device: q.device, status: q.status, peer_asn: q.peer_asn };
    let paging = Paging { offset: q.offset.unwrap_or(0), limit: q.limit.unwrap_or(100) };
    Json(state.catalog.list(filter, paging).await)
}

async fn get_peering(State(state): State<Arc<AppState>>, Path(id): Path<u64>) -> Result<Json<Peering>, ApiError> {
    Ok(Json(state.catalog.get(id).await?))
}

async fn update_peering(State(state): State<Arc<AppState>>, Path(id): Path<u64>, Json(patch): Json<PeeringPatch>) -> Result<Json<Peering>, ApiError> {
    let peering = state.catalog.update(id, patch, "api", None, &uuid::Uuid::new_v4().to_string()).await?;
    Ok(Json(peering))
}

async fn delete_peering(State(state): State<Arc<AppState>>, Path(id): Path<u64>) -> Result<(), ApiError> {
    state.catalog.delete(id, "api", None, &uuid::Uuid::new_v4().to_string()).await?;
    Ok(())
}

#[derive(Deserialize)]
struct AnomalyQuery {
    metric_name: Option<String>,
    device: Option<String>,
    severity: Option<Severity>,
    hours: Option<i64>,
}

async fn list_anomalies(State(state): State<Arc<AppState>>, Query(q): Query<AnomalyQuery>) -> Json<Vec<bgp_common::Anomaly>> {
    let anomalies = state.anomalies.recent(q.metric_name.as_deref(), q.device.as_deref(), q.severity, q.hours.unwrap_or(24));
    Json(anomalies)
}
