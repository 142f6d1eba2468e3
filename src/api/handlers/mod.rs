use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};

use super::AppState;
use crate::deploy::ComputeDeployment;
use crate::models::*;
use crate::reconcile::{reconcile_node, NodeReconcileOutcome};
use crate::store::StoreError;

type ApiError = (StatusCode, String);

// ============================================================
// Error Handling
// ============================================================

/// Map a store error to a response.
///
/// Missing objects and version conflicts are reported to the client as-is.
/// Anything else is logged and returned as a generic message.
fn store_error(e: &StoreError) -> ApiError {
    match e {
        StoreError::NotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        StoreError::Conflict { .. } | StoreError::AlreadyExists(_) => {
            tracing::warn!("Conflict: {}", e);
            (StatusCode::CONFLICT, e.to_string())
        }
        _ => {
            tracing::error!("Internal error: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

fn internal_error(e: anyhow::Error) -> ApiError {
    if let Some(store) = e.downcast_ref::<StoreError>() {
        return store_error(store);
    }

    tracing::error!("Internal error: {:#}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

fn not_found(what: &str, key: &ObjectKey) -> ApiError {
    (StatusCode::NOT_FOUND, format!("{what} {key} not found"))
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Nodes
// ============================================================

pub async fn list_nodes(
    State(state): State<AppState>,
) -> Result<Json<Vec<DataPlaneNode>>, ApiError> {
    state.db.list_nodes().map(Json).map_err(internal_error)
}

pub async fn create_node(
    State(state): State<AppState>,
    Json(input): Json<CreateNodeInput>,
) -> Result<(StatusCode, Json<DataPlaneNode>), ApiError> {
    if input.namespace.is_empty() || input.name.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "namespace and name are required".to_string(),
        ));
    }

    state
        .db
        .create_node(input)
        .map(|n| (StatusCode::CREATED, Json(n)))
        .map_err(internal_error)
}

pub async fn get_node(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<DataPlaneNode>, ApiError> {
    let key = ObjectKey::new(namespace, name);
    state
        .db
        .get_node(&key)
        .map_err(internal_error)?
        .map(Json)
        .ok_or_else(|| not_found("node", &key))
}

pub async fn delete_node(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let key = ObjectKey::new(namespace, name);
    match state.db.delete_node(&key).map_err(internal_error)? {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(not_found("node", &key)),
    }
}

/// Run one deploy pass for the node.
///
/// Returns the pass outcome with 200 whether or not the compute reported an
/// error; a lost write race is a 409 so the caller can retry.
pub async fn deploy_node(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(deployment): Json<ComputeDeployment>,
) -> Result<(StatusCode, Json<NodeReconcileOutcome>), ApiError> {
    let key = ObjectKey::new(namespace, name);
    let cancel = state.shutdown.child_token();

    let outcome = reconcile_node(
        &state.db,
        state.computes.as_ref(),
        &key,
        &deployment,
        &cancel,
    )
    .await
    .map_err(internal_error)?;

    let status = if outcome.conflict {
        StatusCode::CONFLICT
    } else {
        StatusCode::OK
    };
    Ok((status, Json(outcome)))
}

pub async fn list_node_computes(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<Vec<ExternalCompute>>, ApiError> {
    let key = ObjectKey::new(namespace, name);
    let node = state
        .db
        .get_node(&key)
        .map_err(internal_error)?
        .ok_or_else(|| not_found("node", &key))?;
    let Some(uid) = node.metadata.uid else {
        return Ok(Json(Vec::new()));
    };

    state
        .db
        .list_owned_by(uid)
        .map(Json)
        .map_err(|e| store_error(&e))
}

// ============================================================
// External computes
// ============================================================

pub async fn list_computes(
    State(state): State<AppState>,
) -> Result<Json<Vec<ExternalCompute>>, ApiError> {
    state
        .db
        .list_external_computes()
        .map(Json)
        .map_err(|e| store_error(&e))
}

pub async fn get_compute(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<ExternalCompute>, ApiError> {
    let key = ObjectKey::new(namespace, name);
    state
        .db
        .get_external_compute(&key)
        .map_err(|e| store_error(&e))?
        .map(Json)
        .ok_or_else(|| not_found("NovaExternalCompute", &key))
}

/// Status report from the process deploying the compute.
pub async fn update_compute_status(
    State(state): State<AppState>,
    Path((namespace, name)): Path<(String, String)>,
    Json(input): Json<UpdateComputeStatusInput>,
) -> Result<Json<ExternalCompute>, ApiError> {
    let key = ObjectKey::new(namespace, name);
    state
        .db
        .update_external_compute_status(&key, &input.status, input.resource_version)
        .map(Json)
        .map_err(|e| store_error(&e))
}
