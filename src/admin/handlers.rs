use axum::{
    extract::State,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::delegation::{DelegationInfo, DelegationSummary};
use crate::error::QueueError;
use crate::http::status_for;
use crate::kernel::QueueInfo;
use crate::lifecycle::{HandoffReport, SupervisorStatus};

/// Queue errors rendered as `{"error": "..."}` with a matching status.
#[derive(Debug)]
pub struct ApiError(pub QueueError);

impl From<QueueError> for ApiError {
    fn from(e: QueueError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    #[serde(flatten)]
    pub supervisor: SupervisorStatus,
}

#[derive(Debug, Deserialize)]
pub struct DelegateRequest {
    pub queue_name: String,
    pub uri: String,
}

#[derive(Debug, Deserialize)]
pub struct UndelegateRequest {
    pub uri: String,
}

#[derive(Serialize)]
pub struct UndelegateResponse {
    pub uri: String,
    pub removed: bool,
}

pub async fn get_status(State(state): State<AdminState>) -> Result<Json<SystemStatus>, ApiError> {
    Ok(Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        supervisor: state.supervisor.status().await?,
    }))
}

pub async fn get_queues(State(state): State<AdminState>) -> Json<Vec<QueueInfo>> {
    Json(state.supervisor.namespace().describe())
}

pub async fn get_delegations(State(state): State<AdminState>) -> Result<Json<Vec<DelegationInfo>>, ApiError> {
    Ok(Json(state.supervisor.delegations().await?))
}

pub async fn set_delegation(
    State(state): State<AdminState>,
    Json(body): Json<DelegateRequest>,
) -> Result<Json<DelegationSummary>, ApiError> {
    let summary = state.supervisor.set_delegation(&body.queue_name, &body.uri).await?;
    Ok(Json(summary))
}

pub async fn clear_delegation(
    State(state): State<AdminState>,
    Json(body): Json<UndelegateRequest>,
) -> Result<Json<UndelegateResponse>, ApiError> {
    let removed = state.supervisor.clear_delegation(&body.uri).await?;
    Ok(Json(UndelegateResponse { uri: body.uri, removed }))
}

pub async fn handoff(State(state): State<AdminState>) -> Result<Json<HandoffReport>, ApiError> {
    Ok(Json(state.supervisor.handoff().await?))
}
