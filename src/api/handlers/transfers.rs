use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};

use crate::api::{
    ApiState, MAX_JSON_BODY,
    error::{ApiError, parse_json_with_limit},
};
use crate::session::{ControlAction, TransferId};

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct CreateTransferRequestBody {
    pub(crate) source_uri: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateTransferResponse {
    pub(crate) id: TransferId,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ControlResponse {
    pub(crate) id: String,
    pub(crate) action: &'static str,
    pub(crate) ok: bool,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct DeleteResponse {
    pub(crate) deleted: bool,
}

pub(crate) async fn transfers_create(
    State(state): State<ApiState>,
    body: Bytes,
) -> Result<(StatusCode, Json<CreateTransferResponse>), ApiError> {
    let req: CreateTransferRequestBody = parse_json_with_limit(body, MAX_JSON_BODY)?;
    let id = state.sessions.start_transfer(req.source_uri).await?;
    Ok((StatusCode::CREATED, Json(CreateTransferResponse { id })))
}

pub(crate) async fn transfers_control(
    State(state): State<ApiState>,
    Path((id, action)): Path<(String, String)>,
) -> Result<Json<ControlResponse>, ApiError> {
    let action = ControlAction::parse(&action).ok_or_else(|| ApiError {
        status: StatusCode::NOT_FOUND,
        message: format!("unknown action '{action}'"),
    })?;
    state.sessions.control(&id, action).await?;
    Ok(Json(ControlResponse {
        id: id.to_ascii_lowercase(),
        action: action.as_str(),
        ok: true,
    }))
}

pub(crate) async fn completed_delete(
    State(state): State<ApiState>,
    Path(name): Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.sessions.delete_completed_artifact(name).await?;
    Ok(Json(DeleteResponse { deleted: true }))
}
