//! Workspace handlers

use crate::AppState;
use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct MembersResponse {
    workspace_id: String,
    members: Vec<String>,
}

pub async fn members(
    State(state): State<AppState>,
    Path(workspace_id): Path<String>,
) -> Json<MembersResponse> {
    let members = state.hub.members(&workspace_id).await;
    Json(MembersResponse {
        workspace_id,
        members,
    })
}
