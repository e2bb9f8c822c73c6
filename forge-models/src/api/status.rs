//! Generation status polling
//!
//! `GET /status/:task_id?provider=&subscription_key=`

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};

use super::{success, ApiResponse, TaskQuery};
use crate::services::StatusReport;
use crate::{ApiResult, AppState};

/// GET /status/:task_id
///
/// Terminal states are written to the stored record; a ready task's results
/// are copied to local storage on the first poll that sees it ready.
pub async fn get_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Query(query): Query<TaskQuery>,
) -> ApiResult<Json<ApiResponse<StatusReport>>> {
    let provider = query.provider()?;
    let handle = query.handle(task_id);

    let report = state.orchestrator.poll_status(provider, &handle).await?;
    Ok(success(report))
}

/// Build status routes
pub fn status_routes() -> Router<AppState> {
    Router::new().route("/status/:task_id", get(get_status))
}
