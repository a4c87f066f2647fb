use crate::error::ServerResult;
use crate::state::ServerState;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

/// Query parameters for reading the learning log.
#[derive(Debug, Deserialize)]
pub struct LearningLogParams {
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Read audit entries from the learning log, oldest first.
pub async fn list_entries(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<LearningLogParams>,
) -> ServerResult<impl IntoResponse> {
    let limit = params.limit.clamp(1, 1000);

    let entries = match &params.user_id {
        Some(user_id) => state.pipeline.learning_log().for_user(user_id, limit)?,
        None => {
            let mut all = state.pipeline.learning_log().entries()?;
            all.truncate(limit);
            all
        }
    };

    Ok(Json(json!({
        "count": entries.len(),
        "entries": entries,
    })))
}
