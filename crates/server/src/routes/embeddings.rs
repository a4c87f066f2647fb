use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use store::EmbeddingRecord;
use uuid::Uuid;

/// Request to insert a context embedding.
///
/// Either `vector` is given directly, or `content` is embedded through the
/// configured embedding provider.
#[derive(Debug, Deserialize)]
pub struct InsertEmbeddingRequest {
    #[serde(default)]
    pub vector: Option<Vec<f32>>,

    #[serde(default)]
    pub content: Option<String>,

    /// Arbitrary metadata. `gesture_affordances` (a string array) controls
    /// which intent types may mutate this embedding.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct InsertEmbeddingResponse {
    pub id: Uuid,
    pub dim: usize,
}

/// Insert a context embedding into the store.
pub async fn insert_embedding(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<InsertEmbeddingRequest>,
) -> ServerResult<impl IntoResponse> {
    let vector = match (request.vector, &request.content) {
        (Some(vector), _) => vector,
        (None, Some(content)) => state.embedder.embed(content).await?,
        (None, None) => {
            return Err(ServerError::BadRequest(
                "either 'vector' or 'content' is required".to_string(),
            ))
        }
    };

    let record = EmbeddingRecord::new(vector, request.content, request.metadata);
    let dim = record.vector.len();
    state.pipeline.store().insert(&record)?;

    Ok((
        StatusCode::CREATED,
        Json(InsertEmbeddingResponse { id: record.id, dim }),
    ))
}

/// Fetch a context embedding by id.
pub async fn get_embedding(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> ServerResult<impl IntoResponse> {
    let record = state
        .pipeline
        .store()
        .get(&id)?
        .ok_or(ServerError::NotFound)?;

    Ok(Json(json!({
        "id": record.id,
        "dim": record.vector.len(),
        "content": record.content,
        "metadata": record.metadata,
        "gesture_affordances": record.gesture_affordances(),
    })))
}

/// Query parameters for nearest-neighbor search.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    5
}

#[derive(Debug, Serialize)]
pub struct SearchHit {
    pub id: Uuid,
    pub distance: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Embed a text query and return the nearest stored embeddings.
pub async fn search_embeddings(
    State(state): State<Arc<ServerState>>,
    Query(params): Query<SearchParams>,
) -> ServerResult<impl IntoResponse> {
    let query_vec = state.embedder.embed(&params.query).await?;
    let hits = state
        .pipeline
        .store()
        .nearest(&query_vec, params.limit.clamp(1, 100))?;

    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        let content = state
            .pipeline
            .store()
            .get(&hit.id)?
            .and_then(|rec| rec.content);
        results.push(SearchHit {
            id: hit.id,
            distance: hit.distance,
            content,
        });
    }

    Ok(Json(json!({ "results": results })))
}

/// Delete a context embedding.
pub async fn delete_embedding(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<Uuid>,
) -> ServerResult<impl IntoResponse> {
    if state.pipeline.store().get(&id)?.is_none() {
        return Err(ServerError::NotFound);
    }
    state.pipeline.store().delete(&id)?;
    Ok(Json(json!({ "deleted": id })))
}
