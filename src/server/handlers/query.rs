use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::Value;

use crate::core::errors::ApiError;
use crate::rag::engine::MISSING_QUERY;
use crate::state::AppState;

/// `POST /query` with `{"query": "..."}`.
///
/// A missing, non-string or blank `query`, or a body that is not JSON at
/// all, is a 400 with `{"error": "Missing query"}`.
pub async fn query(
    State(state): State<Arc<AppState>>,
    body: Option<Json<Value>>,
) -> Result<impl IntoResponse, ApiError> {
    let question = body
        .as_ref()
        .and_then(|Json(payload)| payload.get("query"))
        .and_then(Value::as_str)
        .ok_or_else(|| ApiError::BadRequest(MISSING_QUERY.to_string()))?;

    let answer = state.engine.answer(question).await?;
    Ok(Json(answer))
}
