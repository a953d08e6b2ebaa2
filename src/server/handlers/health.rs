use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::core::errors::ApiError;
use crate::rag::Collection;
use crate::state::AppState;

pub async fn root(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "message": format!("{} RAG API is running!", state.settings.assistant.name)
    }))
}

pub async fn health(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let (web_records, faq_records) = tokio::try_join!(
        state.store.count(Collection::Web),
        state.store.count(Collection::Faq),
    )?;

    Ok(Json(json!({
        "status": "ok",
        "web_records": web_records,
        "faq_records": faq_records,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_support::test_state;
    use axum::body::to_bytes;
    use serde_json::Value;

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn root_names_the_assistant() {
        let t = test_state().await;
        let response = root(State(t.state.clone())).await.into_response();
        let body = body_json(response).await;
        assert_eq!(body["message"], "Campus Assist RAG API is running!");
    }

    #[tokio::test]
    async fn health_reports_collection_sizes() {
        let t = test_state().await;
        let response = health(State(t.state.clone())).await.into_response();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["web_records"], 0);
        assert_eq!(body["faq_records"], 0);
    }
}
