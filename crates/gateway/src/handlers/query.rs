//! Question answering handler

use axum::{extract::State, Json};
use serde::Deserialize;
use validator::Validate;

use crate::AppState;
use ragforge_common::{
    context::QueryResponse,
    errors::{AppError, Result},
    metrics::RequestMetrics,
};

/// Question request
#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question: String,

    /// Number of documents to retrieve, defaults to `retrieval.top_k`
    #[validate(range(min = 1, max = 100))]
    #[serde(default)]
    pub top_k: Option<usize>,
}

/// Answer a question from the indexed corpus
pub async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>> {
    let request_metrics = RequestMetrics::start("POST", "/query");

    let result = answer(&state, request).await;

    let status = match &result {
        Ok(_) => 200,
        Err(e) => e.status_code().as_u16(),
    };
    request_metrics.finish(status);

    result.map(Json)
}

async fn answer(state: &AppState, request: QueryRequest) -> Result<QueryResponse> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    state
        .orchestrator
        .answer_question(&request.question, request.top_k)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::state_with_reply;

    #[tokio::test]
    async fn test_query_returns_answer_and_chunks() {
        let state = state_with_reply("<think>думаю</think>\nПариж").await;

        let Json(response) = query(
            State(state),
            Json(QueryRequest {
                question: "Какая столица Франции?".to_string(),
                top_k: None,
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.question, "Какая столица Франции?");
        assert_eq!(response.answer, "Париж");
        assert_eq!(response.chunks.len(), 2);
    }

    #[tokio::test]
    async fn test_query_honours_top_k() {
        let state = state_with_reply("ok").await;

        let Json(response) = query(
            State(state),
            Json(QueryRequest {
                question: "столица".to_string(),
                top_k: Some(1),
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.chunks.len(), 1);
    }

    #[tokio::test]
    async fn test_query_validation() {
        let state = state_with_reply("unused").await;

        let err = query(
            State(state.clone()),
            Json(QueryRequest {
                question: String::new(),
                top_k: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));

        let err = query(
            State(state),
            Json(QueryRequest {
                question: "q".to_string(),
                top_k: Some(0),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code().as_u16(), 400);
    }
}
