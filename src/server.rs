//! HTTP invoke endpoint fronting the queue.
//!
//! The queue (or its forwarder) POSTs each delivery to `/invoke` and reads
//! back the messages to redeliver.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::pipeline::Inspector;
use crate::pipeline::types::{BatchResponse, QueueEvent};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub inspector: Arc<Inspector>,
}

/// Build the router.
pub fn routes(inspector: Arc<Inspector>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/invoke", post(invoke))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(AppState { inspector })
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "denpa-inspector"
    }))
}

async fn invoke(
    State(state): State<AppState>,
    Json(event): Json<QueueEvent>,
) -> Json<BatchResponse> {
    info!(messages = event.records.len(), "Delivery received");
    let report = state.inspector.process_event(event).await;
    Json(report.to_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};
    use crate::notify::LogNotifier;
    use crate::pipeline::Classifier;
    use crate::pipeline::types::Domain;
    use crate::store::{InspectionRow, LibSqlStore};
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    struct ApproveAll;

    #[async_trait::async_trait]
    impl LlmProvider for ApproveAll {
        fn model_name(&self) -> &str {
            "approve-all"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                content: r#"{"judge": "approve"}"#.into(),
                input_tokens: 0,
                output_tokens: 0,
            })
        }
    }

    async fn app() -> (Router, Arc<LibSqlStore>) {
        let store = Arc::new(LibSqlStore::new_memory().await.unwrap());
        let inspector = Inspector::new(
            store.clone(),
            Classifier::new(Arc::new(ApproveAll)),
            Arc::new(LogNotifier),
            "https://review.test/inspection",
        );
        (routes(Arc::new(inspector)), store)
    }

    #[tokio::test]
    async fn health_ok() {
        let (app, _) = app().await;
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn invoke_reports_failed_messages() {
        let (app, store) = app().await;
        let conn = store.connect().unwrap();
        conn.execute(
            "INSERT INTO api_shopdata (id, title, detail) VALUES (7, 'Crepe Stand', 'Fresh')",
            (),
        )
        .await
        .unwrap();
        conn.execute("INSERT INTO api_shopinspectiondata (shop_id) VALUES (7)", ())
            .await
            .unwrap();

        let event = serde_json::json!({
            "Records": [
                {"messageId": "ok-1", "body": "shop,7,True"},
                {"messageId": "bad-1", "body": "shop,7"},
                {"messageId": "bad-2", "body": "users,1,True"}
            ]
        });
        let response = app
            .oneshot(
                Request::post("/invoke")
                    .header("content-type", "application/json")
                    .body(Body::from(event.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: BatchResponse = serde_json::from_slice(&bytes).unwrap();
        let failed: Vec<&str> = body
            .batch_item_failures
            .iter()
            .map(|f| f.item_identifier.as_str())
            .collect();
        assert_eq!(failed, vec!["bad-1", "bad-2"]);

        assert_eq!(
            store.inspection_row(Domain::Shop, "7").await.unwrap(),
            Some(InspectionRow {
                ai: true,
                inspected: true,
                deleted: false
            })
        );
    }

    #[tokio::test]
    async fn invoke_rejects_non_json() {
        let (app, _) = app().await;
        let response = app
            .oneshot(
                Request::post("/invoke")
                    .header("content-type", "application/json")
                    .body(Body::from("shop,7,True"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }
}
