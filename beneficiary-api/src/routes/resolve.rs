//! Brand ownership resolution endpoint

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use beneficiary_core::ResearchRequest;
use serde::Serialize;
use tracing::info;

use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/resolve", post(resolve))
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// Resolve the ultimate owner of a brand
///
/// Always answers 200 with a result once the request is valid; failures
/// inside the pipeline come back as an "Unknown" result.
async fn resolve(
    State(state): State<AppState>,
    Json(request): Json<ResearchRequest>,
) -> impl IntoResponse {
    if request.normalized_brand().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "brand must not be empty".to_string(),
            }),
        )
            .into_response();
    }

    info!(
        "Resolving {}{}",
        request.brand,
        request
            .product_name
            .as_deref()
            .map(|p| format!(" / {}", p))
            .unwrap_or_default()
    );

    let result = state.pipeline.resolve(&request).await;
    Json(result).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use beneficiary_core::{ResolutionResult, ResultType};
    use beneficiary_services::{
        InMemoryKnowledgeStore, JsonStaticMappings, ResearchProviderChain, ResolutionPipeline,
        StaticDomainRegistry, StaticMapping, TracingMetricsSink,
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    fn state() -> AppState {
        let mappings = JsonStaticMappings::new().with_mapping(StaticMapping {
            brand: "Acme".to_string(),
            financial_beneficiary: "Globex Corp".to_string(),
            beneficiary_country: "United States".to_string(),
            ownership_structure_type: "Private Company".to_string(),
            ownership_flow: Vec::new(),
            sources: Vec::new(),
        });
        let metrics = Arc::new(TracingMetricsSink::new());
        let pipeline = ResolutionPipeline::new(
            Arc::new(InMemoryKnowledgeStore::new()),
            Arc::new(mappings),
            Arc::new(StaticDomainRegistry::builtin()),
            ResearchProviderChain::new(),
        )
        .with_metrics(metrics.clone());

        AppState {
            pipeline: Arc::new(pipeline),
            metrics,
        }
    }

    fn post_json(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/resolve")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_resolve_static_brand() {
        let app = routes().with_state(state());
        let response = app
            .oneshot(post_json(r#"{"brand": "Acme"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let result: ResolutionResult = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(result.result_type, ResultType::StaticMapping);
        assert_eq!(result.financial_beneficiary, "Globex Corp");
    }

    #[tokio::test]
    async fn test_unknown_brand_without_providers_is_error_result() {
        let app = routes().with_state(state());
        let response = app
            .oneshot(post_json(r#"{"brand": "Zorblex", "hints": {"country": "DE"}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let result: ResolutionResult = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(result.result_type, ResultType::Error);
        assert_eq!(result.confidence_score, 20);
    }

    #[tokio::test]
    async fn test_blank_brand_is_rejected() {
        let app = routes().with_state(state());
        let response = app.oneshot(post_json(r#"{"brand": "  "}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
