use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};

use crate::errors::ServiceError;

fn has_json_body(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map_or(false, |ct| ct.starts_with("application/json"))
}

/// Rewrites body-limit and timeout rejections produced by tower layers into `{"error": ...}`.
pub async fn json_error_body(response: Response) -> Response {
    if has_json_body(&response) {
        return response;
    }
    match response.status() {
        StatusCode::PAYLOAD_TOO_LARGE => ServiceError::PayloadTooLarge.into_response(),
        StatusCode::REQUEST_TIMEOUT => ServiceError::RequestTimeout.into_response(),
        _ => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::{to_bytes, Body},
        http::Request,
        middleware,
        routing::get,
        Json, Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/timeout", get(|| async { StatusCode::REQUEST_TIMEOUT }))
            .route(
                "/too-large",
                get(|| async { (StatusCode::PAYLOAD_TOO_LARGE, "length limit exceeded") }),
            )
            .route(
                "/handled",
                get(|| async { (StatusCode::REQUEST_TIMEOUT, Json(json!({ "error": "custom" }))) }),
            )
            .route("/plain", get(|| async { (StatusCode::NOT_FOUND, "nope") }))
            .layer(middleware::map_response(json_error_body))
    }

    async fn call(path: &str) -> (StatusCode, Vec<u8>) {
        let response = app()
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn layer_rejections_get_an_error_field() {
        let (status, body) = call("/timeout").await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({ "error": "Request timed out" }));

        let (status, body) = call("/too-large").await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, json!({ "error": "Request body too large" }));
    }

    #[tokio::test]
    async fn json_bodies_and_other_statuses_pass_through() {
        let (status, body) = call("/handled").await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["error"], "custom");

        let (status, body) = call("/plain").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, b"nope");
    }
}
