//! REST API and WebSocket push channel.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use crate::service::PriceService;

mod error;
mod routes;
mod ws;

pub use routes::TOTAL_COUNT_HEADER;

pub fn router(service: Arc<PriceService>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/prices/:symbol", get(routes::price_history))
        .route("/prices/:symbol/latest", get(routes::latest_price))
        .route("/prices/:symbol/fetch", post(routes::fetch_price))
        .route("/tvl/:protocol", get(routes::protocol_tvl))
        .route("/mode", get(routes::get_mode).post(routes::set_mode))
        .route("/ws/prices", get(ws::prices_ws))
        .layer(CorsLayer::permissive())
        .with_state(service)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::db::{PriceRecord, PriceStore, TvlSnapshot};
    use crate::service::tests::{harness, ts, Harness};
    use crate::testing::ScriptedSource;

    async fn call(h: &Harness, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let (status, _, json) = call_with_headers(h, method, uri, body).await;
        (status, json)
    }

    async fn call_with_headers(
        h: &Harness,
        method: Method,
        uri: &str,
        body: Option<&str>,
    ) -> (StatusCode, axum::http::HeaderMap, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            },
            None => Body::empty(),
        };

        let response = router(h.service.clone())
            .oneshot(request.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, headers, json)
    }

    #[tokio::test]
    async fn test_health() {
        let h = harness(ScriptedSource::new());
        let (status, body) = call(&h, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["live_mode"], false);
    }

    #[tokio::test]
    async fn test_fetch_then_latest() {
        let h = harness(ScriptedSource::new().with_price("bitcoin", 42000.53));

        let (status, fetched) = call(&h, Method::POST, "/prices/btc/fetch", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(fetched["symbol"], "bitcoin");
        assert_eq!(fetched["price"], 42000.53);

        let (status, latest) = call(&h, Method::GET, "/prices/bitcoin/latest", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(latest, fetched);
    }

    #[tokio::test]
    async fn test_latest_absent_is_404() {
        let h = harness(ScriptedSource::new());
        let (status, body) = call(&h, Method::GET, "/prices/ethereum/latest", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_400() {
        let h = harness(ScriptedSource::new());
        let (status, body) = call(&h, Method::POST, "/prices/dogecoin/fetch", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "unknown_symbol");
    }

    #[tokio::test]
    async fn test_upstream_failure_is_503() {
        let h = harness(ScriptedSource::new().with_outage("ethereum"));
        let (status, body) = call(&h, Method::POST, "/prices/ethereum/fetch", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "upstream_unavailable");
        assert!(body["detail"].as_str().unwrap().contains("HTTP 500"));
    }

    #[tokio::test]
    async fn test_storage_failure_is_500() {
        let h = harness(ScriptedSource::new());
        h.store.set_failing(true);
        let (status, body) = call(&h, Method::GET, "/prices/bitcoin", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "storage_error");
    }

    #[tokio::test]
    async fn test_history_pagination_and_count_header() {
        let h = harness(ScriptedSource::new());
        for (price, t) in [
            (1.0, "2025-10-02T09:00:00Z"),
            (2.0, "2025-10-02T09:10:00Z"),
            (3.0, "2025-10-02T09:20:00Z"),
        ] {
            h.store
                .append(&PriceRecord::new("bitcoin", price, ts(t)))
                .await
                .unwrap();
        }

        let (status, headers, body) = call_with_headers(
            &h,
            Method::GET,
            "/prices/bitcoin?limit=2&order=desc",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[TOTAL_COUNT_HEADER], "3");
        let prices: Vec<f64> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["price"].as_f64().unwrap())
            .collect();
        assert_eq!(prices, vec![3.0, 2.0]);

        let (_, headers, body) = call_with_headers(
            &h,
            Method::GET,
            "/prices/bitcoin?from=2025-10-02T09:05:00Z&to=2025-10-02T09:15:00Z",
            None,
        )
        .await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["price"], 2.0);
        assert_eq!(headers[TOTAL_COUNT_HEADER], "1");

        // Total counts the whole window, not just the page
        let (_, headers, body) = call_with_headers(
            &h,
            Method::GET,
            "/prices/bitcoin?from=2025-10-02T09:05:00Z&limit=1",
            None,
        )
        .await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(headers[TOTAL_COUNT_HEADER], "2");
    }

    #[tokio::test]
    async fn test_history_bad_query_is_400() {
        let h = harness(ScriptedSource::new());
        let (status, body) = call(&h, Method::GET, "/prices/bitcoin?limit=many", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_tvl_passthrough() {
        let snapshot = TvlSnapshot::new("aave", 5634829183.42, ts("2025-10-02T09:25:00Z"));
        let h = harness(ScriptedSource::new().with_tvl(snapshot));

        let (status, body) = call(&h, Method::GET, "/tvl/aave", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["protocol"], "aave");
        assert_eq!(body["tvl_usd"], 5634829183.42);
        assert_eq!(body["last_updated"], "2025-10-02T09:25:00Z");
    }

    #[tokio::test]
    async fn test_unknown_protocol_is_404() {
        let h = harness(ScriptedSource::new());
        let (status, _) = call(&h, Method::GET, "/tvl/nonexistent", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_mode_toggle() {
        let h = harness(ScriptedSource::new());

        let (_, body) = call(&h, Method::GET, "/mode", None).await;
        assert_eq!(body["live_mode"], false);
        assert_eq!(body["poll_interval_ms"], 3_600_000);

        let (status, body) = call(&h, Method::POST, "/mode", Some(r#"{"live": true}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["live_mode"], true);
        assert!(h.service.is_live());

        let (_, body) = call(&h, Method::POST, "/mode", Some(r#"{"live": false}"#)).await;
        assert_eq!(body["live_mode"], false);

        // No body means "go live"
        let (_, body) = call(&h, Method::POST, "/mode", None).await;
        assert_eq!(body["live_mode"], true);
        h.service.set_mode(false).await;
    }

    async fn post_mode(h: &Harness, content_type: &str, body: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/mode")
            .header("content-type", content_type)
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = router(h.service.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_malformed_mode_request_is_rejected() {
        let h = harness(ScriptedSource::new());

        // Wrong content type must not fall back to "go live"
        let (status, body) =
            post_mode(&h, "application/x-www-form-urlencoded", r#"{"live": false}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");
        assert!(!h.service.is_live());

        // A string is not a bool
        let (status, body) = post_mode(&h, "application/json", r#"{"live": "false"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");
        assert!(!h.service.is_live());

        let (status, _) = post_mode(&h, "application/json", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!h.service.is_live());
    }

    #[tokio::test]
    async fn test_mode_request_accepts_json_with_charset() {
        let h = harness(ScriptedSource::new());
        let (status, body) =
            post_mode(&h, "application/json; charset=utf-8", r#"{"live": true}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["live_mode"], true);

        // Omitted field keeps the default
        let (_, body) = post_mode(&h, "application/json", "{}").await;
        assert_eq!(body["live_mode"], true);
        h.service.set_mode(false).await;
    }
}
