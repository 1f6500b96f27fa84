use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{header, HeaderMap, HeaderValue},
    Json,
};
use log::{debug, info};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::db::{HistoryQuery, PriceRecord, TvlSnapshot};
use crate::error::{FetchError, ServiceError};
use crate::service::{ModeStatus, PriceService};

pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

type ApiResult<T> = Result<T, ServiceError>;

pub async fn health(State(service): State<Arc<PriceService>>) -> Json<Value> {
    debug!("Health check");
    Json(json!({
        "status": "ok",
        "live_mode": service.is_live(),
    }))
}

/// `GET /prices/:symbol?from&to&limit&offset&order`
pub async fn price_history(
    State(service): State<Arc<PriceService>>,
    Path(symbol): Path<String>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<(HeaderMap, Json<Vec<PriceRecord>>)> {
    let Query(query) = query.map_err(|e| ServiceError::InvalidRequest(e.body_text()))?;
    info!("History request for {} ({:?})", symbol, query);

    let page = service.history(&symbol, &query).await?;

    let mut headers = HeaderMap::new();
    headers.insert(TOTAL_COUNT_HEADER, HeaderValue::from(page.total));

    Ok((headers, Json(page.records)))
}

pub async fn latest_price(
    State(service): State<Arc<PriceService>>,
    Path(symbol): Path<String>,
) -> ApiResult<Json<PriceRecord>> {
    Ok(Json(service.latest(&symbol).await?))
}

pub async fn fetch_price(
    State(service): State<Arc<PriceService>>,
    Path(symbol): Path<String>,
) -> ApiResult<Json<PriceRecord>> {
    info!("On-demand fetch for {}", symbol);
    Ok(Json(service.fetch(&symbol).await?))
}

pub async fn protocol_tvl(
    State(service): State<Arc<PriceService>>,
    Path(protocol): Path<String>,
) -> ApiResult<Json<TvlSnapshot>> {
    let snapshot = service.tvl(&protocol).await.map_err(|e| match e {
        ServiceError::Fetch(FetchError::UnknownSymbolOrProtocol(p)) => {
            ServiceError::NotFound(format!("unknown protocol '{}'", p))
        },
        other => other,
    })?;
    Ok(Json(snapshot))
}

pub async fn get_mode(State(service): State<Arc<PriceService>>) -> Json<ModeStatus> {
    Json(service.mode_status())
}

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    #[serde(default = "default_live")]
    pub live: bool,
}

fn default_live() -> bool {
    true
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .map(|essence| essence.trim().to_ascii_lowercase())
        .is_some_and(|essence| essence == "application/json" || essence.ends_with("+json"))
}

/// Decode a mode request. An empty body means "go live"; anything else must
/// be a JSON `ModeRequest`.
fn parse_mode_request(headers: &HeaderMap, body: &Bytes) -> ApiResult<bool> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(default_live());
    }

    if !is_json(headers) {
        return Err(ServiceError::InvalidRequest(
            "mode request body must be application/json".to_string(),
        ));
    }

    let Json(request) = Json::<ModeRequest>::from_bytes(body)
        .map_err(|e| ServiceError::InvalidRequest(e.body_text()))?;
    Ok(request.live)
}

/// `POST /mode` with `{"live": bool}`.
pub async fn set_mode(
    State(service): State<Arc<PriceService>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<ModeStatus>> {
    let live = parse_mode_request(&headers, &body)?;
    info!("Mode change requested: live={}", live);
    Ok(Json(service.set_mode(live).await))
}
