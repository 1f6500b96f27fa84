use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::{error, warn};
use serde_json::json;

use crate::error::{FetchError, ServiceError};

impl ServiceError {
    /// HTTP status and stable error kind for the response body.
    pub fn status(&self) -> (StatusCode, &'static str) {
        match self {
            ServiceError::Fetch(FetchError::UpstreamUnavailable { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, "upstream_unavailable")
            },
            ServiceError::Fetch(FetchError::MalformedUpstreamResponse { .. }) => {
                (StatusCode::SERVICE_UNAVAILABLE, "malformed_upstream_response")
            },
            ServiceError::Fetch(FetchError::UnknownSymbolOrProtocol(_)) => {
                (StatusCode::BAD_REQUEST, "unknown_symbol")
            },
            ServiceError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            ServiceError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ServiceError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status();

        if status.is_server_error() {
            error!("Request failed ({}): {}", kind, self);
        } else {
            warn!("Request rejected ({}): {}", kind, self);
        }

        let body = Json(json!({
            "error": kind,
            "detail": self.to_string(),
        }));

        (status, body).into_response()
    }
}
