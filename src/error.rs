//! Error taxonomy shared by the upstream client, the store, the poller and the API.

use thiserror::Error;

/// Failure to obtain a value from an upstream provider.
///
/// None of these are retried by the client itself.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network failure, timeout, or non-2xx response
    #[error("{provider} unavailable: {reason}")]
    UpstreamUnavailable {
        provider: &'static str,
        reason: String,
    },

    #[error("malformed response from {provider}: {reason}")]
    MalformedUpstreamResponse {
        provider: &'static str,
        reason: String,
    },

    /// Identifier has no mapping; never sent upstream
    #[error("unknown symbol or protocol '{0}'")]
    UnknownSymbolOrProtocol(String),
}

impl FetchError {
    pub fn unavailable(provider: &'static str, reason: impl ToString) -> Self {
        Self::UpstreamUnavailable {
            provider,
            reason: reason.to_string(),
        }
    }

    pub fn malformed(provider: &'static str, reason: impl ToString) -> Self {
        Self::MalformedUpstreamResponse {
            provider,
            reason: reason.to_string(),
        }
    }

    /// Whether a caller-side retry policy may try again.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::UnknownSymbolOrProtocol(_))
    }
}

/// The relational store is unreachable or a read/write failed.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("connection pool: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("query failed: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("{0}")]
    Unavailable(String),
}

/// Outcome of a service-level operation, mapped one-to-one onto API responses.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// No value exists for the requested identifier
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidRequest(String),
}
