use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Third-party API a failure originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upstream {
    Met,
    Geocoder,
}

impl fmt::Display for Upstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Upstream::Met => f.write_str("MET"),
            Upstream::Geocoder => f.write_str("Geocoder"),
        }
    }
}

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    RateLimited,
    Upstream,
    Malformed,
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{var} is not set (required by {upstream} usage policy).")]
    Configuration { var: &'static str, upstream: Upstream },
    #[error("{0} rate limit exceeded")]
    RateLimitExceeded(Upstream),
    #[error("{upstream} request timed out: {source}")]
    Timeout {
        upstream: Upstream,
        #[source]
        source: reqwest::Error,
    },
    #[error("{upstream} request failed: {source}")]
    Request {
        upstream: Upstream,
        #[source]
        source: reqwest::Error,
    },
    #[error("{upstream} returned HTTP {status}")]
    Status {
        upstream: Upstream,
        status: reqwest::StatusCode,
    },
    #[error("{upstream} returned a malformed response: {reason}")]
    MalformedResponse { upstream: Upstream, reason: String },
}

impl ServiceError {
    pub fn transport(upstream: Upstream, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            ServiceError::Timeout { upstream, source }
        } else {
            ServiceError::Request { upstream, source }
        }
    }

    pub fn malformed(upstream: Upstream, reason: impl Into<String>) -> Self {
        ServiceError::MalformedResponse {
            upstream,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Configuration { .. } => ErrorKind::Configuration,
            ServiceError::RateLimitExceeded(_) => ErrorKind::RateLimited,
            ServiceError::Timeout { .. }
            | ServiceError::Request { .. }
            | ServiceError::Status { .. } => ErrorKind::Upstream,
            ServiceError::MalformedResponse { .. } => ErrorKind::Malformed,
        }
    }

    pub fn upstream(&self) -> Upstream {
        match self {
            ServiceError::Configuration { upstream, .. }
            | ServiceError::Timeout { upstream, .. }
            | ServiceError::Request { upstream, .. }
            | ServiceError::Status { upstream, .. }
            | ServiceError::MalformedResponse { upstream, .. } => *upstream,
            ServiceError::RateLimitExceeded(upstream) => *upstream,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Upstream | ErrorKind::Malformed => StatusCode::BAD_GATEWAY,
        }
    }

    /// Client-facing message; transport details stay in the logs.
    pub fn detail(&self) -> String {
        match self.kind() {
            ErrorKind::Configuration => self.to_string(),
            ErrorKind::RateLimited => "Too many requests".to_string(),
            ErrorKind::Upstream | ErrorKind::Malformed => {
                format!("{} upstream error", self.upstream())
            }
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self.kind() {
            ErrorKind::RateLimited => tracing::warn!("{}", self),
            ErrorKind::Configuration => tracing::error!("Service misconfiguration: {}", self),
            ErrorKind::Upstream | ErrorKind::Malformed => tracing::error!("Upstream failure: {}", self),
        }

        (self.status_code(), Json(json!({ "detail": self.detail() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let config = ServiceError::Configuration {
            var: "MET_USER_AGENT",
            upstream: Upstream::Met,
        };
        assert_eq!(config.kind(), ErrorKind::Configuration);
        assert_eq!(config.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(config.detail().starts_with("MET_USER_AGENT is not set"));

        let limited = ServiceError::RateLimitExceeded(Upstream::Geocoder);
        assert_eq!(limited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.detail(), "Too many requests");

        let status = ServiceError::Status {
            upstream: Upstream::Met,
            status: reqwest::StatusCode::SERVICE_UNAVAILABLE,
        };
        assert_eq!(status.kind(), ErrorKind::Upstream);
        assert_eq!(status.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(status.detail(), "MET upstream error");

        let malformed = ServiceError::malformed(Upstream::Geocoder, "not a list");
        assert_eq!(malformed.kind(), ErrorKind::Malformed);
        assert_eq!(malformed.status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(malformed.detail(), "Geocoder upstream error");
    }
}
