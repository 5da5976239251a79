use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Outcome of one `locationforecast/compact` call.
#[derive(Debug, Clone)]
pub struct MetResponse {
    pub status: StatusCode,
    /// `None` for `304 Not Modified`.
    pub data: Option<Value>,
    pub last_modified: Option<String>,
}

/// One instant from the MET timeseries.
#[derive(Debug, Clone, PartialEq)]
pub struct MetPoint {
    pub utc: DateTime<Utc>,
    pub temperature_c: f64,
}

/// Temperature chosen for one local calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ForecastPoint {
    /// `YYYY-MM-DD` in the requested timezone.
    #[schema(example = "2026-01-26")]
    pub date: String,
    /// RFC 3339 timestamp in the requested timezone.
    #[schema(example = "2026-01-26T14:00:00+01:00")]
    pub time: String,
    pub temperature_c: f64,
}

// Shape of a single `properties.timeseries[]` record. Only the fields the
// selector needs are declared; anything else in the record is ignored.
#[derive(Debug, Deserialize)]
pub(crate) struct RawTimeseriesEntry {
    pub time: String,
    pub data: RawEntryData,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawEntryData {
    pub instant: RawInstant,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawInstant {
    pub details: RawDetails,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawDetails {
    pub air_temperature: f64,
}
