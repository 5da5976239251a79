use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{OpenApi, ToSchema};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    config::Config,
    error::ServiceError,
    forecast::{types::ForecastPoint, DailyTemperatureSelector, MetGateway},
    geocode::{GeoPlace, GeocoderGateway},
    utils::{parse_hhmm, parse_timezone, truncate_coord, validate_coordinates},
};

const MAX_GEOCODE_RESULTS: usize = 5;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub met: Arc<MetGateway>,
    pub geocoder: Arc<GeocoderGateway>,
}

// Request/Response types
#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub tz: Option<String>,
    pub at: Option<String>,
    #[serde(default)]
    pub include_place: bool,
}

#[derive(Debug, Deserialize)]
pub struct GeocodeQuery {
    pub q: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ReverseQuery {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "ok")]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LocationInfo {
    pub lat: f64,
    pub lon: f64,
    #[schema(example = "Europe/Belgrade")]
    pub timezone: String,
    #[schema(example = "14:00")]
    pub target_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ForecastResponse {
    pub location: LocationInfo,
    pub days: Vec<ForecastPoint>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GeocodeResponse {
    pub query: String,
    pub results: Vec<GeoPlace>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReverseResponse {
    pub lat: f64,
    pub lon: f64,
    pub place: Option<GeoPlace>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub detail: String,
}

/// Handler-level failure: bad input (422) or a gateway error.
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Service(ServiceError),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError::Service(err)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Validation(detail) => {
                tracing::debug!("Rejected request: {}", detail);
                (StatusCode::UNPROCESSABLE_ENTITY, Json(ErrorBody { detail })).into_response()
            }
            ApiError::Service(err) => err.into_response(),
        }
    }
}

fn checked_coordinates(lat: f64, lon: f64) -> Result<(f64, f64), ApiError> {
    validate_coordinates(lat, lon).map_err(ApiError::Validation)?;
    Ok((lat, lon))
}

// Route handlers
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Service is up", body = HealthResponse))
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        upstream: None,
    })
}

/// Round-trip the default location through the weather gateway.
#[utoipa::path(
    get,
    path = "/health/met",
    tag = "Health",
    responses(
        (status = 200, description = "MET is reachable", body = HealthResponse),
        (status = 429, description = "MET quota exhausted", body = ErrorBody),
        (status = 500, description = "Missing configuration", body = ErrorBody),
        (status = 502, description = "MET upstream error", body = ErrorBody),
    )
)]
pub async fn health_met(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    state
        .met
        .get(state.config.default_lat, state.config.default_lon)
        .await?;

    Ok(Json(HealthResponse {
        status: "ok".to_string(),
        upstream: Some("met".to_string()),
    }))
}

#[utoipa::path(
    get,
    path = "/v1/forecast",
    tag = "Forecast",
    params(
        ("lat" = Option<f64>, Query, description = "Latitude, defaults to the configured location"),
        ("lon" = Option<f64>, Query, description = "Longitude, defaults to the configured location"),
        ("tz" = Option<String>, Query, description = "IANA timezone, e.g. Europe/Belgrade"),
        ("at" = Option<String>, Query, description = "Local target time as HH:MM"),
        ("include_place" = Option<bool>, Query, description = "Attach the reverse-geocoded place name"),
    ),
    responses(
        (status = 200, description = "Daily temperatures near the target time", body = ForecastResponse),
        (status = 422, description = "Invalid parameters", body = ErrorBody),
        (status = 429, description = "MET quota exhausted", body = ErrorBody),
        (status = 500, description = "Missing configuration", body = ErrorBody),
        (status = 502, description = "MET upstream error", body = ErrorBody),
    )
)]
pub async fn get_forecast(
    State(state): State<AppState>,
    query: Result<Query<ForecastQuery>, QueryRejection>,
) -> Result<Json<ForecastResponse>, ApiError> {
    let Query(params) = query?;
    let config = &state.config;

    let (lat, lon) = checked_coordinates(
        params.lat.unwrap_or(config.default_lat),
        params.lon.unwrap_or(config.default_lon),
    )?;
    let tz_name = params.tz.unwrap_or_else(|| config.default_timezone.clone());
    let tz = parse_timezone(&tz_name).map_err(ApiError::Validation)?;
    let at = params
        .at
        .unwrap_or_else(|| config.default_target_time.clone());
    let target_time = parse_hhmm(&at).map_err(ApiError::Validation)?;

    let payload = state.met.get(lat, lon).await?;
    let days = DailyTemperatureSelector::new(tz, target_time).select_from_met_response(&payload);

    let mut location = LocationInfo {
        lat: truncate_coord(lat),
        lon: truncate_coord(lon),
        timezone: tz.name().to_string(),
        target_time: target_time.format("%H:%M").to_string(),
        place_name: None,
        city: None,
        country: None,
    };

    if params.include_place {
        match state.geocoder.reverse(lat, lon).await {
            Ok(Some(place)) => {
                location.place_name = Some(place.display_name);
                location.city = place.city;
                location.country = place.country;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Reverse geocoding for forecast failed, omitting place: {}", e);
            }
        }
    }

    Ok(Json(ForecastResponse { location, days }))
}

#[utoipa::path(
    get,
    path = "/v1/geocode",
    tag = "Geocoding",
    params(
        ("q" = String, Query, description = "Free-text place name (2 to 200 characters)"),
        ("limit" = Option<usize>, Query, description = "Maximum results, 1 to 5"),
    ),
    responses(
        (status = 200, description = "Matching places", body = GeocodeResponse),
        (status = 422, description = "Invalid parameters", body = ErrorBody),
        (status = 429, description = "Geocoder quota exhausted", body = ErrorBody),
        (status = 500, description = "Missing configuration", body = ErrorBody),
        (status = 502, description = "Geocoder upstream error", body = ErrorBody),
    )
)]
pub async fn geocode(
    State(state): State<AppState>,
    query: Result<Query<GeocodeQuery>, QueryRejection>,
) -> Result<Json<GeocodeResponse>, ApiError> {
    let Query(params) = query?;

    let length = params.q.trim().chars().count();
    if !(2..=200).contains(&length) {
        return Err(ApiError::Validation(
            "q must be between 2 and 200 characters".to_string(),
        ));
    }

    let limit = params.limit.unwrap_or(MAX_GEOCODE_RESULTS);
    if !(1..=MAX_GEOCODE_RESULTS).contains(&limit) {
        return Err(ApiError::Validation(format!(
            "limit must be between 1 and {}",
            MAX_GEOCODE_RESULTS
        )));
    }

    let places = state.geocoder.forward(&params.q, limit).await?;

    Ok(Json(GeocodeResponse {
        query: params.q,
        results: places.iter().cloned().map(GeoPlace::truncated).collect(),
    }))
}

#[utoipa::path(
    get,
    path = "/v1/reverse",
    tag = "Geocoding",
    params(
        ("lat" = f64, Query, description = "Latitude"),
        ("lon" = f64, Query, description = "Longitude"),
    ),
    responses(
        (status = 200, description = "Nearest place, or null", body = ReverseResponse),
        (status = 422, description = "Invalid parameters", body = ErrorBody),
        (status = 429, description = "Geocoder quota exhausted", body = ErrorBody),
        (status = 500, description = "Missing configuration", body = ErrorBody),
        (status = 502, description = "Geocoder upstream error", body = ErrorBody),
    )
)]
pub async fn reverse(
    State(state): State<AppState>,
    query: Result<Query<ReverseQuery>, QueryRejection>,
) -> Result<Json<ReverseResponse>, ApiError> {
    let Query(params) = query?;
    let (lat, lon) = checked_coordinates(params.lat, params.lon)?;

    let place = state.geocoder.reverse(lat, lon).await?;

    Ok(Json(ReverseResponse {
        lat: truncate_coord(lat),
        lon: truncate_coord(lon),
        place: place.map(GeoPlace::truncated),
    }))
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "MET Weather Service",
        description = "Daily temperatures from MET Norway with place lookup"
    ),
    paths(health, health_met, get_forecast, geocode, reverse),
    components(schemas(
        HealthResponse,
        LocationInfo,
        ForecastResponse,
        ForecastPoint,
        GeocodeResponse,
        ReverseResponse,
        GeoPlace,
        ErrorBody
    )),
    tags(
        (name = "Health", description = "Liveness and upstream checks"),
        (name = "Forecast", description = "Daily temperature near a local time"),
        (name = "Geocoding", description = "Forward and reverse place lookup")
    )
)]
pub struct ApiDoc;

// Create the router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/met", get(health_met))
        .route("/v1/forecast", get(get_forecast))
        .route("/v1/geocode", get(geocode))
        .route("/v1/reverse", get(reverse))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
