use serde::Serialize;
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::utils::truncate_coord;

/// A place returned by the geocoding provider.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct GeoPlace {
    #[schema(example = "Belgrade, City of Belgrade, Central Serbia, Serbia")]
    pub display_name: String,
    pub lat: f64,
    pub lon: f64,
    pub country: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    /// Upstream record as received.
    #[serde(skip)]
    pub raw: Value,
}

impl GeoPlace {
    /// Same place with coordinates cut to the precision the service exposes.
    pub fn truncated(mut self) -> Self {
        self.lat = truncate_coord(self.lat);
        self.lon = truncate_coord(self.lon);
        self
    }
}

/// Nominatim uses different address keys depending on settlement size.
const CITY_KEYS: [&str; 6] = ["city", "town", "village", "municipality", "hamlet", "county"];

pub(crate) fn pick_city(address: &Map<String, Value>) -> Option<String> {
    CITY_KEYS
        .iter()
        .filter_map(|key| address.get(*key).and_then(Value::as_str))
        .find(|value| !value.trim().is_empty())
        .map(str::to_string)
}

pub(crate) fn string_field(address: &Map<String, Value>, key: &str) -> Option<String> {
    address.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Nominatim encodes coordinates as strings; plain numbers are accepted too.
pub(crate) fn coord_field(value: Option<&Value>) -> Option<f64> {
    let parsed: f64 = match value? {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    parsed.is_finite().then_some(parsed)
}

/// Build a place from one upstream record. Returns `None` when the record has
/// no usable display name; coordinates fall back to `fallback` when given.
pub(crate) fn place_from_record(record: &Value, fallback: Option<(f64, f64)>) -> Option<GeoPlace> {
    let object = record.as_object()?;

    let display_name = object
        .get("display_name")
        .and_then(Value::as_str)
        .filter(|name| !name.trim().is_empty())?;

    let (lat, lon) = match (coord_field(object.get("lat")), coord_field(object.get("lon"))) {
        (Some(lat), Some(lon)) => (lat, lon),
        _ => fallback?,
    };

    let empty = Map::new();
    let address = object
        .get("address")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    Some(GeoPlace {
        display_name: display_name.to_string(),
        lat,
        lon,
        country: string_field(address, "country"),
        city: pick_city(address),
        state: string_field(address, "state"),
        raw: record.clone(),
    })
}
