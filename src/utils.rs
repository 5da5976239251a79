use chrono::NaiveTime;

/// Decimal places kept for coordinates sent upstream or used as cache keys.
pub const COORD_DECIMALS: usize = 4;

const COORD_SCALE: f64 = 10_000.0;

/// Truncate a coordinate toward zero to four decimal places.
///
/// MET Norway's terms of service reject more precise coordinates. The cut is
/// made on the shortest decimal form of the value, so `20.4612` stays
/// `20.4612` and the result never has a larger magnitude than the input.
pub fn truncate_coord(value: f64) -> f64 {
    if !value.is_finite() {
        return value;
    }

    let text = value.to_string();
    match text.split_once('.') {
        Some((whole, fraction)) if fraction.len() > COORD_DECIMALS => {
            format!("{}.{}", whole, &fraction[..COORD_DECIMALS])
                .parse()
                .unwrap_or(value)
        }
        _ => value,
    }
}

/// Cache key for a coordinate pair, stored as whole ten-thousandths of a
/// degree so it can be hashed exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CoordKey {
    lat_e4: i64,
    lon_e4: i64,
}

impl CoordKey {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self {
            lat_e4: (truncate_coord(lat) * COORD_SCALE).round() as i64,
            lon_e4: (truncate_coord(lon) * COORD_SCALE).round() as i64,
        }
    }

    pub fn lat(&self) -> f64 {
        self.lat_e4 as f64 / COORD_SCALE
    }

    pub fn lon(&self) -> f64 {
        self.lon_e4 as f64 / COORD_SCALE
    }
}

/// Normalize free-text geocoding queries so equivalent spellings share a
/// cache entry: trimmed, single-spaced, lowercase.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Validate latitude and longitude coordinates
pub fn validate_coordinates(lat: f64, lon: f64) -> Result<(), String> {
    if !(-90.0..=90.0).contains(&lat) {
        return Err(format!("Invalid latitude: {}. Must be between -90 and 90", lat));
    }
    if !(-180.0..=180.0).contains(&lon) {
        return Err(format!("Invalid longitude: {}. Must be between -180 and 180", lon));
    }
    Ok(())
}

/// Parse a `HH:MM` wall-clock time.
pub fn parse_hhmm(value: &str) -> Result<NaiveTime, String> {
    let invalid = || "time must be in HH:MM format".to_string();

    let (hh, mm) = value.split_once(':').ok_or_else(invalid)?;
    let hour: u32 = hh.trim().parse().map_err(|_| invalid())?;
    let minute: u32 = mm.trim().parse().map_err(|_| invalid())?;

    NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(invalid)
}

/// Parse timezone string and validate
pub fn parse_timezone(tz_str: &str) -> Result<chrono_tz::Tz, String> {
    tz_str
        .parse::<chrono_tz::Tz>()
        .map_err(|_| format!("Invalid timezone: {}", tz_str))
}
