use super::types::{ForecastPoint, MetPoint, RawTimeseriesEntry};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Parse a MET timestamp. MET sends RFC 3339 with a `Z` suffix; timestamps
/// without an offset are taken as UTC.
pub fn parse_met_time(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Extract `(time, air_temperature)` pairs from a compact forecast payload.
///
/// Records are validated one by one: a record with a missing field, a
/// non-numeric temperature or an unparsable timestamp is logged and skipped
/// without affecting the rest of the series.
pub fn met_points(data: &Value) -> Vec<MetPoint> {
    let Some(timeseries) = data
        .pointer("/properties/timeseries")
        .and_then(Value::as_array)
    else {
        tracing::warn!("MET response has no valid timeseries array");
        return Vec::new();
    };

    timeseries
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match RawTimeseriesEntry::deserialize(item) {
            Ok(entry) => match parse_met_time(&entry.time) {
                Some(utc) => Some(MetPoint {
                    utc,
                    temperature_c: entry.data.instant.details.air_temperature,
                }),
                None => {
                    tracing::warn!(
                        "Skipping malformed MET timeseries entry index={} error=unparsable time {:?}",
                        index,
                        entry.time
                    );
                    None
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Skipping malformed MET timeseries entry index={} error={}",
                    index,
                    e
                );
                None
            }
        })
        .collect()
}

/// For each local calendar day, pick the point whose wall-clock time is
/// closest to `target`. Earlier points win ties. Output is ordered by date.
pub fn select_daily_near_time(points: &[MetPoint], tz: Tz, target: NaiveTime) -> Vec<ForecastPoint> {
    let mut best: BTreeMap<NaiveDate, (i64, DateTime<Tz>, f64)> = BTreeMap::new();

    for point in points {
        let local = point.utc.with_timezone(&tz);
        let day = local.date_naive();
        let distance = (local.naive_local() - day.and_time(target))
            .num_seconds()
            .abs();

        let closer = best
            .get(&day)
            .map_or(true, |(previous, _, _)| distance < *previous);
        if closer {
            best.insert(day, (distance, local, point.temperature_c));
        }
    }

    best.into_iter()
        .map(|(day, (_, local, temperature_c))| ForecastPoint {
            date: day.format("%Y-%m-%d").to_string(),
            time: local.to_rfc3339(),
            temperature_c,
        })
        .collect()
}

/// Daily temperature near a fixed local time, e.g. "every day at 14:00 in
/// Europe/Belgrade".
#[derive(Debug, Clone, Copy)]
pub struct DailyTemperatureSelector {
    pub tz: Tz,
    pub target_time: NaiveTime,
}

impl DailyTemperatureSelector {
    pub fn new(tz: Tz, target_time: NaiveTime) -> Self {
        Self { tz, target_time }
    }

    pub fn select_from_met_response(&self, data: &Value) -> Vec<ForecastPoint> {
        let points = met_points(data);
        let days = select_daily_near_time(&points, self.tz, self.target_time);

        tracing::info!(
            "Selected daily points: days={} tz={} target_time={}",
            days.len(),
            self.tz,
            self.target_time.format("%H:%M")
        );

        days
    }
}
