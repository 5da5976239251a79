use super::types::{place_from_record, GeoPlace};
use crate::config::UpstreamSettings;
use crate::error::{ServiceError, Upstream};
use crate::utils::COORD_DECIMALS;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::Client;
use serde_json::Value;

/// Thin client for a Nominatim-compatible geocoding provider.
pub struct NominatimClient {
    client: Client,
    search_url: String,
    reverse_url: String,
    user_agent: Option<String>,
}

impl NominatimClient {
    pub fn new(settings: &UpstreamSettings) -> reqwest::Result<Self> {
        Ok(Self {
            client: settings.http_client()?,
            search_url: settings.endpoint("search"),
            reverse_url: settings.endpoint("reverse"),
            user_agent: settings.user_agent.clone(),
        })
    }

    pub fn user_agent(&self) -> Result<&str, ServiceError> {
        self.user_agent
            .as_deref()
            .ok_or(ServiceError::Configuration {
                var: "GEOCODER_USER_AGENT",
                upstream: Upstream::Geocoder,
            })
    }

    /// Place name -> candidate places. Records without a display name or
    /// with unusable coordinates are skipped.
    pub async fn forward(&self, query: &str, limit: usize) -> Result<Vec<GeoPlace>, ServiceError> {
        let limit = limit.to_string();
        let params = [
            ("q", query),
            ("format", "jsonv2"),
            ("limit", limit.as_str()),
            ("addressdetails", "1"),
        ];

        tracing::info!("Geocoder forward request: {} params={:?}", self.search_url, params);
        let payload = self.get_json(&self.search_url, &params).await?;

        let Value::Array(records) = payload else {
            return Err(ServiceError::malformed(
                Upstream::Geocoder,
                "expected a JSON array from search",
            ));
        };

        let places: Vec<GeoPlace> = records
            .iter()
            .enumerate()
            .filter_map(|(index, record)| {
                let place = place_from_record(record, None);
                if place.is_none() {
                    tracing::debug!("Skipping unusable geocoder record index={}", index);
                }
                place
            })
            .collect();

        tracing::info!(
            "Geocoder forward parsed places={} of records={}",
            places.len(),
            records.len()
        );
        Ok(places)
    }

    /// Coordinates -> nearest place, or `None` when the provider has nothing
    /// there (e.g. open sea).
    pub async fn reverse(&self, lat: f64, lon: f64) -> Result<Option<GeoPlace>, ServiceError> {
        let lat_param = format!("{:.*}", COORD_DECIMALS, lat);
        let lon_param = format!("{:.*}", COORD_DECIMALS, lon);
        let params = [
            ("lat", lat_param.as_str()),
            ("lon", lon_param.as_str()),
            ("format", "jsonv2"),
            ("addressdetails", "1"),
        ];

        tracing::info!("Geocoder reverse request: {} params={:?}", self.reverse_url, params);
        let payload = self.get_json(&self.reverse_url, &params).await?;

        if !payload.is_object() {
            return Err(ServiceError::malformed(
                Upstream::Geocoder,
                "expected a JSON object from reverse",
            ));
        }

        Ok(place_from_record(&payload, Some((lat, lon))))
    }

    async fn get_json(&self, url: &str, params: &[(&str, &str)]) -> Result<Value, ServiceError> {
        let user_agent = self.user_agent()?;

        let response = self
            .client
            .get(url)
            .query(params)
            .header(USER_AGENT, user_agent)
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ServiceError::transport(Upstream::Geocoder, e))?;

        let status = response.status();
        tracing::info!("Geocoder response: status={}", status);

        if !status.is_success() {
            return Err(ServiceError::Status {
                upstream: Upstream::Geocoder,
                status,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ServiceError::transport(Upstream::Geocoder, e))?;

        serde_json::from_slice(&body).map_err(|e| {
            ServiceError::malformed(Upstream::Geocoder, format!("invalid JSON body: {}", e))
        })
    }
}
