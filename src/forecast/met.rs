use super::types::MetResponse;
use crate::config::UpstreamSettings;
use crate::error::{ServiceError, Upstream};
use crate::utils::{truncate_coord, COORD_DECIMALS};
use reqwest::header::{ACCEPT, IF_MODIFIED_SINCE, LAST_MODIFIED, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde_json::Value;

/// Thin client for MET Norway's `locationforecast/2.0` API.
///
/// One call per invocation, no retries. Caching and quota live in
/// [`super::MetGateway`].
pub struct MetClient {
    client: Client,
    compact_url: String,
    user_agent: Option<String>,
}

impl MetClient {
    pub fn new(settings: &UpstreamSettings) -> reqwest::Result<Self> {
        Ok(Self {
            client: settings.http_client()?,
            compact_url: settings.endpoint("compact"),
            user_agent: settings.user_agent.clone(),
        })
    }

    /// MET rejects anonymous traffic, so a missing identifier is a
    /// configuration problem rather than a network one.
    pub fn user_agent(&self) -> Result<&str, ServiceError> {
        self.user_agent
            .as_deref()
            .ok_or(ServiceError::Configuration {
                var: "MET_USER_AGENT",
                upstream: Upstream::Met,
            })
    }

    pub async fn fetch_compact(
        &self,
        lat: f64,
        lon: f64,
        if_modified_since: Option<&str>,
    ) -> Result<MetResponse, ServiceError> {
        let user_agent = self.user_agent()?;

        let lat = format!("{:.*}", COORD_DECIMALS, truncate_coord(lat));
        let lon = format!("{:.*}", COORD_DECIMALS, truncate_coord(lon));

        tracing::info!(
            "MET request: {} lat={} lon={} if_modified_since={:?}",
            self.compact_url,
            lat,
            lon,
            if_modified_since
        );

        let mut request = self
            .client
            .get(&self.compact_url)
            .query(&[("lat", lat.as_str()), ("lon", lon.as_str())])
            .header(USER_AGENT, user_agent)
            .header(ACCEPT, "application/json");

        if let Some(token) = if_modified_since {
            request = request.header(IF_MODIFIED_SINCE, token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ServiceError::transport(Upstream::Met, e))?;

        let status = response.status();
        tracing::info!("MET response: status={}", status);

        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        if status == StatusCode::NOT_MODIFIED {
            return Ok(MetResponse {
                status,
                data: None,
                last_modified,
            });
        }

        if status == StatusCode::NON_AUTHORITATIVE_INFORMATION {
            tracing::warn!("MET response is deprecated (203). Consider updating API version.");
        }

        if !status.is_success() {
            return Err(ServiceError::Status {
                upstream: Upstream::Met,
                status,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ServiceError::transport(Upstream::Met, e))?;

        let data: Value = serde_json::from_slice(&body)
            .map_err(|e| ServiceError::malformed(Upstream::Met, format!("invalid JSON body: {}", e)))?;

        if !data.is_object() {
            return Err(ServiceError::malformed(
                Upstream::Met,
                "expected a JSON object at the top level",
            ));
        }

        Ok(MetResponse {
            status,
            data: Some(data),
            last_modified,
        })
    }
}
