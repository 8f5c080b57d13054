//! HTTP client for the weather forecast provider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

use courtside_cache::{CacheError, UpstreamSource, Weather, WeatherResult};
use courtside_core::CancellationToken;

use crate::error::ServiceError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    weather: Weather,
}

/// Fetches `GET {base_url}/forecast?city={city}`.
#[derive(Debug, Clone)]
pub struct HttpForecastClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpForecastClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn forecast_url(&self) -> String {
        format!("{}/forecast", self.base_url)
    }

    async fn request(&self, city: &str) -> Result<Option<WeatherResult>, CacheError> {
        let response = self
            .client
            .get(self.forecast_url())
            .query(&[("city", city)])
            .send()
            .await
            .map_err(|e| CacheError::Upstream(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(city = %city, "forecast provider has no data");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(CacheError::UpstreamStatus(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CacheError::Upstream(e.to_string()))?;
        let forecast: ForecastResponse = serde_json::from_str(&body)?;

        Ok(Some(WeatherResult {
            city: city.to_string(),
            weather: forecast.weather,
        }))
    }
}

#[async_trait]
impl UpstreamSource<WeatherResult> for HttpForecastClient {
    async fn fetch(&self, subject: &str, cancel: &CancellationToken) -> Result<Option<WeatherResult>, CacheError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CacheError::Upstream("forecast request cancelled".to_string())),
            result = self.request(subject) => result,
        }
    }
}
