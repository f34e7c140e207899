use std::{sync::Arc, time::Duration, time::Instant};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::{
    decode::decode_bytes,
    error::FetchError,
    metrics::MetricsSink,
    model::{Forecast, ForecastRequest},
};

use super::ForecastProvider;

pub const DEFAULT_URL_TEMPLATE: &str = "http://openaccess.pf.api.met.ie/metno-wdb2ts/locationforecast?lat=${lat};long=${long};from=${now};to=${later}";

/// Upper bound for a whole request, body included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Largest body accepted for decoding. A normal window is a few kilobytes.
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

/// Point forecasts from the Met Éireann open data service.
#[derive(Debug, Clone)]
pub struct MetEireannProvider {
    http: Client,
    url_template: String,
    body_limit: usize,
    metrics: Arc<dyn MetricsSink>,
}

impl MetEireannProvider {
    pub fn new(metrics: Arc<dyn MetricsSink>) -> Result<Self, FetchError> {
        Self::with_url_template(DEFAULT_URL_TEMPLATE, metrics)
    }

    /// Use a different endpoint with the same `${lat}`/`${long}`/`${now}`/`${later}` placeholders.
    pub fn with_url_template(
        url_template: impl Into<String>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, FetchError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        Ok(Self { http, url_template: url_template.into(), body_limit: MAX_BODY_BYTES, metrics })
    }

    /// Reject responses whose body is longer than `limit` bytes.
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// One GET for `request`. The response is dropped, and its body released, on every path.
    async fn fetch_window(&self, request: &ForecastRequest) -> Result<Forecast, FetchError> {
        let url = request.url(&self.url_template);
        debug!(%url, "requesting forecast");

        let start = Instant::now();
        let mut response = self.http.get(&url).send().await?;
        let status = response.status();
        self.metrics.observe_response(status.as_u16(), start.elapsed().as_secs_f64());

        if status != StatusCode::OK {
            return Err(FetchError::HttpStatus { code: status.as_u16() });
        }

        let limit = self.body_limit;
        let too_large = FetchError::BodyTooLarge { limit };
        if response.content_length().is_some_and(|len| len > limit as u64) {
            return Err(too_large);
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > limit {
                return Err(too_large);
            }
            body.extend_from_slice(&chunk);
        }

        Ok(decode_bytes(&body)?)
    }
}

#[async_trait]
impl ForecastProvider for MetEireannProvider {
    #[instrument(skip(self, cancel), level = "info")]
    async fn fetch(
        &self,
        latitude: f64,
        longitude: f64,
        cancel: &CancellationToken,
    ) -> Result<Forecast, FetchError> {
        let request = ForecastRequest::now(latitude, longitude);

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.fetch_window(&request) => result,
        };

        match &result {
            Ok(fc) => {
                debug!(from = %fc.from, to = %fc.to, "forecast fetched");
                self.metrics.fetch_succeeded();
            }
            Err(err) => {
                debug!(error = %err, reason = err.reason(), "forecast fetch failed");
                self.metrics.fetch_failed(err.reason());
            }
        }

        result
    }
}
