use async_trait::async_trait;
use std::fmt::Debug;
use tokio_util::sync::CancellationToken;

use crate::{Forecast, error::FetchError};

pub mod met_eireann;

pub use met_eireann::MetEireannProvider;

/// Source of one forecast per call. Implementations make exactly one attempt.
#[async_trait]
pub trait ForecastProvider: Send + Sync + Debug {
    async fn fetch(
        &self,
        latitude: f64,
        longitude: f64,
        cancel: &CancellationToken,
    ) -> Result<Forecast, FetchError>;
}
