use async_trait::async_trait;
use std::fmt::Debug;
use tokio_util::sync::CancellationToken;

use crate::{Forecast, error::WriteError};

pub mod postgres;

pub use postgres::PostgresWriter;

/// Destination for decoded forecasts. One call persists one row.
#[async_trait]
pub trait ForecastStore: Send + Sync + Debug {
    async fn write(&self, forecast: &Forecast, cancel: &CancellationToken) -> Result<(), WriteError>;
}
