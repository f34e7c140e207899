//! Core library for the `metie` forecast poller.
//!
//! This crate defines:
//! - Configuration loading and validation
//! - The XML decoder for point forecasts
//! - The forecast provider (HTTP fetch) and the row writer (PostgreSQL)
//! - The polling loop tying them together, plus the counters it reports
//!
//! It is used by `metie-cli`, but the pipeline pieces can be driven on their own.

pub mod config;
pub mod decode;
pub mod error;
pub mod metrics;
pub mod model;
pub mod network;
pub mod provider;
pub mod scheduler;
pub mod store;

pub use config::Config;
pub use decode::decode;
pub use error::{ConfigError, DecodeError, FetchError, WriteError};
pub use metrics::{MetricsSink, NoopMetrics, PrometheusMetrics, RecordingMetrics};
pub use model::{Forecast, ForecastRequest};
pub use network::NetworkPolicy;
pub use provider::{ForecastProvider, MetEireannProvider};
pub use scheduler::{PollSnapshot, PollStats, Poller};
pub use store::{ForecastStore, PostgresWriter};
