//! Error types for each stage of a forecast cycle.

use std::{path::PathBuf, time::Duration};

use thiserror::Error;

/// Invalid or unreadable configuration. Always fatal, raised before polling starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("latitude and longitude are missing or invalid")]
    MissingCoordinates,

    #[error("missing DSN or table name")]
    MissingDestination,

    #[error("invalid table name '{name}': expected a plain SQL identifier")]
    InvalidTable { name: String },

    #[error("invalid interval: must be greater than zero")]
    InvalidInterval,

    #[error("invalid database DSN: {reason}")]
    InvalidDsn { reason: String },

    #[error("invalid proxy address '{addr}': expected host:port")]
    InvalidProxy { addr: String },

    #[error("Could not determine platform config directory")]
    NoConfigDir,
}

/// The upstream document could not be turned into a [`crate::Forecast`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("error decoding XML data: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("malformed result: missing rainfall (len = {entries})")]
    MalformedResult { entries: usize },
}

/// A single fetch attempt failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("request cancelled")]
    Cancelled,

    #[error("unexpected response code: {code}")]
    HttpStatus { code: u16 },

    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    #[error("error parsing response: {0}")]
    Parsing(#[from] DecodeError),
}

impl FetchError {
    /// Label used for the failure counter.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Network(_) | Self::Cancelled => "network",
            Self::HttpStatus { .. } | Self::BodyTooLarge { .. } => "http",
            Self::Parsing(_) => "parsing",
        }
    }
}

/// Persisting a forecast row failed.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("cannot connect to database: {0}")]
    Connection(#[source] tokio_postgres::Error),

    #[error("cannot reach database through proxy: {0}")]
    Proxy(#[from] tokio_socks::Error),

    #[error("cannot resolve database host '{host}': {reason}")]
    Resolve { host: String, reason: String },

    #[error("cannot write row to database: {0}")]
    Write(#[source] tokio_postgres::Error),

    #[error("database connection not established after {0:?}")]
    ConnectTimeout(Duration),

    #[error("insert not acknowledged after {0:?}")]
    WriteTimeout(Duration),

    #[error("write cancelled")]
    Cancelled,
}

impl WriteError {
    /// Label used for the failure counter.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Write(_) | Self::WriteTimeout(_) => "write",
            Self::Connection(_)
            | Self::Proxy(_)
            | Self::Resolve { .. }
            | Self::ConnectTimeout(_)
            | Self::Cancelled => "connection",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_reasons() {
        assert_eq!(FetchError::Cancelled.reason(), "network");
        assert_eq!(FetchError::HttpStatus { code: 503 }.reason(), "http");
        assert_eq!(FetchError::BodyTooLarge { limit: 64 }.reason(), "http");

        let parsing = FetchError::from(DecodeError::MalformedResult { entries: 1 });
        assert_eq!(parsing.reason(), "parsing");
    }

    #[test]
    fn http_status_error_carries_code() {
        let err = FetchError::HttpStatus { code: 404 };
        assert!(err.to_string().contains("404"));
    }

    #[test]
    fn write_error_reasons() {
        let err = WriteError::Resolve { host: "db.example.ts.net".into(), reason: "nxdomain".into() };
        assert_eq!(err.reason(), "connection");
        assert_eq!(WriteError::Cancelled.reason(), "connection");
        assert_eq!(WriteError::ConnectTimeout(Duration::from_secs(30)).reason(), "connection");
        assert_eq!(WriteError::WriteTimeout(Duration::from_secs(30)).reason(), "write");
    }
}
