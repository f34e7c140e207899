use chrono::{DateTime, Duration, Local, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp layout expected by the upstream service. No UTC offset is sent.
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Coordinates plus the one-hour window `[from, to)` for a single upstream call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForecastRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub from: NaiveDateTime,
    pub to: NaiveDateTime,
}

impl ForecastRequest {
    /// Window starting at the given local wall-clock time.
    pub fn starting_at(latitude: f64, longitude: f64, from: NaiveDateTime) -> Self {
        Self { latitude, longitude, from, to: from + Duration::hours(1) }
    }

    /// Window starting now, in local time.
    pub fn now(latitude: f64, longitude: f64) -> Self {
        Self::starting_at(latitude, longitude, Local::now().naive_local())
    }

    /// Fill the `${lat}`, `${long}`, `${now}` and `${later}` placeholders of `template`.
    ///
    /// Coordinates use the shortest decimal that round-trips, so `53.3375` stays
    /// `53.3375` and `-6.0` becomes `-6`.
    pub fn url(&self, template: &str) -> String {
        template
            .replacen("${lat}", &self.latitude.to_string(), 1)
            .replacen("${long}", &self.longitude.to_string(), 1)
            .replacen("${now}", &self.from.format(DATE_TIME_FORMAT).to_string(), 1)
            .replacen("${later}", &self.to.format(DATE_TIME_FORMAT).to_string(), 1)
    }
}

/// One normalized forecast, built once per cycle and written once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    /// When the document was decoded, not a value from the document.
    pub time: DateTime<Utc>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub temperature: f64,
    pub wind_direction: f64,
    pub wind_direction_name: String,
    pub wind_speed_mps: f64,
    pub wind_speed_beaufort: i32,
    pub solar_radiation: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub cloudiness: f64,
    pub clouds_low: f64,
    pub clouds_medium: f64,
    pub clouds_high: f64,
    pub dewpoint: f64,
    pub rain_mm: f64,
    pub rain_min: f64,
    pub rain_max: f64,
    pub rain_probability: f64,
}
