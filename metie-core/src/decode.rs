//! Decoder for the `weatherdata` XML document returned by the point forecast service.
//!
//! The document is a list of `<time from=".." to="..">` entries, each wrapping a
//! `<location>` block. Entry 0 carries the instantaneous readings for the window and
//! entry 1 carries the precipitation accumulated over it. Everything after entry 1 is
//! ignored.

use std::io::BufRead;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

use crate::{error::DecodeError, model::Forecast};

/// Parse a `weatherdata` document and flatten its first two entries into a [`Forecast`].
///
/// The capture time is the current UTC instant, not a value taken from the document.
pub fn decode<R: BufRead>(reader: R) -> Result<Forecast, DecodeError> {
    let doc: RawWeatherDocument = quick_xml::de::from_reader(reader)?;
    doc.into_forecast()
}

/// Same as [`decode`], for a body that is already in memory.
pub fn decode_bytes(body: &[u8]) -> Result<Forecast, DecodeError> {
    decode(body)
}

#[derive(Debug, Deserialize)]
pub struct RawWeatherDocument {
    pub product: Product,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Product {
    pub time: Vec<TimeEntry>,
}

#[derive(Debug, Deserialize)]
pub struct TimeEntry {
    #[serde(rename = "@from")]
    pub from: DateTime<Utc>,
    #[serde(rename = "@to")]
    pub to: DateTime<Utc>,
    #[serde(default)]
    pub location: Location,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Location {
    #[serde(rename = "@altitude")]
    pub altitude: i32,
    #[serde(rename = "@latitude")]
    pub latitude: f64,
    #[serde(rename = "@longitude")]
    pub longitude: f64,

    pub temperature: Measurement,
    pub wind_direction: WindDirection,
    pub wind_speed: WindSpeed,
    pub global_radiation: Measurement,
    pub humidity: Measurement,
    pub pressure: Measurement,
    pub cloudiness: Cover,
    pub low_clouds: Cover,
    pub medium_clouds: Cover,
    pub high_clouds: Cover,
    pub dewpoint_temperature: Measurement,
    pub precipitation: Precipitation,
    pub symbol: Symbol,
}

impl Location {
    /// Precipitation blocks carry no temperature reading, so the unit is left empty.
    pub fn is_rain_only(&self) -> bool {
        self.temperature.unit.is_empty()
    }
}

/// A scalar reading such as temperature, humidity or pressure.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Measurement {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@unit")]
    pub unit: String,
    #[serde(rename = "@value")]
    pub value: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WindDirection {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@deg")]
    pub degrees: f64,
    #[serde(rename = "@name")]
    pub name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WindSpeed {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@mps")]
    pub mps: f64,
    #[serde(rename = "@beaufort")]
    pub beaufort: i32,
    #[serde(rename = "@name")]
    pub name: String,
}

/// Cloud cover for one altitude band, or overall.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Cover {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@percent")]
    pub percent: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Precipitation {
    #[serde(rename = "@unit")]
    pub unit: String,
    #[serde(rename = "@value")]
    pub value: f64,
    #[serde(rename = "@minvalue")]
    pub min_value: f64,
    #[serde(rename = "@maxvalue")]
    pub max_value: f64,
    #[serde(rename = "@probability")]
    pub probability: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Symbol {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@number")]
    pub number: i32,
}

impl RawWeatherDocument {
    pub fn into_forecast(self) -> Result<Forecast, DecodeError> {
        let entries = self.product.time.len();
        let mut time = self.product.time.into_iter();

        let (Some(general), Some(rainfall)) = (time.next(), time.next()) else {
            return Err(DecodeError::MalformedResult { entries });
        };

        if general.location.is_rain_only() || !rainfall.location.is_rain_only() {
            debug!(entries, "unexpected entry layout in forecast document");
        }

        let g = general.location;
        let rain = rainfall.location.precipitation;

        Ok(Forecast {
            time: Utc::now(),
            from: general.from,
            to: general.to,
            temperature: g.temperature.value,
            wind_direction: g.wind_direction.degrees,
            wind_direction_name: g.wind_direction.name,
            wind_speed_mps: g.wind_speed.mps,
            wind_speed_beaufort: g.wind_speed.beaufort,
            solar_radiation: g.global_radiation.value,
            humidity: g.humidity.value,
            pressure: g.pressure.value,
            cloudiness: g.cloudiness.percent,
            clouds_low: g.low_clouds.percent,
            clouds_medium: g.medium_clouds.percent,
            clouds_high: g.high_clouds.percent,
            dewpoint: g.dewpoint_temperature.value,
            rain_mm: rain.value,
            rain_min: rain.min_value,
            rain_max: rain.max_value,
            rain_probability: rain.probability,
        })
    }
}
