//! Numeric settings written either as numbers or as numeric strings
//!
//! `"scanEveryMs": "5000"` and `scanEveryMs = 5000` load the same. Blank
//! strings read as zero, which `AppConfig::normalize` turns into the default.
//! Fractional values are truncated.

use serde::de::{Deserializer, Error};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(untagged)]
enum Raw {
    Int(u64),
    Float(f64),
    Text(String),
}

pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: TryFrom<u64>,
{
    let value = match Raw::deserialize(deserializer)? {
        Raw::Int(n) => n,
        Raw::Float(f) => from_float(f).map_err(D::Error::custom)?,
        Raw::Text(text) => from_text(&text).map_err(D::Error::custom)?,
    };
    T::try_from(value).map_err(|_| D::Error::custom(format!("{} is out of range", value)))
}

fn from_text(text: &str) -> Result<u64, String> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(0);
    }
    if let Ok(n) = text.parse::<u64>() {
        return Ok(n);
    }
    text.parse::<f64>()
        .map_err(|_| format!("expected a number, got {:?}", text))
        .and_then(from_float)
}

fn from_float(value: f64) -> Result<u64, String> {
    if value.is_finite() && value >= 0.0 && value <= u64::MAX as f64 {
        Ok(value.trunc() as u64)
    } else {
        Err(format!("expected a non-negative number, got {}", value))
    }
}
