use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

pub const INVALID_PAYLOAD_MESSAGE: &str = "Invalid metrics payload";
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub cpu_load: f64,
    pub cpu_temp: Option<f64>,
    pub ram_used_percent: f64,
    pub disk_used_percent: Option<f64>,
    pub uptime_seconds: f64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum DisplayState {
    #[default]
    Loading,
    Error(String),
    Ready(Snapshot),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("payload is not an object")]
    NotAnObject,
    #[error("field {0} must be a number")]
    NotANumber(&'static str),
    #[error("field {0} must be a number or null")]
    NotNumberOrNull(&'static str),
}

pub fn validate_snapshot(payload: &Value) -> Result<Snapshot, ValidationError> {
    let Value::Object(fields) = payload else {
        return Err(ValidationError::NotAnObject);
    };

    Ok(Snapshot {
        cpu_load: required_number(fields, "cpuLoad")?,
        cpu_temp: number_or_null(fields, "cpuTemp")?,
        ram_used_percent: required_number(fields, "ramUsedPercent")?,
        disk_used_percent: number_or_null(fields, "diskUsedPercent")?,
        uptime_seconds: required_number(fields, "uptimeSeconds")?,
        timestamp: fields
            .get("timestamp")
            .and_then(Value::as_i64)
            .unwrap_or_default(),
    })
}

fn required_number(
    fields: &Map<String, Value>,
    name: &'static str,
) -> Result<f64, ValidationError> {
    fields
        .get(name)
        .and_then(Value::as_f64)
        .ok_or(ValidationError::NotANumber(name))
}

fn number_or_null(
    fields: &Map<String, Value>,
    name: &'static str,
) -> Result<Option<f64>, ValidationError> {
    match fields.get(name) {
        Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or(ValidationError::NotNumberOrNull(name)),
        _ => Err(ValidationError::NotNumberOrNull(name)),
    }
}
