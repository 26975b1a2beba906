use crate::thresholds::ThresholdSet;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_UPDATE_INTERVAL_MS: f64 = 5000.0;
pub const DEFAULT_ANIMATION_SPEED_MS: u64 = 300;
pub const DEFAULT_UNITS: &str = "metric";
pub const DEFAULT_ICON_SIZE: u32 = 14;
pub const DEFAULT_MAX_BACKOFF_FACTOR: f64 = 8.0;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: Option<String>,
    #[serde(default)]
    pub update_interval: Value,
    #[serde(default)]
    pub animation_speed: Value,
    #[serde(default)]
    pub units: Value,
    #[serde(default)]
    pub show_icons: Value,
    #[serde(default)]
    pub icon_size: Value,
    #[serde(default)]
    pub max_backoff_factor: Value,
    #[serde(default)]
    pub thresholds: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub listen: Option<SocketAddr>,
    pub poll_interval: Duration,
    pub animation_speed_ms: u64,
    pub units: String,
    pub show_icons: bool,
    pub icon_size: u32,
    pub max_backoff_factor: f64,
    pub thresholds: ThresholdSet,
}

impl Default for Settings {
    fn default() -> Self {
        Config::default().settings()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("не удалось прочитать файл конфигурации {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("не удалось разобрать YAML в {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        // An empty document is a valid "all defaults" config.
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }

    pub fn settings(&self) -> Settings {
        Settings {
            listen: self.listen_addr(),
            poll_interval: interval_duration(resolve_update_interval(&self.update_interval)),
            animation_speed_ms: non_negative_integer(&self.animation_speed)
                .unwrap_or(DEFAULT_ANIMATION_SPEED_MS),
            units: self
                .units
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| DEFAULT_UNITS.to_string()),
            show_icons: self.show_icons.as_bool().unwrap_or(true),
            icon_size: non_negative_integer(&self.icon_size)
                .and_then(|v| u32::try_from(v).ok())
                .unwrap_or(DEFAULT_ICON_SIZE),
            max_backoff_factor: resolve_max_backoff_factor(&self.max_backoff_factor),
            thresholds: ThresholdSet::normalize(&self.thresholds),
        }
    }

    fn listen_addr(&self) -> Option<SocketAddr> {
        let raw = self.listen.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        match SocketAddr::from_str(raw) {
            Ok(addr) => Some(addr),
            Err(err) => {
                warn!(listen = %raw, error = %err, "некорректный адрес listen, HTTP отключён");
                None
            }
        }
    }
}

/// A bare number below 1000 is read as seconds, so a deliberate `500` (meant
/// as milliseconds) becomes 500 000 ms.
pub fn resolve_update_interval(value: &Value) -> f64 {
    match value {
        Value::String(text) => {
            let trimmed = text.trim().to_lowercase();
            if let Some(prefix) = trimmed.strip_suffix("ms") {
                return positive(parse_leading_f64(prefix)).unwrap_or(DEFAULT_UPDATE_INTERVAL_MS);
            }
            if let Some(prefix) = trimmed.strip_suffix('s') {
                return positive(parse_leading_f64(prefix))
                    .map(|secs| secs * 1000.0)
                    .unwrap_or(DEFAULT_UPDATE_INTERVAL_MS);
            }
            DEFAULT_UPDATE_INTERVAL_MS
        }
        Value::Number(n) => match positive(n.as_f64()) {
            Some(v) if v < 1000.0 => v * 1000.0,
            Some(v) => v,
            None => DEFAULT_UPDATE_INTERVAL_MS,
        },
        _ => DEFAULT_UPDATE_INTERVAL_MS,
    }
}

pub fn resolve_max_backoff_factor(value: &Value) -> f64 {
    match value {
        Value::Number(n) => positive(n.as_f64()).unwrap_or(DEFAULT_MAX_BACKOFF_FACTOR),
        _ => DEFAULT_MAX_BACKOFF_FACTOR,
    }
}

const MIN_INTERVAL: Duration = Duration::from_millis(1);
const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

pub fn interval_duration(ms: f64) -> Duration {
    Duration::try_from_secs_f64(ms / 1000.0)
        .unwrap_or(MAX_INTERVAL)
        .clamp(MIN_INTERVAL, MAX_INTERVAL)
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

fn non_negative_integer(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|v| v.is_finite() && *v >= 0.0).map(|v| v as u64)),
        _ => None,
    }
}

fn parse_leading_f64(input: &str) -> Option<f64> {
    let text = input.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut has_digits = end > digits_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        if frac_end > frac_start || has_digits {
            has_digits |= frac_end > frac_start;
            end = frac_end;
        }
    }
    if !has_digits {
        return None;
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits {
            end = exp_end;
        }
    }
    text[..end].parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thresholds::{MetricKey, MetricThresholds};

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).expect("yaml")
    }

    #[test]
    fn interval_strings_with_units() {
        assert_eq!(resolve_update_interval(&yaml("\"250ms\"")), 250.0);
        assert_eq!(resolve_update_interval(&yaml("\"1.5ms\"")), 1.5);
        assert_eq!(resolve_update_interval(&yaml("\"10s\"")), 10_000.0);
        assert_eq!(resolve_update_interval(&yaml("\"2.5s\"")), 2_500.0);
        assert_eq!(resolve_update_interval(&yaml("\" 30S \"")), 30_000.0);
        assert_eq!(resolve_update_interval(&yaml("\"10 s\"")), 10_000.0);
    }

    #[test]
    fn interval_bare_numbers() {
        assert_eq!(resolve_update_interval(&yaml("5")), 5_000.0);
        assert_eq!(resolve_update_interval(&yaml("0.5")), 500.0);
        assert_eq!(resolve_update_interval(&yaml("999")), 999_000.0);
        assert_eq!(resolve_update_interval(&yaml("1000")), 1_000.0);
        assert_eq!(resolve_update_interval(&yaml("60000")), 60_000.0);
    }

    #[test]
    fn invalid_intervals_fall_back() {
        for raw in [
            "\"abc\"", "\"0s\"", "\"-5s\"", "\"ms\"", "\"5000\"", "\"fast\"", "0", "-1", ".inf",
            ".nan", "true", "~", "[1]",
        ] {
            assert_eq!(
                resolve_update_interval(&yaml(raw)),
                DEFAULT_UPDATE_INTERVAL_MS,
                "input {raw}"
            );
        }
    }

    #[test]
    fn leading_float_prefix() {
        assert_eq!(parse_leading_f64("12abc"), Some(12.0));
        assert_eq!(parse_leading_f64("  3.25"), Some(3.25));
        assert_eq!(parse_leading_f64(".5"), Some(0.5));
        assert_eq!(parse_leading_f64("4."), Some(4.0));
        assert_eq!(parse_leading_f64("1e3x"), Some(1000.0));
        assert_eq!(parse_leading_f64("2e"), Some(2.0));
        assert_eq!(parse_leading_f64("-"), None);
        assert_eq!(parse_leading_f64("."), None);
        assert_eq!(parse_leading_f64(""), None);
    }

    #[test]
    fn empty_document_gives_defaults() {
        let cfg = Config::from_yaml("").expect("empty config");
        let settings = cfg.settings();
        assert_eq!(settings.listen, None);
        assert_eq!(settings.poll_interval, Duration::from_millis(5000));
        assert_eq!(settings.animation_speed_ms, 300);
        assert_eq!(settings.units, "metric");
        assert!(settings.show_icons);
        assert_eq!(settings.icon_size, 14);
        assert_eq!(settings.max_backoff_factor, 8.0);
        assert_eq!(settings.thresholds, ThresholdSet::default());
    }

    #[test]
    fn example_config_parses() {
        let cfg = Config::from_yaml(Config::example_yaml()).expect("example config");
        let settings = cfg.settings();
        assert_eq!(settings.listen, Some("127.0.0.1:9108".parse::<SocketAddr>().unwrap()));
        assert_eq!(settings.poll_interval, Duration::from_secs(5));
        assert_eq!(settings.thresholds, ThresholdSet::default());
    }

    #[test]
    fn malformed_values_are_never_fatal() {
        let cfg = Config::from_yaml(
            "listen: not-an-address\nupdate_interval: [1]\nanimation_speed: slow\nunits: 7\n\
             show_icons: maybe\nicon_size: -3\nmax_backoff_factor: zero\nthresholds: 42\n",
        )
        .expect("config with bad values still loads");
        let settings = cfg.settings();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = Config::from_yaml(
            "update_interval: \"2s\"\nanimation_speed: 0\nunits: imperial\nshow_icons: false\n\
             icon_size: 20\nmax_backoff_factor: 4\nthresholds:\n  cpu:\n    warning: 10\n",
        )
        .expect("config");
        let settings = cfg.settings();
        assert_eq!(settings.poll_interval, Duration::from_secs(2));
        assert_eq!(settings.animation_speed_ms, 0);
        assert_eq!(settings.units, "imperial");
        assert!(!settings.show_icons);
        assert_eq!(settings.icon_size, 20);
        assert_eq!(settings.max_backoff_factor, 4.0);
        assert_eq!(
            *settings.thresholds.get(MetricKey::Cpu),
            MetricThresholds::new(10.0, 85.0)
        );
    }

    #[test]
    fn interval_duration_is_clamped() {
        assert_eq!(interval_duration(0.0001), Duration::from_millis(1));
        assert_eq!(interval_duration(1e300), MAX_INTERVAL);
        assert_eq!(interval_duration(1500.0), Duration::from_millis(1500));
    }

    #[test]
    fn invalid_yaml_is_a_parse_error() {
        let dir = std::env::temp_dir().join(format!("hoststatsd-cfg-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join("broken.yaml");
        fs::write(&path, "update_interval: [unclosed").expect("write");
        let err = Config::load_from_file(&path).expect_err("must fail");
        assert!(matches!(err, ConfigError::Parse { .. }));

        let err = Config::load_from_file(dir.join("missing.yaml")).expect_err("must fail");
        assert!(matches!(err, ConfigError::Read { .. }));
        let _ = fs::remove_dir_all(&dir);
    }
}
