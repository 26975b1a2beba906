use crate::config::Settings;
use crate::state::{DisplayState, Snapshot};
use crate::thresholds::{MetricKey, Severity, ThresholdSet};
use serde::Serialize;
use std::fmt::Write as _;
use tokio::sync::watch;
use tracing::debug;

pub const NOT_AVAILABLE: &str = "N/A";
pub const LOADING_TEXT: &str = "Loading…";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Icon {
    pub name: &'static str,
    pub size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub icon: Option<Icon>,
    pub label: &'static str,
    pub value: String,
    pub severity: Option<Severity>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum DisplayView {
    Loading { text: String },
    Error { message: String },
    Rows { rows: Vec<Row> },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayFrame {
    pub view: DisplayView,
    pub animation_speed_ms: u64,
    pub units: String,
}

impl DisplayFrame {
    pub fn loading(settings: &Settings) -> Self {
        render(&DisplayState::Loading, settings)
    }

    pub fn to_text(&self) -> String {
        match &self.view {
            DisplayView::Loading { text } => text.clone(),
            DisplayView::Error { message } => format!("! {message}"),
            DisplayView::Rows { rows } => {
                let mut out = String::new();
                for row in rows {
                    let _ = write!(out, "{:<12} {:>10}", row.label, row.value);
                    if let Some(severity) = row.severity {
                        let _ = write!(out, " [{severity}]");
                    }
                    out.push('\n');
                }
                out.trim_end().to_string()
            }
        }
    }
}

pub fn render(state: &DisplayState, settings: &Settings) -> DisplayFrame {
    let view = match state {
        DisplayState::Loading => DisplayView::Loading {
            text: LOADING_TEXT.to_string(),
        },
        DisplayState::Error(message) => DisplayView::Error {
            message: message.clone(),
        },
        DisplayState::Ready(snapshot) => DisplayView::Rows {
            rows: build_rows(snapshot, settings),
        },
    };
    DisplayFrame {
        view,
        animation_speed_ms: settings.animation_speed_ms,
        units: settings.units.clone(),
    }
}

fn build_rows(snapshot: &Snapshot, settings: &Settings) -> Vec<Row> {
    let t = &settings.thresholds;
    let icon = |name: &'static str| {
        settings.show_icons.then_some(Icon {
            name,
            size: settings.icon_size,
        })
    };

    vec![
        metric_row(
            t,
            MetricKey::Cpu,
            icon("cpu"),
            "CPU",
            Some(snapshot.cpu_load),
            format_percent,
        ),
        metric_row(
            t,
            MetricKey::Temp,
            icon("temp"),
            "Temperature",
            snapshot.cpu_temp,
            format_temperature,
        ),
        metric_row(
            t,
            MetricKey::Ram,
            icon("ram"),
            "RAM",
            Some(snapshot.ram_used_percent),
            format_percent,
        ),
        metric_row(
            t,
            MetricKey::Disk,
            icon("disk"),
            "Disk",
            snapshot.disk_used_percent,
            format_percent,
        ),
        Row {
            icon: icon("uptime"),
            label: "Uptime",
            value: format_uptime(Some(snapshot.uptime_seconds)),
            severity: None,
        },
    ]
}

fn metric_row(
    thresholds: &ThresholdSet,
    key: MetricKey,
    icon: Option<Icon>,
    label: &'static str,
    value: Option<f64>,
    format: fn(Option<f64>) -> String,
) -> Row {
    Row {
        icon,
        label,
        value: format(value),
        severity: Some(thresholds.classify(key, value)),
    }
}

pub fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.1}%"),
        None => NOT_AVAILABLE.to_string(),
    }
}

pub fn format_temperature(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.1}°C"),
        None => NOT_AVAILABLE.to_string(),
    }
}

pub fn format_uptime(seconds: Option<f64>) -> String {
    let Some(seconds) = seconds.filter(|s| s.is_finite()) else {
        return NOT_AVAILABLE.to_string();
    };
    let days = (seconds / 86_400.0).floor() as i64;
    let hours = ((seconds % 86_400.0) / 3_600.0).floor() as i64;
    let minutes = ((seconds % 3_600.0) / 60.0).floor() as i64;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else {
        format!("{hours}h {minutes}m")
    }
}

pub async fn run_presenter(
    mut frames: watch::Receiver<DisplayFrame>,
    mut shutdown: watch::Receiver<bool>,
) {
    let first = frames.borrow_and_update().to_text();
    println!("{first}\n");
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            changed = frames.changed() => {
                if changed.is_err() {
                    break;
                }
                let frame = frames.borrow_and_update().clone();
                debug!(animation_speed_ms = frame.animation_speed_ms, "обновление отображения");
                println!("{}\n", frame.to_text());
            }
        }
    }
}
