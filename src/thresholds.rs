use serde::Serialize;
use serde_yaml::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKey {
    Cpu,
    Temp,
    Ram,
    Disk,
}

impl MetricKey {
    pub const ALL: [MetricKey; 4] = [Self::Cpu, Self::Temp, Self::Ram, Self::Disk];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cpu => "cpu",
            Self::Temp => "temp",
            Self::Ram => "ram",
            Self::Disk => "disk",
        }
    }

    const fn index(self) -> usize {
        match self {
            Self::Cpu => 0,
            Self::Temp => 1,
            Self::Ram => 2,
            Self::Disk => 3,
        }
    }

    const fn defaults(self) -> MetricThresholds {
        match self {
            Self::Cpu => MetricThresholds::new(60.0, 85.0),
            Self::Temp => MetricThresholds::new(65.0, 80.0),
            Self::Ram => MetricThresholds::new(70.0, 90.0),
            Self::Disk => MetricThresholds::new(80.0, 95.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricThresholds {
    pub warning: f64,
    pub critical: f64,
}

impl MetricThresholds {
    pub const fn new(warning: f64, critical: f64) -> Self {
        Self { warning, critical }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
    Ok,
    Neutral,
}

impl Severity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Warning => "warning",
            Self::Ok => "ok",
            Self::Neutral => "neutral",
        }
    }

    pub const fn level(self) -> f64 {
        match self {
            Self::Neutral => 0.0,
            Self::Ok => 1.0,
            Self::Warning => 2.0,
            Self::Critical => 3.0,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdSet {
    entries: [MetricThresholds; 4],
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self {
            entries: MetricKey::ALL.map(MetricKey::defaults),
        }
    }
}

impl ThresholdSet {
    pub fn normalize(configured: &Value) -> Self {
        let entries = MetricKey::ALL.map(|key| {
            let fallback = key.defaults();
            let section = configured.get(key.as_str());
            let warning = finite_field(section, "warning").unwrap_or(fallback.warning);
            let critical = finite_field(section, "critical").unwrap_or(fallback.critical);
            MetricThresholds {
                warning,
                critical: if critical >= warning { critical } else { warning },
            }
        });
        Self { entries }
    }

    pub fn get(&self, key: MetricKey) -> &MetricThresholds {
        &self.entries[key.index()]
    }

    pub fn classify(&self, key: MetricKey, value: Option<f64>) -> Severity {
        let Some(value) = value else {
            return Severity::Neutral;
        };
        let bounds = self.get(key);
        if value >= bounds.critical {
            Severity::Critical
        } else if value >= bounds.warning {
            Severity::Warning
        } else {
            Severity::Ok
        }
    }
}

fn finite_field(section: Option<&Value>, field: &str) -> Option<f64> {
    let value = section?.get(field)?;
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        _ => None,
    }
}
