use crate::state::Snapshot;
use crate::thresholds::{MetricKey, ThresholdSet};
use prometheus::core::Collector;
use prometheus::{opts, Counter, CounterVec, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub stats_cpu_load_percent: Gauge,
    pub stats_cpu_temperature_celsius: Gauge,
    pub stats_ram_used_percent: Gauge,
    pub stats_disk_used_percent: Gauge,
    pub stats_uptime_seconds: Gauge,
    pub stats_severity_level: GaugeVec,
    pub stats_consecutive_errors: Gauge,
    pub stats_retry_delay_seconds: Gauge,
    pub stats_requests_total: CounterVec,
    pub stats_failures_total: CounterVec,
    pub stats_scrape_count_total: Counter,
    pub stats_last_update_timestamp_seconds: Gauge,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();

        let stats_cpu_load_percent = Gauge::with_opts(opts!(
            "stats_cpu_load_percent",
            "Last reported CPU load in percent"
        ))?;
        let stats_cpu_temperature_celsius = Gauge::with_opts(opts!(
            "stats_cpu_temperature_celsius",
            "Last reported CPU temperature in Celsius (NaN when unavailable)"
        ))?;
        let stats_ram_used_percent = Gauge::with_opts(opts!(
            "stats_ram_used_percent",
            "Last reported RAM usage in percent"
        ))?;
        let stats_disk_used_percent = Gauge::with_opts(opts!(
            "stats_disk_used_percent",
            "Last reported usage of the first filesystem in percent (NaN when unavailable)"
        ))?;
        let stats_uptime_seconds = Gauge::with_opts(opts!(
            "stats_uptime_seconds",
            "Last reported host uptime in seconds"
        ))?;
        let stats_severity_level = GaugeVec::new(
            opts!(
                "stats_severity_level",
                "Severity per metric: 0 neutral, 1 ok, 2 warning, 3 critical"
            ),
            &["metric"],
        )?;
        let stats_consecutive_errors = Gauge::with_opts(opts!(
            "stats_consecutive_errors",
            "Failures since the last valid snapshot"
        ))?;
        let stats_retry_delay_seconds = Gauge::with_opts(opts!(
            "stats_retry_delay_seconds",
            "Delay of the pending backoff retry, 0 when none is armed"
        ))?;
        let stats_requests_total = CounterVec::new(
            opts!(
                "stats_requests_total",
                "Collection requests issued, by reason"
            ),
            &["reason"],
        )?;
        let stats_failures_total = CounterVec::new(
            opts!("stats_failures_total", "Failed poll cycles, by kind"),
            &["kind"],
        )?;
        let stats_scrape_count_total = Counter::with_opts(opts!(
            "stats_scrape_count_total",
            "Number of /metrics scrapes"
        ))?;
        let stats_last_update_timestamp_seconds = Gauge::with_opts(opts!(
            "stats_last_update_timestamp_seconds",
            "Unix time of the last valid snapshot"
        ))?;

        register(&registry, &stats_cpu_load_percent)?;
        register(&registry, &stats_cpu_temperature_celsius)?;
        register(&registry, &stats_ram_used_percent)?;
        register(&registry, &stats_disk_used_percent)?;
        register(&registry, &stats_uptime_seconds)?;
        register(&registry, &stats_severity_level)?;
        register(&registry, &stats_consecutive_errors)?;
        register(&registry, &stats_retry_delay_seconds)?;
        register(&registry, &stats_requests_total)?;
        register(&registry, &stats_failures_total)?;
        register(&registry, &stats_scrape_count_total)?;
        register(&registry, &stats_last_update_timestamp_seconds)?;

        Ok(Arc::new(Self {
            registry,
            stats_cpu_load_percent,
            stats_cpu_temperature_celsius,
            stats_ram_used_percent,
            stats_disk_used_percent,
            stats_uptime_seconds,
            stats_severity_level,
            stats_consecutive_errors,
            stats_retry_delay_seconds,
            stats_requests_total,
            stats_failures_total,
            stats_scrape_count_total,
            stats_last_update_timestamp_seconds,
        }))
    }

    pub fn update_from_snapshot(&self, snapshot: &Snapshot, thresholds: &ThresholdSet) {
        self.stats_cpu_load_percent.set(snapshot.cpu_load);
        self.stats_cpu_temperature_celsius
            .set(snapshot.cpu_temp.unwrap_or(f64::NAN));
        self.stats_ram_used_percent.set(snapshot.ram_used_percent);
        self.stats_disk_used_percent
            .set(snapshot.disk_used_percent.unwrap_or(f64::NAN));
        self.stats_uptime_seconds.set(snapshot.uptime_seconds);

        for (key, value) in [
            (MetricKey::Cpu, Some(snapshot.cpu_load)),
            (MetricKey::Temp, snapshot.cpu_temp),
            (MetricKey::Ram, Some(snapshot.ram_used_percent)),
            (MetricKey::Disk, snapshot.disk_used_percent),
        ] {
            self.stats_severity_level
                .with_label_values(&[key.as_str()])
                .set(thresholds.classify(key, value).level());
        }

        self.stats_last_update_timestamp_seconds
            .set(now_unix() as f64);
    }

    pub fn set_backoff(&self, consecutive_errors: u32, retry_delay: Option<Duration>) {
        self.stats_consecutive_errors.set(consecutive_errors as f64);
        self.stats_retry_delay_seconds
            .set(retry_delay.map(|d| d.as_secs_f64()).unwrap_or(0.0));
    }

    pub fn inc_request(&self, reason: &str) {
        self.stats_requests_total.with_label_values(&[reason]).inc();
    }

    pub fn inc_failure(&self, kind: &str) {
        self.stats_failures_total.with_label_values(&[kind]).inc();
    }

    pub fn inc_scrape_count(&self) {
        self.stats_scrape_count_total.inc();
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
