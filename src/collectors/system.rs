use crate::collectors::{CollectError, MetricsSource};
use crate::state::Snapshot;
use std::sync::{Mutex, MutexGuard};
use std::thread::{self, ScopedJoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};
use sysinfo::{ComponentExt, CpuExt, DiskExt, System, SystemExt};
use tracing::debug;

pub struct SysinfoSource {
    cpu: Mutex<System>,
    memory: Mutex<System>,
    disks: Mutex<System>,
    sensors: Mutex<System>,
    clock: System,
}

impl SysinfoSource {
    pub fn new() -> Self {
        let mut cpu = System::new();
        // Primes the usage counters; the first real read is then a delta.
        cpu.refresh_cpu();
        let mut sensors = System::new();
        sensors.refresh_components_list();

        Self {
            cpu: Mutex::new(cpu),
            memory: Mutex::new(System::new()),
            disks: Mutex::new(System::new()),
            sensors: Mutex::new(sensors),
            clock: System::new(),
        }
    }

    fn cpu_load(&self) -> Result<f64, CollectError> {
        let mut system = lock(&self.cpu, "cpu")?;
        system.refresh_cpu();
        let load = system.global_cpu_info().cpu_usage() as f64;
        if !load.is_finite() {
            return Err(CollectError::InvalidCpuLoad(load));
        }
        Ok(load)
    }

    fn cpu_temperature(&self) -> Result<Option<f64>, CollectError> {
        let mut system = lock(&self.sensors, "temperature")?;
        system.refresh_components();
        let readings: Vec<(String, f64)> = system
            .components()
            .iter()
            .map(|c| (c.label().to_string(), c.temperature() as f64))
            .collect();
        debug!(sensors = readings.len(), "прочитаны датчики температуры");
        Ok(pick_cpu_temperature(&readings))
    }

    fn ram_used_percent(&self) -> Result<f64, CollectError> {
        let mut system = lock(&self.memory, "memory")?;
        system.refresh_memory();
        used_percent(system.total_memory(), system.available_memory())
            .ok_or(CollectError::ZeroMemoryTotal)
    }

    fn disk_used_percent(&self) -> Result<Option<f64>, CollectError> {
        let mut system = lock(&self.disks, "disk")?;
        system.refresh_disks_list();
        system.refresh_disks();
        let disks: Vec<(u64, u64)> = system
            .disks()
            .iter()
            .map(|d| (d.total_space(), d.available_space()))
            .collect();
        Ok(first_disk_percent(&disks))
    }

    fn uptime_seconds(&self) -> Result<f64, CollectError> {
        Ok(self.clock.uptime() as f64)
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSource for SysinfoSource {
    fn gather(&self) -> Result<Snapshot, CollectError> {
        let (cpu, temp, ram, disk, uptime) = thread::scope(|scope| {
            let cpu = scope.spawn(|| self.cpu_load());
            let temp = scope.spawn(|| self.cpu_temperature());
            let ram = scope.spawn(|| self.ram_used_percent());
            let disk = scope.spawn(|| self.disk_used_percent());
            let uptime = scope.spawn(|| self.uptime_seconds());
            (
                join(cpu, "cpu"),
                join(temp, "temperature"),
                join(ram, "memory"),
                join(disk, "disk"),
                join(uptime, "uptime"),
            )
        });

        assemble(cpu, temp, ram, disk, uptime, now_unix_millis())
    }
}

fn assemble(
    cpu: Result<f64, CollectError>,
    temp: Result<Option<f64>, CollectError>,
    ram: Result<f64, CollectError>,
    disk: Result<Option<f64>, CollectError>,
    uptime: Result<f64, CollectError>,
    timestamp: i64,
) -> Result<Snapshot, CollectError> {
    Ok(Snapshot {
        cpu_load: round1(cpu?),
        cpu_temp: temp?.map(round1),
        ram_used_percent: round1(ram?),
        disk_used_percent: disk?.map(round1),
        uptime_seconds: uptime?,
        timestamp,
    })
}

fn lock<'a>(
    system: &'a Mutex<System>,
    name: &'static str,
) -> Result<MutexGuard<'a, System>, CollectError> {
    system.lock().map_err(|_| CollectError::Panicked(name))
}

fn join<T>(
    handle: ScopedJoinHandle<'_, Result<T, CollectError>>,
    name: &'static str,
) -> Result<T, CollectError> {
    handle.join().map_err(|_| CollectError::Panicked(name))?
}

fn used_percent(total: u64, available: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some(total.saturating_sub(available) as f64 / total as f64 * 100.0)
}

// Only the first reported filesystem counts.
fn first_disk_percent(disks: &[(u64, u64)]) -> Option<f64> {
    let (total, available) = disks.first()?;
    used_percent(*total, *available)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

const CPU_MARKERS: [&str; 6] = ["cpu", "package", "tctl", "tdie", "coretemp", "k10temp"];
const GPU_MARKERS: [&str; 4] = ["gpu", "nvidia", "amdgpu", "radeon"];

fn pick_cpu_temperature(readings: &[(String, f64)]) -> Option<f64> {
    let plausible = || {
        readings
            .iter()
            .filter(|(_, celsius)| (0.0..=130.0).contains(celsius))
            .map(|(label, celsius)| (label.to_lowercase(), *celsius))
    };
    let is_gpu = |label: &str| GPU_MARKERS.iter().any(|m| label.contains(m));

    let primary = plausible()
        .filter(|(label, _)| CPU_MARKERS.iter().any(|m| label.contains(m)) && !is_gpu(label))
        .map(|(_, celsius)| celsius)
        .max_by(|a, b| a.total_cmp(b));
    if primary.is_some() {
        return primary;
    }

    plausible()
        .filter(|(label, _)| !is_gpu(label))
        .map(|(_, celsius)| celsius)
        .max_by(|a, b| a.total_cmp(b))
}

fn now_unix_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readings(items: &[(&str, f64)]) -> Vec<(String, f64)> {
        items.iter().map(|(l, v)| (l.to_string(), *v)).collect()
    }

    #[test]
    fn cpu_sensor_preferred_over_others() {
        let r = readings(&[
            ("acpitz temp1", 90.0),
            ("coretemp Package id 0", 55.0),
            ("coretemp Core 1", 58.0),
            ("nvidia GPU", 70.0),
        ]);
        assert_eq!(pick_cpu_temperature(&r), Some(58.0));
    }

    #[test]
    fn falls_back_to_non_gpu_sensor() {
        let r = readings(&[("acpitz temp1", 41.0), ("amdgpu edge", 66.0)]);
        assert_eq!(pick_cpu_temperature(&r), Some(41.0));
    }

    #[test]
    fn implausible_or_missing_readings_are_absent() {
        assert_eq!(pick_cpu_temperature(&[]), None);
        let r = readings(&[("coretemp Core 0", f64::NAN), ("k10temp Tctl", 400.0)]);
        assert_eq!(pick_cpu_temperature(&r), None);
        let r = readings(&[("nvidia GPU", 70.0)]);
        assert_eq!(pick_cpu_temperature(&r), None);
    }

    #[test]
    fn used_percent_and_rounding() {
        assert_eq!(used_percent(0, 0), None);
        assert_eq!(used_percent(200, 50), Some(75.0));
        assert_eq!(used_percent(100, 150), Some(0.0));
        assert_eq!(round1(88.149), 88.1);
        assert_eq!(round1(45.26), 45.3);
    }

    #[test]
    fn disk_is_taken_from_first_filesystem() {
        assert_eq!(first_disk_percent(&[]), None);
        assert_eq!(first_disk_percent(&[(0, 0), (100, 25)]), None);
        assert_eq!(first_disk_percent(&[(200, 50), (100, 90)]), Some(75.0));
    }

    #[test]
    fn one_failed_read_fails_the_whole_gather() {
        let result = assemble(
            Ok(12.34),
            Ok(Some(55.0)),
            Err(CollectError::ZeroMemoryTotal),
            Ok(Some(40.0)),
            Ok(3600.0),
            1,
        );
        assert!(matches!(result, Err(CollectError::ZeroMemoryTotal)));

        let result = assemble(
            Ok(12.34),
            Ok(None),
            Ok(50.0),
            Err(CollectError::Panicked("disk")),
            Ok(3600.0),
            1,
        );
        assert!(matches!(result, Err(CollectError::Panicked("disk"))));
    }

    #[test]
    fn complete_reads_are_rounded_into_a_snapshot() {
        let snapshot = assemble(
            Ok(12.34),
            Ok(Some(55.06)),
            Ok(88.149),
            Ok(None),
            Ok(93725.0),
            7,
        )
        .expect("all reads succeeded");
        assert_eq!(snapshot.cpu_load, 12.3);
        assert_eq!(snapshot.cpu_temp, Some(55.1));
        assert_eq!(snapshot.ram_used_percent, 88.1);
        assert_eq!(snapshot.disk_used_percent, None);
        assert_eq!(snapshot.uptime_seconds, 93725.0);
        assert_eq!(snapshot.timestamp, 7);
    }

    #[test]
    fn gather_reads_the_host() {
        let source = SysinfoSource::new();
        let snapshot = source.gather().expect("gather on the test host");
        assert!((0.0..=100.0).contains(&snapshot.cpu_load));
        assert!((0.0..=100.0).contains(&snapshot.ram_used_percent));
        assert!(snapshot.uptime_seconds >= 0.0);
        assert!(snapshot.timestamp > 0);
    }
}
