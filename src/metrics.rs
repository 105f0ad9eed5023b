//! Raw system metric sources: CPU load, RAM usage, temperature.
//!
//! The kernel counters behind these update at a coarse rate (typically
//! 100 Hz for the CPU counters), so sampling them faster than a few times
//! per second just wastes I/O. The sampler reads them on a divided
//! schedule and smooths the results; these readers only produce raw values.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

const PROC_STAT: &str = "/proc/stat";
const PROC_MEMINFO: &str = "/proc/meminfo";
const THERMAL_ZONE: &str = "/sys/devices/virtual/thermal/thermal_zone0/temp";

// Delay between retries when the CPU counters have not advanced yet.
const RETRY_DELAY: Duration = Duration::from_millis(50);
const MAX_RETRIES: u32 = 3;

/// Metric source error types
#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("I/O error reading metric source: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed counters in {0}")]
    Malformed(String),
    #[error("CPU counters did not advance between samples")]
    Stalled,
}

/// Every integer found in a whitespace-separated line, other tokens skipped.
fn ints_in_line(line: &str) -> Vec<u64> {
    line.split_whitespace()
        .filter_map(|token| token.parse().ok())
        .collect()
}

/// CPU load reader over `/proc/stat`.
///
/// The first line holds cumulative per-state tick counters for all cores
/// combined; the 4th numeric field is idle time. Load is the fraction of
/// non-idle ticks between two samples, so the reader keeps the previous
/// counters as state.
pub struct CpuLoad {
    path: PathBuf,
    last: Vec<u64>,
}

impl CpuLoad {
    pub fn new() -> Self {
        Self::at(PROC_STAT)
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last: Vec::new(),
        }
    }

    fn read_counters(&self) -> Result<Vec<u64>, MetricsError> {
        let contents = fs::read_to_string(&self.path)?;
        let first_line = contents.lines().next().unwrap_or("");
        let counters = ints_in_line(first_line);
        if counters.len() < 4 {
            return Err(MetricsError::Malformed(self.path.display().to_string()));
        }
        Ok(counters)
    }

    /// Mean CPU load in percent across all cores since the previous call.
    ///
    /// The first call primes the counter state and retries after a short
    /// delay; a zero total delta (called again before the kernel ticked)
    /// also retries rather than dividing by zero. Bounded retries: if the
    /// counters never advance this returns [`MetricsError::Stalled`] and
    /// the caller keeps its cached value.
    pub fn sample(&mut self) -> Result<f32, MetricsError> {
        for _ in 0..MAX_RETRIES {
            let current = self.read_counters()?;

            if self.last.is_empty() {
                self.last = current;
                thread::sleep(RETRY_DELAY);
                continue;
            }

            // Counters can restart from zero, e.g. across a suspend cycle.
            let total = current
                .iter()
                .sum::<u64>()
                .saturating_sub(self.last.iter().sum::<u64>());
            if total == 0 {
                thread::sleep(RETRY_DELAY);
                continue;
            }

            let idle = current[3].saturating_sub(self.last[3]) as f32;
            let load = 100.0 * (1.0 - idle / total as f32);
            self.last = current;
            return Ok(load);
        }
        Err(MetricsError::Stalled)
    }
}

impl Default for CpuLoad {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentage of used RAM, estimated the way `free(1)` does:
/// `MemTotal - MemFree - Buffers - Cached - SReclaimable`.
pub fn ram_used_pct() -> Result<f32, MetricsError> {
    ram_used_pct_from(Path::new(PROC_MEMINFO))
}

pub fn ram_used_pct_from(path: &Path) -> Result<f32, MetricsError> {
    let contents = fs::read_to_string(path)?;

    let mut total = None;
    let mut free_sum = 0u64;
    for line in contents.lines() {
        let value = || {
            ints_in_line(line)
                .first()
                .copied()
                .ok_or_else(|| MetricsError::Malformed(path.display().to_string()))
        };
        if line.starts_with("MemTotal:") {
            total = Some(value()?);
        } else if line.starts_with("MemFree:")
            || line.starts_with("Buffers:")
            || line.starts_with("Cached:")
            || line.starts_with("SReclaimable:")
        {
            free_sum += value()?;
        }
    }

    let total = total.ok_or_else(|| MetricsError::Malformed(path.display().to_string()))?;
    if total == 0 {
        return Err(MetricsError::Malformed(path.display().to_string()));
    }
    Ok(100.0 * (1.0 - free_sum as f32 / total as f32))
}

/// CPU temperature reader over the thermal zone sysfs file.
///
/// Some boards ship without the sensor; that is not an error. The first
/// failure is logged, afterwards the reader stays quiet and keeps
/// reporting "no data" so the temperature bar displays dark.
pub struct TempSensor {
    path: PathBuf,
    missing_logged: bool,
}

impl TempSensor {
    pub fn new() -> Self {
        Self::at(THERMAL_ZONE)
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            missing_logged: false,
        }
    }

    /// Temperature in degrees Celsius, or `None` when the sensor is absent
    /// or unreadable.
    pub fn sample(&mut self) -> Option<f32> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) => {
                if !self.missing_logged {
                    warn!(path = %self.path.display(), error = %e, "no temperature source, bar stays dark");
                    self.missing_logged = true;
                }
                return None;
            }
        };
        let millidegrees: f32 = contents.trim().parse().ok()?;
        Some(millidegrees / 1000.0)
    }
}

impl Default for TempSensor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_file(file: &mut NamedTempFile, contents: &str) {
        use std::io::Seek;
        file.as_file_mut().set_len(0).unwrap();
        file.as_file_mut().rewind().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
    }

    #[test]
    fn test_ints_in_line() {
        assert_eq!(ints_in_line("cpu 10 20 x 30"), vec![10, 20, 30]);
        assert_eq!(ints_in_line(""), Vec::<u64>::new());
    }

    #[test]
    fn test_cpu_load_between_samples() {
        let mut file = NamedTempFile::new().unwrap();
        write_file(&mut file, "cpu 100 0 0 800 0 0 0 0 0 0\n");

        let mut cpu = CpuLoad::at(file.path());
        // First sample only primes the counters; the file never advances,
        // so it reports a stall instead of a division by zero.
        assert!(matches!(cpu.sample(), Err(MetricsError::Stalled)));

        // 150 non-idle and 50 idle ticks later: 2/3 load.
        write_file(&mut file, "cpu 200 0 0 850 0 0 0 0 0 0\n");
        let load = cpu.sample().unwrap();
        assert_relative_eq!(load, 100.0 * (1.0 - 50.0 / 150.0), epsilon = 1e-3);
    }

    #[test]
    fn test_cpu_load_malformed() {
        let mut file = NamedTempFile::new().unwrap();
        write_file(&mut file, "cpu\n");

        let mut cpu = CpuLoad::at(file.path());
        assert!(matches!(cpu.sample(), Err(MetricsError::Malformed(_))));
    }

    #[test]
    fn test_ram_used_pct() {
        let mut file = NamedTempFile::new().unwrap();
        write_file(
            &mut file,
            "MemTotal:       1000 kB\n\
             MemFree:         200 kB\n\
             Buffers:         100 kB\n\
             Cached:          100 kB\n\
             SwapCached:       50 kB\n\
             SReclaimable:    100 kB\n",
        );

        let used = ram_used_pct_from(file.path()).unwrap();
        assert_relative_eq!(used, 50.0, epsilon = 1e-3);
    }

    #[test]
    fn test_ram_missing_total_is_malformed() {
        let mut file = NamedTempFile::new().unwrap();
        write_file(&mut file, "MemFree: 200 kB\n");
        assert!(matches!(
            ram_used_pct_from(file.path()),
            Err(MetricsError::Malformed(_))
        ));
    }

    #[test]
    fn test_temp_sensor_millidegrees() {
        let mut file = NamedTempFile::new().unwrap();
        write_file(&mut file, "42500\n");

        let mut sensor = TempSensor::at(file.path());
        assert_relative_eq!(sensor.sample().unwrap(), 42.5);
    }

    #[test]
    fn test_temp_sensor_absent_is_none() {
        let mut sensor = TempSensor::at("/nonexistent/thermal_zone99/temp");
        assert!(sensor.sample().is_none());
        assert!(sensor.sample().is_none());
    }
}
