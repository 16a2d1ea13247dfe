//! Best-effort device telemetry for heartbeats.
//!
//! CPU and memory come from procfs and degrade to zero on platforms or
//! containers where the files are unreadable; disk usage is the content
//! directory measured against the configured quota, which is what the
//! control plane actually cares about on a display device.

use crate::content::ContentManager;
use billboard_core::protocol::SystemStatus;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;

struct CpuTimes {
    busy: u64,
    total: u64,
}

pub struct TelemetrySampler {
    started: Instant,
    content: Arc<ContentManager>,
    quota_bytes: u64,
    last_cpu: Mutex<Option<CpuTimes>>,
}

impl TelemetrySampler {
    pub fn new(content: Arc<ContentManager>, quota_bytes: u64) -> Self {
        Self {
            started: Instant::now(),
            content,
            quota_bytes,
            last_cpu: Mutex::new(None),
        }
    }

    pub fn sample(&self) -> SystemStatus {
        let disk_usage = if self.quota_bytes == 0 {
            0.0
        } else {
            (self.content.content_bytes() as f32 / self.quota_bytes as f32).min(1.0)
        };
        SystemStatus {
            cpu_usage: self.cpu_usage().unwrap_or(0.0),
            memory_usage: memory_usage().unwrap_or(0.0),
            disk_usage,
            uptime_secs: self.started.elapsed().as_secs(),
        }
    }

    /// Busy fraction since the previous sample. The first call primes the
    /// counters and reports nothing.
    fn cpu_usage(&self) -> Option<f32> {
        let current = read_cpu_times()?;
        let mut last = self.last_cpu.lock();
        let usage = last.as_ref().and_then(|prev| {
            let total = current.total.checked_sub(prev.total)?;
            let busy = current.busy.checked_sub(prev.busy)?;
            if total == 0 {
                None
            } else {
                Some(busy as f32 / total as f32)
            }
        });
        *last = Some(current);
        usage
    }
}

fn read_cpu_times() -> Option<CpuTimes> {
    let stat = std::fs::read_to_string("/proc/stat").ok()?;
    let line = stat.lines().next()?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|f| f.parse().ok())
        .collect();
    if fields.len() < 4 {
        return None;
    }
    let total: u64 = fields.iter().sum();
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Some(CpuTimes {
        busy: total - idle,
        total,
    })
}

fn memory_usage() -> Option<f32> {
    let meminfo = std::fs::read_to_string("/proc/meminfo").ok()?;
    let mut total = None;
    let mut available = None;
    for line in meminfo.lines() {
        if let Some(rest) = line.strip_prefix("MemTotal:") {
            total = parse_kb(rest);
        } else if let Some(rest) = line.strip_prefix("MemAvailable:") {
            available = parse_kb(rest);
        }
    }
    let (total, available) = (total?, available?);
    if total == 0 {
        None
    } else {
        Some(1.0 - available as f32 / total as f32)
    }
}

fn parse_kb(rest: &str) -> Option<u64> {
    rest.trim().split_whitespace().next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let content = Arc::new(ContentManager::new(reqwest::Client::new(), dir.path()));
        let sampler = TelemetrySampler::new(content, 1024);

        // First sample primes the CPU counters.
        let first = sampler.sample();
        let second = sampler.sample();
        for status in [first, second] {
            assert!((0.0..=1.0).contains(&status.cpu_usage));
            assert!((0.0..=1.0).contains(&status.memory_usage));
            assert!((0.0..=1.0).contains(&status.disk_usage));
        }
    }

    #[test]
    fn disk_usage_is_content_over_quota() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("asset.bin"), vec![0u8; 512]).unwrap();
        let content = Arc::new(ContentManager::new(reqwest::Client::new(), dir.path()));
        let sampler = TelemetrySampler::new(content, 1024);

        let status = sampler.sample();
        assert!((status.disk_usage - 0.5).abs() < 0.01);
    }

    #[test]
    fn zero_quota_reports_zero() {
        let dir = tempfile::tempdir().unwrap();
        let content = Arc::new(ContentManager::new(reqwest::Client::new(), dir.path()));
        let sampler = TelemetrySampler::new(content, 0);
        assert_eq!(sampler.sample().disk_usage, 0.0);
    }
}
