//! System load collection using pwrzv

use crate::error::HealthError;
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

/// CPU and memory utilization, both as fractions in `0..=1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemStats {
    pub cpu_util: f64,
    pub mem_util: f64,
}

/// At least one collector failed. Whatever did succeed is kept.
#[derive(Debug)]
pub struct StatsError {
    pub cpu_util: Option<f64>,
    pub mem_util: Option<f64>,
    pub source: HealthError,
}

impl fmt::Display for StatsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.source.fmt(f)
    }
}

impl std::error::Error for StatsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl StatsError {
    pub fn new(source: HealthError) -> Self {
        Self {
            cpu_util: None,
            mem_util: None,
            source,
        }
    }
}

/// Normalize a reading to a fraction; pwrzv reports some values as percentages.
fn as_fraction(value: f64) -> f64 {
    if value > 1.0 { value / 100.0 } else { value }
}

fn cpu_util(details: &HashMap<String, f32>) -> Result<f64, String> {
    details
        .get("cpu_usage")
        .map(|v| as_fraction(f64::from(*v)))
        .ok_or_else(|| "cpu collector: cpu_usage not reported".to_string())
}

fn mem_util(details: &HashMap<String, f32>) -> Result<f64, String> {
    if let (Some(used), Some(total)) = (details.get("memory_used"), details.get("memory_total")) {
        if *total <= 0.0 {
            return Err("memory collector: memory_total is zero".to_string());
        }
        return Ok(f64::from(*used) / f64::from(*total));
    }
    if let Some(available) = details.get("memory_available") {
        return Ok(1.0 - as_fraction(f64::from(*available)));
    }
    Err("memory collector: memory usage not reported".to_string())
}

/// Build stats from one pwrzv details map, collecting per-collector failures.
pub(crate) fn stats_from_details(
    details: &HashMap<String, f32>,
) -> Result<SystemStats, StatsError> {
    let cpu = cpu_util(details);
    let mem = mem_util(details);

    match (cpu, mem) {
        (Ok(cpu_util), Ok(mem_util)) => Ok(SystemStats { cpu_util, mem_util }),
        (cpu, mem) => {
            let mut errors = Vec::new();
            let cpu_util = cpu.map_err(|e| errors.push(e)).ok();
            let mem_util = mem.map_err(|e| errors.push(e)).ok();
            Err(StatsError {
                cpu_util,
                mem_util,
                source: HealthError::Aggregate(errors),
            })
        }
    }
}

/// 收集系统 CPU / 内存利用率
pub async fn collect_system_stats() -> Result<SystemStats, StatsError> {
    let (_, details) = pwrzv::get_power_reserve_level_with_details_direct()
        .await
        .map_err(|e| {
            warn!("Failed to read system stats: {}", e);
            StatsError::new(HealthError::Stats(e.to_string()))
        })?;

    stats_from_details(&details)
}
