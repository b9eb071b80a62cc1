//! Host-wide statistics from the /proc filesystem.
//!
//! Parsers for `/proc/loadavg`, the aggregate `cpu` line of `/proc/stat`,
//! `/proc/meminfo` and `/proc/vmstat`. The parsers take file contents so they
//! can be exercised without a live /proc.

use crate::platform::{CpuTicks, LoadAverage, PlatformError, SwapUsage, VmStatistics};
use std::collections::HashMap;

/// Parses load averages from `/proc/loadavg`.
///
/// Format: "0.00 0.01 0.05 1/234 5678"
pub fn parse_load_average(content: &str) -> Result<LoadAverage, PlatformError> {
    let parts: Vec<&str> = content.split_whitespace().collect();
    if parts.len() < 3 {
        return Err(PlatformError::parse(
            "/proc/loadavg",
            format!("expected at least 3 fields, got {}", parts.len()),
        ));
    }

    let field = |idx: usize, name: &str| {
        parts[idx].parse::<f64>().map_err(|e| {
            PlatformError::parse("/proc/loadavg", format!("{} load average: {}", name, e))
        })
    };

    Ok(LoadAverage {
        one_min: field(0, "1min")?,
        five_min: field(1, "5min")?,
        fifteen_min: field(2, "15min")?,
    })
}

/// Parses the aggregate `cpu` line of `/proc/stat` into four-state ticks.
///
/// Interrupt time is folded into system and iowait into idle.
pub fn parse_cpu_ticks(content: &str) -> Result<CpuTicks, PlatformError> {
    let line = content
        .lines()
        .find(|l| l.starts_with("cpu "))
        .ok_or_else(|| PlatformError::parse("/proc/stat", "no aggregate cpu line"))?;

    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 8 {
        return Err(PlatformError::parse(
            "/proc/stat",
            format!("cpu line has {} fields", parts.len()),
        ));
    }

    let value = |idx: usize| parts.get(idx).and_then(|v| v.parse::<u64>().ok()).unwrap_or(0);

    let user = value(1);
    let nice = value(2);
    let system = value(3);
    let idle = value(4);
    let iowait = value(5);
    let irq = value(6);
    let softirq = value(7);

    Ok(CpuTicks {
        user,
        nice,
        system: system + irq + softirq,
        idle: idle + iowait,
    })
}

/// Reads the boot time (seconds since the epoch) from `/proc/stat`.
pub fn parse_boot_time(content: &str) -> Option<i64> {
    content
        .lines()
        .find_map(|l| l.strip_prefix("btime "))
        .and_then(|v| v.trim().parse().ok())
}

/// Parses `/proc/meminfo` into a map of field name to bytes.
pub fn parse_meminfo(content: &str) -> HashMap<String, u64> {
    let mut fields = HashMap::new();
    for line in content.lines() {
        let Some((key, rest)) = line.split_once(':') else {
            continue;
        };
        let mut parts = rest.split_whitespace();
        let Some(value) = parts.next().and_then(|v| v.parse::<u64>().ok()) else {
            continue;
        };
        let bytes = match parts.next() {
            Some("kB") => value * 1024,
            _ => value,
        };
        fields.insert(key.trim().to_string(), bytes);
    }
    fields
}

/// Parses `/proc/vmstat` into a map of counter name to value.
pub fn parse_vmstat(content: &str) -> HashMap<String, u64> {
    content
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let key = parts.next()?;
            let value = parts.next()?.parse().ok()?;
            Some((key.to_string(), value))
        })
        .collect()
}

/// Builds VM statistics (in pages) from parsed meminfo and vmstat.
pub fn vm_statistics_from(
    meminfo: &HashMap<String, u64>,
    vmstat: &HashMap<String, u64>,
    page_size: u64,
) -> Result<VmStatistics, PlatformError> {
    let page_size = page_size.max(1);
    let free = meminfo
        .get("MemFree")
        .copied()
        .ok_or_else(|| PlatformError::parse("/proc/meminfo", "MemFree missing"))?;
    let bytes = |key: &str| meminfo.get(key).copied().unwrap_or(0);

    let wired = bytes("Unevictable") + bytes("SUnreclaim") + bytes("KernelStack") + bytes("PageTables");
    let purgeable = meminfo
        .get("KReclaimable")
        .or_else(|| meminfo.get("SReclaimable"))
        .copied()
        .unwrap_or(0);

    // pgpgin/pgpgout count KiB transferred
    let kib_to_pages = |key: &str| vmstat.get(key).copied().unwrap_or(0) * 1024 / page_size;

    Ok(VmStatistics {
        wired: wired / page_size,
        active: bytes("Active") / page_size,
        inactive: bytes("Inactive") / page_size,
        free: free / page_size,
        purgeable: purgeable / page_size,
        pageins: kib_to_pages("pgpgin"),
        pageouts: kib_to_pages("pgpgout"),
    })
}

/// Swap usage from meminfo; `None` when the kernel reports no swap fields.
pub fn swap_usage_from(meminfo: &HashMap<String, u64>) -> Option<SwapUsage> {
    let total = *meminfo.get("SwapTotal")?;
    let free = *meminfo.get("SwapFree")?;
    Some(SwapUsage {
        total_bytes: total,
        used_bytes: total.saturating_sub(free),
    })
}
