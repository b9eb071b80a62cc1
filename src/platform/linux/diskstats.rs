//! Disk I/O statistics from /proc/diskstats.

use crate::platform::DiskCounters;

/// Sector size used by /proc/diskstats regardless of the device.
const SECTOR_BYTES: u64 = 512;

/// Disk statistics for a single device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskStats {
    pub device: String,
    pub reads_completed: u64,
    pub sectors_read: u64,
    pub writes_completed: u64,
    pub sectors_written: u64,
}

impl From<&DiskStats> for DiskCounters {
    fn from(s: &DiskStats) -> Self {
        DiskCounters {
            reads: s.reads_completed,
            writes: s.writes_completed,
            bytes_read: s.sectors_read * SECTOR_BYTES,
            bytes_written: s.sectors_written * SECTOR_BYTES,
        }
    }
}

/// Parses `/proc/diskstats`.
///
/// Format: major minor name read_ios read_merges read_sectors read_ticks write_ios write_merges write_sectors ...
pub fn parse_diskstats(content: &str) -> Vec<DiskStats> {
    let mut stats = Vec::new();

    for line in content.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 14 {
            continue; // Skip malformed lines
        }

        let device = parts[2];
        if device.starts_with("loop") || device.starts_with("ram") {
            continue;
        }

        stats.push(DiskStats {
            device: device.to_string(),
            reads_completed: parts[3].parse().unwrap_or(0),
            sectors_read: parts[5].parse().unwrap_or(0),
            writes_completed: parts[7].parse().unwrap_or(0),
            sectors_written: parts[9].parse().unwrap_or(0),
        });
    }

    stats
}

/// Sums the devices accepted by `is_whole_disk`, so partitions are not
/// counted twice.
pub fn sum_devices<F>(stats: &[DiskStats], is_whole_disk: F) -> DiskCounters
where
    F: Fn(&str) -> bool,
{
    stats
        .iter()
        .filter(|s| is_whole_disk(&s.device))
        .fold(DiskCounters::default(), |acc, s| acc + DiskCounters::from(s))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DISKSTATS: &str = "   7       0 loop0 50 0 100 10 0 0 0 0 0 10 10 0 0 0 0
   8       0 sda 1000 20 80000 500 2000 30 160000 900 0 1200 1400 0 0 0 0
   8       1 sda1 900 10 70000 450 1900 25 150000 850 0 1100 1300 0 0 0 0
 259       0 nvme0n1 300 0 6000 40 100 0 2000 20 0 50 60 0 0 0 0
   1       0 ram0 1 0 1 0 0 0 0 0 0 0 0
";

    #[test]
    fn test_parse_diskstats_skips_loop_and_ram() {
        let stats = parse_diskstats(DISKSTATS);
        let names: Vec<&str> = stats.iter().map(|s| s.device.as_str()).collect();
        assert_eq!(names, vec!["sda", "sda1", "nvme0n1"]);
        assert_eq!(stats[0].reads_completed, 1000);
        assert_eq!(stats[0].sectors_written, 160000);
    }

    #[test]
    fn test_sum_devices_whole_disks_only() {
        let stats = parse_diskstats(DISKSTATS);
        let total = sum_devices(&stats, |name| name == "sda" || name == "nvme0n1");
        assert_eq!(total.reads, 1300);
        assert_eq!(total.writes, 2100);
        assert_eq!(total.bytes_read, 86000 * 512);
        assert_eq!(total.bytes_written, 162000 * 512);
    }
}
