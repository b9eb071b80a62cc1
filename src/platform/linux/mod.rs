//! [`Platform`] implementation backed by the Linux /proc filesystem.
//!
//! Linux has no processor sets, so enumeration reports a single group that
//! holds every numeric /proc entry. 64-bit kernel counters are truncated to
//! their low 32 bits and rebuilt by the sampler's accumulators.

pub mod diskstats;
pub mod host;
pub mod netdev;
pub mod smaps;
pub mod task;

use chrono::{TimeZone, Utc};
use once_cell::sync::Lazy;
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::platform::{
    Arch, CpuTicks, DiskCounters, GroupId, LoadAverage, NetCounters, Platform, PlatformError,
    RawCounters, RegionIter, SwapUsage, TaskHandle, TaskIdentity, TaskInfo, ThreadInfo,
    VmStatistics,
};

/// The only processor group on Linux.
const DEFAULT_GROUP: GroupId = 0;

/// Get system clock ticks per second (usually 100, but can vary).
fn get_clk_tck() -> u64 {
    // SAFETY: sysconf is safe to call with _SC_CLK_TCK
    let tck = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    if tck > 0 {
        tck as u64
    } else {
        100
    }
}

fn get_page_size() -> u64 {
    // SAFETY: sysconf is safe to call with _SC_PAGESIZE
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as u64
    } else {
        4096
    }
}

/// System clock ticks per second (for CPU time calculation).
pub static CLK_TCK: Lazy<u64> = Lazy::new(get_clk_tck);

/// VM page size of the running kernel.
pub static PAGE_SIZE: Lazy<u64> = Lazy::new(get_page_size);

/// Converts clock ticks to a duration.
pub fn ticks_to_duration(ticks: u64, clk_tck: u64) -> Duration {
    let clk_tck = clk_tck.max(1);
    Duration::from_secs(ticks / clk_tck)
        + Duration::from_nanos((ticks % clk_tck) * 1_000_000_000 / clk_tck)
}

/// Low 32 bits of a kernel counter, as the signed value the accumulators expect.
fn low32(value: u64) -> i32 {
    value as u32 as i32
}

/// /proc-backed platform.
#[derive(Debug, Clone)]
pub struct LinuxPlatform {
    proc_root: PathBuf,
    sys_root: PathBuf,
    page_size: u64,
    clk_tck: u64,
}

impl Default for LinuxPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl LinuxPlatform {
    pub fn new() -> Self {
        Self::with_roots("/proc", "/sys")
    }

    /// Uses alternate /proc and /sys trees.
    pub fn with_roots(proc_root: impl Into<PathBuf>, sys_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            sys_root: sys_root.into(),
            page_size: *PAGE_SIZE,
            clk_tck: *CLK_TCK,
        }
    }

    /// Overrides the page size and tick rate detected from the running kernel.
    pub fn with_units(mut self, page_size: u64, clk_tck: u64) -> Self {
        self.page_size = page_size;
        self.clk_tck = clk_tck;
        self
    }

    fn task_path(&self, pid: u32) -> PathBuf {
        self.proc_root.join(pid.to_string())
    }

    fn read_host_file(&self, name: &str) -> Result<String, PlatformError> {
        let path = self.proc_root.join(name);
        fs::read_to_string(&path).map_err(|source| PlatformError::Io { path, source })
    }

    /// Reads a per-task file; a missing file means the task is gone.
    fn read_task_file(&self, pid: u32, name: &str) -> Result<String, PlatformError> {
        let path = self.task_path(pid).join(name);
        fs::read_to_string(&path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => PlatformError::Exited(pid),
            _ => PlatformError::Io { path, source },
        })
    }

    fn read_stat(&self, pid: u32) -> Result<task::StatFields, PlatformError> {
        let content = self.read_task_file(pid, "stat")?;
        task::parse_stat(&content)
            .ok_or_else(|| PlatformError::parse("/proc/<pid>/stat", format!("pid {}", pid)))
    }

    fn boot_time(&self) -> Option<i64> {
        self.read_host_file("stat")
            .ok()
            .and_then(|c| host::parse_boot_time(&c))
    }

    fn is_whole_disk(&self, device: &str) -> bool {
        let block = self.sys_root.join("block");
        // Without sysfs every device is counted
        !block.is_dir() || block.join(device).exists()
    }
}

impl Platform for LinuxPlatform {
    fn page_size(&self) -> u64 {
        self.page_size
    }

    fn processor_groups(&self) -> Result<Vec<GroupId>, PlatformError> {
        Ok(vec![DEFAULT_GROUP])
    }

    fn group_tasks(&self, group: GroupId) -> Result<Vec<TaskHandle>, PlatformError> {
        if group != DEFAULT_GROUP {
            return Ok(Vec::new());
        }
        let pids = task::collect_pids(&self.proc_root).map_err(|source| PlatformError::Io {
            path: self.proc_root.clone(),
            source,
        })?;
        Ok(pids.into_iter().map(|pid| TaskHandle(pid as u64)).collect())
    }

    fn task_pid(&self, task: TaskHandle) -> Result<u32, PlatformError> {
        let pid = task.0 as u32;
        if self.task_path(pid).is_dir() {
            Ok(pid)
        } else {
            Err(PlatformError::Exited(pid))
        }
    }

    fn task_identity(&self, pid: u32) -> Result<TaskIdentity, PlatformError> {
        let stat = self.read_stat(pid)?;
        let status = task::parse_status(&self.read_task_file(pid, "status")?);
        let command = task::read_process_name(&self.task_path(pid)).unwrap_or(stat.comm);

        let start_time = self
            .boot_time()
            .and_then(|boot| {
                let since_boot = ticks_to_duration(stat.starttime, self.clk_tck);
                Utc.timestamp_opt(boot, 0)
                    .single()
                    .map(|b| {
                        b + chrono::Duration::from_std(since_boot)
                            .unwrap_or_else(|_| chrono::Duration::zero())
                    })
            })
            .unwrap_or_default();

        Ok(TaskIdentity {
            ppid: stat.ppid,
            pgid: stat.pgrp,
            uid: status.uid,
            command,
            start_time,
        })
    }

    fn task_arch(&self, pid: u32) -> Result<Arch, PlatformError> {
        let path = self.task_path(pid);
        if !path.is_dir() {
            return Err(PlatformError::Exited(pid));
        }
        match task::read_exe_arch(&path) {
            Ok(Some(arch)) => Ok(arch),
            Ok(None) => Ok(Arch::Unknown),
            Err(e) => {
                // Kernel threads have no exe and foreign tasks hide it
                debug!("Using host architecture for pid {}: {}", pid, e);
                Ok(Arch::host())
            }
        }
    }

    fn task_info(&self, pid: u32) -> Result<TaskInfo, PlatformError> {
        let stat = self.read_stat(pid)?;
        let status = task::parse_status(&self.read_task_file(pid, "status")?);
        // io and fd need privileges for foreign tasks
        let syscalls_unix = self
            .read_task_file(pid, "io")
            .map(|c| task::parse_io_syscalls(&c))
            .unwrap_or(0);
        let port_count = fs::read_dir(self.task_path(pid).join("fd"))
            .map(|d| d.count() as u32)
            .unwrap_or(0);

        Ok(TaskInfo {
            resident_size: stat.rss_pages * self.page_size,
            virtual_size: stat.vsize,
            user_time: ticks_to_duration(stat.utime, self.clk_tck),
            system_time: ticks_to_duration(stat.stime, self.clk_tck),
            port_count,
            counters: RawCounters {
                faults: low32(stat.minflt + stat.majflt),
                pageins: low32(stat.majflt),
                syscalls_unix: low32(syscalls_unix),
                context_switches: low32(
                    status.voluntary_ctxt_switches + status.nonvoluntary_ctxt_switches,
                ),
                ..RawCounters::default()
            },
            ..TaskInfo::default()
        })
    }

    fn task_threads(&self, pid: u32) -> Result<Vec<ThreadInfo>, PlatformError> {
        let path = self.task_path(pid);
        task::read_threads(&path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => PlatformError::Exited(pid),
            _ => PlatformError::Io {
                path: path.join("task"),
                source,
            },
        })
    }

    fn task_regions(&self, pid: u32) -> Result<RegionIter<'_>, PlatformError> {
        let path = self.task_path(pid).join("smaps");
        let file = fs::File::open(&path).map_err(|source| PlatformError::Io {
            path: path.clone(),
            source,
        })?;

        let (entries, error) = smaps::parse_smaps(BufReader::new(file));
        let regions = smaps::build_regions(&entries, self.page_size);
        let tail = error.map(|source| PlatformError::Io { path, source });

        Ok(Box::new(regions.into_iter().map(Ok).chain(tail.map(Err))))
    }

    fn host_cpu_ticks(&self) -> Result<CpuTicks, PlatformError> {
        host::parse_cpu_ticks(&self.read_host_file("stat")?)
    }

    fn load_average(&self) -> Result<LoadAverage, PlatformError> {
        host::parse_load_average(&self.read_host_file("loadavg")?)
    }

    fn vm_statistics(&self) -> Result<VmStatistics, PlatformError> {
        let meminfo = host::parse_meminfo(&self.read_host_file("meminfo")?);
        let vmstat = host::parse_vmstat(&self.read_host_file("vmstat")?);
        host::vm_statistics_from(&meminfo, &vmstat, self.page_size)
    }

    fn swap_usage(&self) -> Result<Option<SwapUsage>, PlatformError> {
        let meminfo = host::parse_meminfo(&self.read_host_file("meminfo")?);
        Ok(host::swap_usage_from(&meminfo))
    }

    fn network_counters(&self) -> Result<NetCounters, PlatformError> {
        let stats = netdev::parse_netdev(&self.read_host_file("net/dev")?);
        Ok(netdev::sum_interfaces(&stats))
    }

    fn disk_counters(&self) -> Result<DiskCounters, PlatformError> {
        let stats = diskstats::parse_diskstats(&self.read_host_file("diskstats")?);
        Ok(diskstats::sum_devices(&stats, |d| self.is_whole_disk(d)))
    }
}

/// True when `root` looks like a mounted procfs.
pub fn is_proc_mounted(root: &Path) -> bool {
    root.join("stat").is_file() && root.join("loadavg").is_file()
}
