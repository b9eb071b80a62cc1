//! Kernel introspection boundary.
//!
//! The sampler never talks to the kernel directly. Everything it needs is
//! expressed by the [`Platform`] trait:
//! - `processor_groups` / `group_tasks`: two-level task enumeration
//! - `task_*`: identity, architecture, resource info, threads, VM regions
//! - `host_*` and friends: CPU ticks, load, VM statistics, network, disks
//!
//! [`linux::LinuxPlatform`] implements it on top of `/proc`.

pub mod linux;
mod types;

use std::path::PathBuf;

pub use types::{
    AddressWindow, Arch, CpuTicks, DiskCounters, GroupId, LoadAverage, NetCounters, ObjectId,
    Protection, RawCounters, RegionInfo, SharingClass, SwapUsage, TaskHandle, TaskIdentity,
    TaskInfo, ThreadInfo, ThreadRunState, VmStatistics, WorkqueueInfo,
};

/// Lazily produced regions of one task, in ascending address order.
pub type RegionIter<'a> = Box<dyn Iterator<Item = Result<RegionInfo, PlatformError>> + 'a>;

/// Errors reported by a [`Platform`] query.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {what}: {detail}")]
    Parse { what: &'static str, detail: String },

    #[error("process {0} has exited")]
    Exited(u32),

    #[error("not supported on this platform: {0}")]
    Unsupported(&'static str),
}

impl PlatformError {
    pub(crate) fn parse(what: &'static str, detail: impl Into<String>) -> Self {
        PlatformError::Parse {
            what,
            detail: detail.into(),
        }
    }
}

/// Host kernel introspection used by the sampler.
///
/// Implementations are queried synchronously from the sampling thread only.
pub trait Platform {
    /// Size of a VM page in bytes.
    fn page_size(&self) -> u64;

    /// Address range of the platform-wide shared library region, if the host
    /// has one.
    fn shared_region(&self) -> Option<AddressWindow> {
        None
    }

    fn processor_groups(&self) -> Result<Vec<GroupId>, PlatformError>;

    fn group_tasks(&self, group: GroupId) -> Result<Vec<TaskHandle>, PlatformError>;

    /// Resolves a task to its pid. Fails once the task has exited.
    fn task_pid(&self, task: TaskHandle) -> Result<u32, PlatformError>;

    fn task_identity(&self, pid: u32) -> Result<TaskIdentity, PlatformError>;

    fn task_arch(&self, pid: u32) -> Result<Arch, PlatformError>;

    fn task_info(&self, pid: u32) -> Result<TaskInfo, PlatformError>;

    fn task_threads(&self, pid: u32) -> Result<Vec<ThreadInfo>, PlatformError>;

    /// Walks the task's VM regions from the lowest address up. An `Err` item
    /// ends the walk early.
    fn task_regions(&self, pid: u32) -> Result<RegionIter<'_>, PlatformError>;

    fn host_cpu_ticks(&self) -> Result<CpuTicks, PlatformError>;

    fn load_average(&self) -> Result<LoadAverage, PlatformError>;

    fn vm_statistics(&self) -> Result<VmStatistics, PlatformError>;

    /// `Ok(None)` on hosts without swap accounting.
    fn swap_usage(&self) -> Result<Option<SwapUsage>, PlatformError>;

    fn network_counters(&self) -> Result<NetCounters, PlatformError>;

    fn disk_counters(&self) -> Result<DiskCounters, PlatformError>;
}
