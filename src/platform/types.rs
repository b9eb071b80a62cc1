//! Plain data exchanged across the [`Platform`](super::Platform) boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Add;
use std::time::Duration;

/// Processor group (processor set) identifier.
pub type GroupId = u32;

/// Opaque per-platform handle for a task inside a processor group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle(pub u64);

/// Half-open address range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressWindow {
    pub start: u64,
    pub end: u64,
}

impl AddressWindow {
    pub fn contains(&self, address: u64) -> bool {
        address >= self.start && address < self.end
    }

    pub fn size(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

/// CPU architecture a process runs as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Arch {
    X86,
    X86_64,
    Arm,
    Arm64,
    PowerPc,
    PowerPc64,
    RiscV,
    Other(u16),
    #[default]
    Unknown,
}

impl Arch {
    /// Architecture this binary was compiled for.
    pub fn host() -> Self {
        if cfg!(target_arch = "x86_64") {
            Arch::X86_64
        } else if cfg!(target_arch = "x86") {
            Arch::X86
        } else if cfg!(target_arch = "aarch64") {
            Arch::Arm64
        } else if cfg!(target_arch = "arm") {
            Arch::Arm
        } else if cfg!(target_arch = "powerpc64") {
            Arch::PowerPc64
        } else if cfg!(target_arch = "powerpc") {
            Arch::PowerPc
        } else if cfg!(target_arch = "riscv64") {
            Arch::RiscV
        } else {
            Arch::Unknown
        }
    }

    /// Maps an ELF `e_machine` value.
    pub fn from_elf_machine(machine: u16) -> Self {
        match machine {
            3 => Arch::X86,
            62 => Arch::X86_64,
            40 => Arch::Arm,
            183 => Arch::Arm64,
            20 => Arch::PowerPc,
            21 => Arch::PowerPc64,
            243 => Arch::RiscV,
            other => Arch::Other(other),
        }
    }
}

/// Identity fields of a task.
#[derive(Debug, Clone)]
pub struct TaskIdentity {
    pub ppid: u32,
    pub pgid: u32,
    pub uid: u32,
    pub command: String,
    pub start_time: DateTime<Utc>,
}

/// Raw 32-bit kernel counters, before wrap reconstruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawCounters {
    pub faults: i32,
    pub cow_faults: i32,
    pub pageins: i32,
    pub messages_sent: i32,
    pub messages_received: i32,
    pub syscalls_mach: i32,
    pub syscalls_unix: i32,
    pub context_switches: i32,
}

/// Workqueue thread counts of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkqueueInfo {
    pub threads: u32,
    pub running: u32,
    pub blocked: u32,
}

/// Basic and extended resource information of a task.
#[derive(Debug, Clone, Default)]
pub struct TaskInfo {
    pub resident_size: u64,
    pub virtual_size: u64,
    pub user_time: Duration,
    pub system_time: Duration,
    pub port_count: u32,
    pub counters: RawCounters,
    pub kernel_alloc_bytes: u64,
    pub kernel_free_bytes: u64,
    pub workqueue: WorkqueueInfo,
}

/// Scheduler state of a single thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadRunState {
    Running,
    Stopped,
    Waiting,
    Uninterruptible,
    Halted,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadInfo {
    pub run_state: ThreadRunState,
    /// Seconds the thread has been waiting; zero when unknown.
    pub sleep_time: u32,
}

/// How the pages of a VM region are shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum SharingClass {
    Private,
    SharedTrue,
    CopyOnWrite,
    Empty,
    LargePage,
    PrivateAliased,
}

/// Identity of the memory object backing a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectId {
    /// Kernel-assigned VM object id.
    Object(u64),
    /// File mapping identified by device and inode.
    File { device: u64, inode: u64 },
    /// Anonymous mapping identified by its start address.
    Anonymous(u64),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Protection {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

/// One VM region of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionInfo {
    pub start: u64,
    pub size: u64,
    pub object: ObjectId,
    pub sharing: SharingClass,
    /// Number of mappings referencing the backing object, host wide.
    pub ref_count: u32,
    /// Resident pages of the backing object.
    pub resident_pages: u64,
    /// Resident pages private to this task (copy-on-write copies included).
    pub private_resident_pages: u64,
    pub protection: Protection,
}

impl RegionInfo {
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.size)
    }
}

/// Host-wide CPU ticks per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CpuTicks {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
}

impl CpuTicks {
    pub fn total(&self) -> u64 {
        self.user + self.nice + self.system + self.idle
    }

    /// Per-state ticks elapsed since `earlier`.
    pub fn since(&self, earlier: &CpuTicks) -> CpuTicks {
        CpuTicks {
            user: self.user.saturating_sub(earlier.user),
            nice: self.nice.saturating_sub(earlier.nice),
            system: self.system.saturating_sub(earlier.system),
            idle: self.idle.saturating_sub(earlier.idle),
        }
    }
}

/// System load averages for 1, 5, and 15 minute intervals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LoadAverage {
    pub one_min: f64,
    pub five_min: f64,
    pub fifteen_min: f64,
}

/// Host VM statistics, in pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VmStatistics {
    pub wired: u64,
    pub active: u64,
    pub inactive: u64,
    pub free: u64,
    pub purgeable: u64,
    pub pageins: u64,
    pub pageouts: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SwapUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
}

/// Cumulative network counters summed over interfaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NetCounters {
    pub packets_in: u64,
    pub packets_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
}

impl Add for NetCounters {
    type Output = NetCounters;

    fn add(self, rhs: NetCounters) -> NetCounters {
        NetCounters {
            packets_in: self.packets_in + rhs.packets_in,
            packets_out: self.packets_out + rhs.packets_out,
            bytes_in: self.bytes_in + rhs.bytes_in,
            bytes_out: self.bytes_out + rhs.bytes_out,
        }
    }
}

/// Cumulative disk counters summed over devices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiskCounters {
    pub reads: u64,
    pub writes: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
}

impl Add for DiskCounters {
    type Output = DiskCounters;

    fn add(self, rhs: DiskCounters) -> DiskCounters {
        DiskCounters {
            reads: self.reads + rhs.reads,
            writes: self.writes + rhs.writes,
            bytes_read: self.bytes_read + rhs.bytes_read,
            bytes_written: self.bytes_written + rhs.bytes_written,
        }
    }
}
