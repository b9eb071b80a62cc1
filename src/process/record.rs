//! Per-process sample record.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

use super::state::RunState;
use crate::memory::RegionTotals;
use crate::platform::{Arch, RawCounters, TaskIdentity, WorkqueueInfo};
use crate::sample::{Counter, Epoch, Sampled};

/// Memory figures of one process, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryFigures {
    pub resident: u64,
    pub virtual_size: u64,
    pub private_resident: u64,
    pub private_virtual: u64,
    pub shared_resident: u64,
    pub aliased: u64,
    pub empty: u64,
    pub regions: u32,
    /// Private bytes inside the platform-shared region.
    pub framework_private: u64,
}

impl MemoryFigures {
    /// Replaces the region-derived figures with a fresh walk's totals.
    pub fn apply_regions(&mut self, totals: &RegionTotals) {
        self.private_resident = totals.private_resident;
        self.private_virtual = totals.private_virtual;
        self.shared_resident = totals.shared_resident;
        self.aliased = totals.aliased;
        self.empty = totals.empty;
        self.regions = totals.regions;
        self.framework_private = totals.framework_private;
    }
}

/// The eight wrapping kernel counters of a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessCounters {
    pub faults: Counter,
    pub cow_faults: Counter,
    pub pageins: Counter,
    pub messages_sent: Counter,
    pub messages_received: Counter,
    pub syscalls_mach: Counter,
    pub syscalls_unix: Counter,
    pub context_switches: Counter,
}

impl ProcessCounters {
    pub fn update(&mut self, raw: &RawCounters) {
        self.faults.update(raw.faults);
        self.cow_faults.update(raw.cow_faults);
        self.pageins.update(raw.pageins);
        self.messages_sent.update(raw.messages_sent);
        self.messages_received.update(raw.messages_received);
        self.syscalls_mach.update(raw.syscalls_mach);
        self.syscalls_unix.update(raw.syscalls_unix);
        self.context_switches.update(raw.context_switches);
    }
}

/// Everything known about one live process.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessRecord {
    pub pid: u32,
    pub ppid: u32,
    pub pgid: u32,
    pub uid: u32,
    pub command: String,
    pub start_time: DateTime<Utc>,
    pub arch: Arch,

    pub memory: Sampled<MemoryFigures>,
    pub threads: Sampled<u32>,
    pub running_threads: Sampled<u32>,
    pub ports: Sampled<u32>,
    pub counters: ProcessCounters,
    pub kernel_alloc_bytes: Sampled<u64>,
    pub kernel_free_bytes: Sampled<u64>,
    pub workqueue: Sampled<WorkqueueInfo>,
    pub cpu_time: Epoch<Duration>,
    pub run_state: RunState,

    /// Pass of the last successful update.
    pub stamp: u64,
    /// Stamp held before the last update.
    pub previous_stamp: u64,
    /// Number of successful updates.
    pub samples: u64,

    /// Per-process region collection override; `None` follows the global flag.
    pub region_override: Option<bool>,
    /// Whether the last region walk found the platform-shared window mapped.
    pub shared_segments_mapped: bool,
}

impl ProcessRecord {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            ppid: 0,
            pgid: 0,
            uid: 0,
            command: String::new(),
            start_time: DateTime::<Utc>::default(),
            arch: Arch::Unknown,
            memory: Sampled::default(),
            threads: Sampled::default(),
            running_threads: Sampled::default(),
            ports: Sampled::default(),
            counters: ProcessCounters::default(),
            kernel_alloc_bytes: Sampled::default(),
            kernel_free_bytes: Sampled::default(),
            workqueue: Sampled::default(),
            cpu_time: Epoch::new(Duration::ZERO),
            run_state: RunState::Unknown,
            stamp: 0,
            previous_stamp: 0,
            samples: 0,
            region_override: None,
            shared_segments_mapped: false,
        }
    }

    pub fn set_identity(&mut self, identity: TaskIdentity) {
        self.ppid = identity.ppid;
        self.pgid = identity.pgid;
        self.uid = identity.uid;
        self.command = identity.command;
        self.start_time = identity.start_time;
    }

    /// Records the task's total CPU time.
    pub fn observe_cpu_time(&mut self, total: Duration) {
        if self.samples == 0 {
            self.cpu_time = Epoch::new(total);
        } else {
            self.cpu_time.advance(total);
        }
    }

    /// CPU time consumed since the previous pass.
    pub fn cpu_delta(&self) -> Duration {
        self.cpu_time.now.saturating_sub(self.cpu_time.previous)
    }

    /// Total CPU time consumed.
    pub fn cpu_total(&self) -> Duration {
        self.cpu_time.now
    }

    pub fn mark_updated(&mut self, pass: u64) {
        self.previous_stamp = self.stamp;
        self.stamp = pass;
        self.samples += 1;
    }

    pub fn is_live(&self, pass: u64) -> bool {
        self.stamp == pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_record_is_blank() {
        let r = ProcessRecord::new(42);
        assert_eq!(r.pid, 42);
        assert_eq!(r.samples, 0);
        assert_eq!(r.run_state, RunState::Unknown);
        assert!(!r.is_live(1));
        assert_eq!(r.region_override, None);
    }

    #[test]
    fn test_cpu_time_epoch() {
        let mut r = ProcessRecord::new(1);
        r.observe_cpu_time(Duration::from_millis(500));
        r.mark_updated(1);
        assert_eq!(r.cpu_delta(), Duration::ZERO);

        r.observe_cpu_time(Duration::from_millis(800));
        r.mark_updated(2);
        assert_eq!(r.cpu_delta(), Duration::from_millis(300));
        assert_eq!(r.cpu_total(), Duration::from_millis(800));
        assert_eq!(r.cpu_time.began, Duration::from_millis(500));
    }

    #[test]
    fn test_stamp_tracks_previous_pass() {
        let mut r = ProcessRecord::new(1);
        r.mark_updated(3);
        r.mark_updated(4);
        assert_eq!(r.previous_stamp, 3);
        assert!(r.is_live(4));
        assert!(!r.is_live(5));
        assert_eq!(r.samples, 2);
    }

    #[test]
    fn test_apply_regions_replaces_figures() {
        let mut figures = MemoryFigures {
            resident: 100,
            shared_resident: 999,
            ..Default::default()
        };
        figures.apply_regions(&RegionTotals {
            regions: 4,
            private_resident: 10,
            shared_resident: 20,
            ..Default::default()
        });
        assert_eq!(figures.resident, 100);
        assert_eq!(figures.shared_resident, 20);
        assert_eq!(figures.regions, 4);
    }

    #[test]
    fn test_counters_update_all_fields() {
        let mut c = ProcessCounters::default();
        c.update(&RawCounters {
            faults: 10,
            context_switches: 5,
            ..Default::default()
        });
        c.update(&RawCounters {
            faults: 15,
            context_switches: 9,
            ..Default::default()
        });
        assert_eq!(c.faults.delta(), 5);
        assert_eq!(c.context_switches.value(), 9);
        assert_eq!(c.pageins.value(), 0);
    }
}
