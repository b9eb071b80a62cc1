//! The sampling engine.
//!
//! A [`Sampler`] owns the process table, the object ledger and the host-wide
//! snapshot. Each call to [`Sampler::sample`] runs one pass through a fixed
//! sequence of phases:
//!
//! ```text
//! Idle -> TimestampCaptured -> ProcessesEnumerated -> LoadAvgUpdated
//!      -> CpuTicksUpdated -> FrameworkSampled -> VmStatsUpdated
//!      -> NetworkSampled -> DiskSampled -> Complete
//! ```
//!
//! A failing host query stops the pass in the phase it belongs to; figures
//! committed by earlier phases stay valid. Failures of individual tasks never
//! stop a pass: the task's record is dropped and enumeration continues.

use chrono::Utc;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use tracing::{debug, info, instrument, warn};

use crate::memory::{FrameworkTally, ObjectLedger, RegionAccountant};
use crate::platform::{Platform, PlatformError, TaskHandle, ThreadRunState};
use crate::process::{ProcessIter, ProcessRecord, ProcessTable, RunState, SortKey};
use crate::sample::{Epoch, GlobalSample, MemoryTotals, Sampled, StateHistogram};

/// Framework totals are refreshed every this many passes by default.
pub const DEFAULT_FRAMEWORK_INTERVAL: u32 = 10;

/// Progress of the current (or last) sampling pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SamplePhase {
    Idle,
    TimestampCaptured,
    ProcessesEnumerated,
    LoadAvgUpdated,
    CpuTicksUpdated,
    FrameworkSampled,
    VmStatsUpdated,
    NetworkSampled,
    DiskSampled,
    Complete,
    Failed,
}

impl fmt::Display for SamplePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SamplePhase::Idle => "idle",
            SamplePhase::TimestampCaptured => "capturing timestamp",
            SamplePhase::ProcessesEnumerated => "enumerating processes",
            SamplePhase::LoadAvgUpdated => "reading load average",
            SamplePhase::CpuTicksUpdated => "reading cpu ticks",
            SamplePhase::FrameworkSampled => "sampling frameworks",
            SamplePhase::VmStatsUpdated => "reading vm statistics",
            SamplePhase::NetworkSampled => "reading network counters",
            SamplePhase::DiskSampled => "reading disk counters",
            SamplePhase::Complete => "complete",
            SamplePhase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A sampling pass stopped early.
#[derive(Debug, thiserror::Error)]
#[error("sample failed while {phase}: {source}")]
pub struct SampleError {
    /// Phase that was being entered when the failure happened.
    pub phase: SamplePhase,
    #[source]
    pub source: PlatformError,
}

fn failed(phase: SamplePhase) -> impl FnOnce(PlatformError) -> SampleError {
    move |source| SampleError { phase, source }
}

/// Region walking decisions fixed at the start of a pass.
#[derive(Debug, Clone, Copy)]
struct PassPlan {
    collect_regions: bool,
    /// Framework totals are republished this pass, so tasks mapping the
    /// shared window are walked again.
    poll_frameworks: bool,
}

/// Process and host telemetry collector.
pub struct Sampler<P: Platform> {
    platform: P,
    table: ProcessTable,
    ledger: ObjectLedger,
    frameworks: FrameworkTally,
    global: GlobalSample,
    phase: SamplePhase,
    pass: u64,
    framework_interval: u32,
}

impl<P: Platform> Sampler<P> {
    pub fn new(platform: P) -> Self {
        let page_size = platform.page_size();
        Self {
            platform,
            table: ProcessTable::new(),
            ledger: ObjectLedger::new(page_size),
            frameworks: FrameworkTally::default(),
            global: GlobalSample::default(),
            phase: SamplePhase::Idle,
            pass: 0,
            framework_interval: DEFAULT_FRAMEWORK_INTERVAL,
        }
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn phase(&self) -> SamplePhase {
        self.phase
    }

    /// Number of passes started so far.
    pub fn pass(&self) -> u64 {
        self.pass
    }

    pub fn global(&self) -> &GlobalSample {
        &self.global
    }

    pub fn process(&self, pid: u32) -> Option<&ProcessRecord> {
        self.table.get(pid)
    }

    /// Sets how many passes apart framework totals are refreshed. Zero is
    /// treated as one.
    pub fn set_framework_interval(&mut self, passes: u32) {
        self.framework_interval = passes.max(1);
    }

    /// Forces region collection on or off for one process, or with `None`
    /// makes it follow the flag passed to [`Sampler::sample`]. Returns false
    /// when the process is not in the table.
    pub fn set_region_collection(&mut self, pid: u32, collect: Option<bool>) -> bool {
        match self.table.get_mut(pid) {
            Some(record) => {
                record.region_override = collect;
                true
            }
            None => false,
        }
    }

    /// Rebuilds the sorted view with a two-level key.
    pub fn sort(&mut self, key: &SortKey) {
        self.table.resort(self.pass, |a, b| key.compare(a, b));
    }

    /// Rebuilds the sorted view with an arbitrary comparison.
    pub fn sort_by<F>(&mut self, compare: F)
    where
        F: FnMut(&ProcessRecord, &ProcessRecord) -> Ordering,
    {
        self.table.resort(self.pass, compare);
    }

    /// Live processes of the last pass, sorted if [`Sampler::sort`] ran after
    /// it, in pid order otherwise.
    pub fn iter(&mut self) -> ProcessIter<'_> {
        self.table.iter(self.pass)
    }

    /// Runs one sampling pass.
    #[instrument(skip(self))]
    pub fn sample(
        &mut self,
        collect_regions: bool,
        collect_frameworks: bool,
    ) -> Result<(), SampleError> {
        self.pass += 1;
        self.global.seq = self.pass;
        self.phase = SamplePhase::Idle;
        self.ledger.clear();
        self.frameworks.clear();

        match self.run_phases(collect_regions, collect_frameworks) {
            Ok(()) => {
                self.phase = SamplePhase::Complete;
                info!(
                    pass = self.pass,
                    processes = self.global.processes,
                    threads = self.global.threads,
                    running = self.global.running_threads,
                    "sample complete"
                );
                Ok(())
            }
            Err(e) => {
                warn!(phase = %e.phase, error = %e.source, "sample aborted");
                self.phase = SamplePhase::Failed;
                Err(e)
            }
        }
    }

    fn run_phases(
        &mut self,
        collect_regions: bool,
        collect_frameworks: bool,
    ) -> Result<(), SampleError> {
        Epoch::record(&mut self.global.time, Utc::now());
        self.phase = SamplePhase::TimestampCaptured;

        let plan = PassPlan {
            collect_regions,
            poll_frameworks: collect_frameworks
                && (self.global.framework.is_none()
                    || (self.pass - 1) % u64::from(self.framework_interval) == 0),
        };

        self.enumerate(plan)
            .map_err(failed(SamplePhase::ProcessesEnumerated))?;
        self.phase = SamplePhase::ProcessesEnumerated;

        self.global.load = self
            .platform
            .load_average()
            .map_err(failed(SamplePhase::LoadAvgUpdated))?;
        self.phase = SamplePhase::LoadAvgUpdated;

        let ticks = self
            .platform
            .host_cpu_ticks()
            .map_err(failed(SamplePhase::CpuTicksUpdated))?;
        Epoch::record(&mut self.global.cpu, ticks);
        if let Some(cpu) = &self.global.cpu {
            self.global.cpu_percent.update(cpu);
        }
        self.phase = SamplePhase::CpuTicksUpdated;

        if !collect_frameworks {
            self.global.framework = None;
        } else if plan.poll_frameworks {
            self.global.framework = Some(self.frameworks.totals());
            self.phase = SamplePhase::FrameworkSampled;
        }

        let vm = self
            .platform
            .vm_statistics()
            .map_err(failed(SamplePhase::VmStatsUpdated))?;
        let swap = self
            .platform
            .swap_usage()
            .map_err(failed(SamplePhase::VmStatsUpdated))?;
        self.global.vm = Some(match self.global.vm {
            Some(mut sampled) => {
                sampled.advance(vm);
                sampled
            }
            None => Sampled::new(vm),
        });
        self.global.swap = swap;
        self.phase = SamplePhase::VmStatsUpdated;

        let net = self
            .platform
            .network_counters()
            .map_err(failed(SamplePhase::NetworkSampled))?;
        Epoch::record(&mut self.global.net, net);
        self.phase = SamplePhase::NetworkSampled;

        let disk = self
            .platform
            .disk_counters()
            .map_err(failed(SamplePhase::DiskSampled))?;
        Epoch::record(&mut self.global.disk, disk);
        self.phase = SamplePhase::DiskSampled;

        Ok(())
    }

    /// Walks every processor group and task, then aggregates live records.
    fn enumerate(&mut self, plan: PassPlan) -> Result<(), PlatformError> {
        let groups = self.platform.processor_groups()?;

        for group in groups {
            let tasks = match self.platform.group_tasks(group) {
                Ok(tasks) => tasks,
                Err(e) => {
                    debug!(group, error = %e, "skipping processor group");
                    continue;
                }
            };

            for task in tasks {
                self.sample_task(task, plan);
            }
        }

        self.aggregate();
        Ok(())
    }

    fn sample_task(&mut self, task: TaskHandle, plan: PassPlan) {
        let pid = match self.platform.task_pid(task) {
            Ok(pid) => pid,
            Err(e) => {
                debug!(task = task.0, error = %e, "task exited before sampling");
                return;
            }
        };

        if let Err(e) = self.update_task(pid, plan) {
            debug!(pid, error = %e, "dropping process");
            self.table.destroy(pid);
        }
    }

    fn update_task(&mut self, pid: u32, plan: PassPlan) -> Result<(), PlatformError> {
        let pass = self.pass;
        let window = self.platform.shared_region();
        let page_size = self.platform.page_size();
        let (record, _) = self.table.find_or_create(pid);
        let first = record.samples == 0;

        record.set_identity(self.platform.task_identity(pid)?);
        record.arch = self.platform.task_arch(pid)?;
        let info = self.platform.task_info(pid)?;
        let threads = self.platform.task_threads(pid)?;

        let wanted = record.region_override.unwrap_or(plan.collect_regions);
        let implausible = !plan.collect_regions
            && record.region_override.is_none()
            && record.shared_segments_mapped
            && window.is_some_and(|w| record.memory.now.virtual_size <= w.size());
        let framework_poll = plan.poll_frameworks
            && record.shared_segments_mapped
            && record.region_override != Some(false);

        let mut figures = record.memory.now;
        if first || wanted || implausible || framework_poll {
            match self.platform.task_regions(pid) {
                Ok(regions) => {
                    let mut accountant = RegionAccountant::new(
                        &mut self.ledger,
                        &mut self.frameworks,
                        window,
                        page_size,
                    );
                    let scan = accountant.walk(pid, regions);
                    figures.apply_regions(&scan.totals);
                    record.shared_segments_mapped = scan.totals.shared_segments_mapped;
                }
                Err(e) => debug!(pid, error = %e, "region walk unavailable"),
            }
        }

        figures.resident = info.resident_size;
        figures.virtual_size = match window {
            Some(w) if record.shared_segments_mapped && info.virtual_size > w.size() => {
                info.virtual_size - w.size()
            }
            _ => info.virtual_size,
        };
        record.memory.observe(figures, first);

        let running = threads
            .iter()
            .filter(|t| t.run_state == ThreadRunState::Running)
            .count() as u32;
        record.threads.observe(threads.len() as u32, first);
        record.running_threads.observe(running, first);
        record.run_state = RunState::classify(&threads);

        record.observe_cpu_time(info.user_time + info.system_time);
        record.counters.update(&info.counters);
        record.ports.observe(info.port_count, first);
        record.kernel_alloc_bytes.observe(info.kernel_alloc_bytes, first);
        record.kernel_free_bytes.observe(info.kernel_free_bytes, first);
        record.workqueue.observe(info.workqueue, first);

        record.mark_updated(pass);
        Ok(())
    }

    /// Sums memory, thread and state figures over the records updated in
    /// this pass.
    fn aggregate(&mut self) {
        let mut memory = MemoryTotals::default();
        let mut states = StateHistogram::default();
        let mut processes = 0u32;
        let mut threads = 0u32;
        let mut running = 0u32;

        for record in self.table.records().filter(|r| r.is_live(self.pass)) {
            let m = &record.memory.now;
            memory.regions += u64::from(m.regions);
            memory.resident += m.resident;
            memory.virtual_size += m.virtual_size;
            memory.private_resident += m.private_resident;
            memory.private_virtual += m.private_virtual;
            memory.shared_resident += m.shared_resident;
            memory.aliased += m.aliased;

            states.add(record.run_state);
            processes += 1;
            threads += record.threads.now;
            running += record.running_threads.now;
        }

        self.global.memory = memory;
        self.global.states = states;
        self.global.processes = processes;
        self.global.threads = threads;
        self.global.running_threads = running;

        debug!(
            processes,
            shared_objects = self.ledger.len(),
            shared_bytes = self.ledger.shared_resident_bytes(),
            "aggregated process figures"
        );
    }
}

impl<P: Platform> fmt::Debug for Sampler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sampler")
            .field("pass", &self.pass)
            .field("phase", &self.phase)
            .field("processes", &self.table.len())
            .field("framework_interval", &self.framework_interval)
            .finish()
    }
}
