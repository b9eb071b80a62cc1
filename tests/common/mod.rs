//! Scriptable in-memory platform for driving the sampler in tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use herakles_sampler::platform::{
    AddressWindow, Arch, CpuTicks, DiskCounters, GroupId, LoadAverage, NetCounters, ObjectId,
    Platform, PlatformError, Protection, RawCounters, RegionInfo, RegionIter, SharingClass,
    SwapUsage, TaskHandle, TaskIdentity, TaskInfo, ThreadInfo, ThreadRunState, VmStatistics,
};

pub const PAGE: u64 = 4096;

/// Host query made to fail by [`FakePlatform::fail_host`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostQuery {
    Groups,
    Load,
    Cpu,
    Vm,
    Net,
    Disk,
}

#[derive(Debug, Clone)]
pub struct FakeTask {
    pub pid: u32,
    pub group: GroupId,
    pub command: String,
    pub uid: u32,
    pub info: TaskInfo,
    pub threads: Vec<ThreadInfo>,
    pub regions: Vec<RegionInfo>,
    /// Fail the region walk after this many regions.
    pub regions_fail_after: Option<usize>,
    pub exited: bool,
    pub fail_arch: bool,
    pub fail_info: bool,
}

impl FakeTask {
    pub fn new(pid: u32) -> Self {
        Self {
            pid,
            group: 0,
            command: format!("proc{}", pid),
            uid: 0,
            info: TaskInfo {
                resident_size: 4 * PAGE,
                virtual_size: 64 * PAGE,
                ..Default::default()
            },
            threads: vec![ThreadInfo {
                run_state: ThreadRunState::Waiting,
                sleep_time: 0,
            }],
            regions: Vec::new(),
            regions_fail_after: None,
            exited: false,
            fail_arch: false,
            fail_info: false,
        }
    }
}

#[derive(Debug)]
pub struct FakePlatform {
    pub window: Option<AddressWindow>,
    pub tasks: BTreeMap<u64, FakeTask>,
    pub ticks: CpuTicks,
    pub load: LoadAverage,
    pub vm: VmStatistics,
    pub swap: Option<SwapUsage>,
    pub net: NetCounters,
    pub disk: DiskCounters,
    pub failing: Option<HostQuery>,
    /// Pids whose regions were walked, in call order.
    pub region_walks: RefCell<Vec<u32>>,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            window: None,
            tasks: BTreeMap::new(),
            ticks: CpuTicks::default(),
            load: LoadAverage::default(),
            vm: VmStatistics::default(),
            swap: None,
            net: NetCounters::default(),
            disk: DiskCounters::default(),
            failing: None,
            region_walks: RefCell::new(Vec::new()),
        }
    }

    pub fn with_tasks(pids: &[u32]) -> Self {
        let mut platform = Self::new();
        for pid in pids {
            platform.add(FakeTask::new(*pid));
        }
        platform
    }

    /// Adds a task; its handle is the pid.
    pub fn add(&mut self, task: FakeTask) {
        self.tasks.insert(u64::from(task.pid), task);
    }

    pub fn remove(&mut self, pid: u32) {
        self.tasks.remove(&u64::from(pid));
    }

    pub fn task_mut(&mut self, pid: u32) -> &mut FakeTask {
        self.tasks
            .get_mut(&u64::from(pid))
            .expect("task should exist")
    }

    pub fn fail_host(&mut self, query: Option<HostQuery>) {
        self.failing = query;
    }

    pub fn take_region_walks(&self) -> Vec<u32> {
        std::mem::take(&mut *self.region_walks.borrow_mut())
    }

    fn task(&self, pid: u32) -> Result<&FakeTask, PlatformError> {
        match self.tasks.get(&u64::from(pid)) {
            Some(t) if !t.exited => Ok(t),
            _ => Err(PlatformError::Exited(pid)),
        }
    }

    fn check(&self, query: HostQuery) -> Result<(), PlatformError> {
        if self.failing == Some(query) {
            Err(PlatformError::Unsupported("scripted failure"))
        } else {
            Ok(())
        }
    }
}

impl Platform for FakePlatform {
    fn page_size(&self) -> u64 {
        PAGE
    }

    fn shared_region(&self) -> Option<AddressWindow> {
        self.window
    }

    fn processor_groups(&self) -> Result<Vec<GroupId>, PlatformError> {
        self.check(HostQuery::Groups)?;
        let mut groups: Vec<GroupId> = self.tasks.values().map(|t| t.group).collect();
        groups.sort_unstable();
        groups.dedup();
        if groups.is_empty() {
            groups.push(0);
        }
        Ok(groups)
    }

    fn group_tasks(&self, group: GroupId) -> Result<Vec<TaskHandle>, PlatformError> {
        Ok(self
            .tasks
            .iter()
            .filter(|(_, t)| t.group == group)
            .map(|(handle, _)| TaskHandle(*handle))
            .collect())
    }

    fn task_pid(&self, task: TaskHandle) -> Result<u32, PlatformError> {
        match self.tasks.get(&task.0) {
            Some(t) if !t.exited => Ok(t.pid),
            _ => Err(PlatformError::Exited(task.0 as u32)),
        }
    }

    fn task_identity(&self, pid: u32) -> Result<TaskIdentity, PlatformError> {
        let t = self.task(pid)?;
        Ok(TaskIdentity {
            ppid: 1,
            pgid: pid,
            uid: t.uid,
            command: t.command.clone(),
            start_time: Utc
                .timestamp_opt(1_700_000_000 + i64::from(pid), 0)
                .single()
                .unwrap_or_default(),
        })
    }

    fn task_arch(&self, pid: u32) -> Result<Arch, PlatformError> {
        let t = self.task(pid)?;
        if t.fail_arch {
            return Err(PlatformError::Unsupported("arch"));
        }
        Ok(Arch::X86_64)
    }

    fn task_info(&self, pid: u32) -> Result<TaskInfo, PlatformError> {
        let t = self.task(pid)?;
        if t.fail_info {
            return Err(PlatformError::Exited(pid));
        }
        Ok(t.info.clone())
    }

    fn task_threads(&self, pid: u32) -> Result<Vec<ThreadInfo>, PlatformError> {
        Ok(self.task(pid)?.threads.clone())
    }

    fn task_regions(&self, pid: u32) -> Result<RegionIter<'_>, PlatformError> {
        let t = self.task(pid)?;
        self.region_walks.borrow_mut().push(pid);

        let mut items: Vec<Result<RegionInfo, PlatformError>> =
            t.regions.iter().copied().map(Ok).collect();
        if let Some(n) = t.regions_fail_after {
            items.truncate(n);
            items.push(Err(PlatformError::Exited(pid)));
        }
        Ok(Box::new(items.into_iter()))
    }

    fn host_cpu_ticks(&self) -> Result<CpuTicks, PlatformError> {
        self.check(HostQuery::Cpu)?;
        Ok(self.ticks)
    }

    fn load_average(&self) -> Result<LoadAverage, PlatformError> {
        self.check(HostQuery::Load)?;
        Ok(self.load)
    }

    fn vm_statistics(&self) -> Result<VmStatistics, PlatformError> {
        self.check(HostQuery::Vm)?;
        Ok(self.vm)
    }

    fn swap_usage(&self) -> Result<Option<SwapUsage>, PlatformError> {
        Ok(self.swap)
    }

    fn network_counters(&self) -> Result<NetCounters, PlatformError> {
        self.check(HostQuery::Net)?;
        Ok(self.net)
    }

    fn disk_counters(&self) -> Result<DiskCounters, PlatformError> {
        self.check(HostQuery::Disk)?;
        Ok(self.disk)
    }
}

/// Region backed by object `object`, `pages` resident pages of `size_pages`.
pub fn region(start: u64, object: u64, sharing: SharingClass, pages: u64, size_pages: u64) -> RegionInfo {
    RegionInfo {
        start,
        size: size_pages * PAGE,
        object: ObjectId::Object(object),
        sharing,
        ref_count: 2,
        resident_pages: pages,
        private_resident_pages: pages,
        protection: Protection {
            read: true,
            write: false,
            execute: false,
        },
    }
}

pub fn counters(faults: i32) -> RawCounters {
    RawCounters {
        faults,
        ..Default::default()
    }
}

pub fn cpu_time(ms: u64) -> Duration {
    Duration::from_millis(ms)
}
