//! Sampled values and the host-wide snapshot.
//!
//! Figures are kept with enough history to support the three display modes of
//! a top-style monitor: absolute (`now`), delta since the previous pass and
//! accumulated since the first pass (`began`).

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

use crate::accumulator::Accumulator;
use crate::memory::FrameworkTotals;
use crate::platform::{
    CpuTicks, DiskCounters, LoadAverage, NetCounters, SwapUsage, VmStatistics,
};
use crate::process::RunState;

/// A value with its first, previous and current observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Epoch<T> {
    pub began: T,
    pub previous: T,
    pub now: T,
}

impl<T: Copy> Epoch<T> {
    pub fn new(value: T) -> Self {
        Self {
            began: value,
            previous: value,
            now: value,
        }
    }

    pub fn advance(&mut self, value: T) {
        self.previous = self.now;
        self.now = value;
    }

    /// Starts the epoch on the first observation, advances it afterwards.
    pub fn record(slot: &mut Option<Epoch<T>>, value: T) {
        match slot {
            Some(epoch) => epoch.advance(value),
            None => *slot = Some(Epoch::new(value)),
        }
    }
}

/// A value with its previous observation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Sampled<T> {
    pub now: T,
    pub previous: T,
}

impl<T: Copy> Sampled<T> {
    pub fn new(value: T) -> Self {
        Self {
            now: value,
            previous: value,
        }
    }

    pub fn advance(&mut self, value: T) {
        self.previous = self.now;
        self.now = value;
    }

    /// Resets both slots on the first observation, advances afterwards.
    pub fn observe(&mut self, value: T, first: bool) {
        if first {
            *self = Sampled::new(value);
        } else {
            self.advance(value);
        }
    }
}

/// Monotonic counter rebuilt from a wrapping 32-bit kernel value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counter {
    acc: Option<Accumulator>,
    began: u64,
    previous: u64,
}

impl Counter {
    pub fn update(&mut self, raw: i32) {
        match &mut self.acc {
            Some(acc) => {
                self.previous = acc.value();
                acc.update(raw);
            }
            None => {
                let acc = Accumulator::new(raw);
                self.began = acc.value();
                self.previous = acc.value();
                self.acc = Some(acc);
            }
        }
    }

    pub fn value(&self) -> u64 {
        self.acc.map_or(0, |a| a.value())
    }

    /// Increase since the previous pass.
    pub fn delta(&self) -> u64 {
        self.value() - self.previous
    }

    /// Increase since the counter was first observed.
    pub fn since_start(&self) -> u64 {
        self.value() - self.began
    }
}

impl Serialize for Counter {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.value())
    }
}

/// Fixed-point percentage with one decimal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Percent {
    pub whole: u64,
    pub tenths: u64,
}

impl Percent {
    /// `ticks` as a share of `total`, truncated to tenths. `None` when
    /// `total` is zero.
    pub fn of(ticks: u64, total: u64) -> Option<Percent> {
        if total == 0 {
            return None;
        }
        let scaled = 100 * ticks;
        Some(Percent {
            whole: scaled / total,
            tenths: (scaled % total) * 10 / total,
        })
    }
}

impl fmt::Display for Percent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.whole, self.tenths)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CpuPercentages {
    pub user: Percent,
    pub system: Percent,
    pub idle: Percent,
}

impl CpuPercentages {
    /// Splits elapsed ticks into user (nice included), system and idle.
    pub fn from_ticks(elapsed: &CpuTicks) -> Option<CpuPercentages> {
        let total = elapsed.total();
        Some(CpuPercentages {
            user: Percent::of(elapsed.user + elapsed.nice, total)?,
            system: Percent::of(elapsed.system, total)?,
            idle: Percent::of(elapsed.idle, total)?,
        })
    }

    /// Recomputes from the ticks elapsed between two observations; a zero
    /// tick interval keeps the current values.
    pub fn update(&mut self, ticks: &Epoch<CpuTicks>) {
        if let Some(p) = Self::from_ticks(&ticks.now.since(&ticks.previous)) {
            *self = p;
        }
    }
}

/// Memory totals summed over live processes, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryTotals {
    pub regions: u64,
    pub resident: u64,
    pub virtual_size: u64,
    pub private_resident: u64,
    pub private_virtual: u64,
    pub shared_resident: u64,
    pub aliased: u64,
}

/// Number of processes per run state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateHistogram {
    counts: [u32; RunState::COUNT],
}

impl StateHistogram {
    pub fn add(&mut self, state: RunState) {
        self.counts[state.index()] += 1;
    }

    pub fn get(&self, state: RunState) -> u32 {
        self.counts[state.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (RunState, u32)> + '_ {
        RunState::ALL.iter().map(|s| (*s, self.get(*s)))
    }

    pub fn total(&self) -> u32 {
        self.counts.iter().sum()
    }
}

/// Host-wide snapshot of the most recent pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GlobalSample {
    pub seq: u64,
    pub time: Option<Epoch<DateTime<Utc>>>,
    pub cpu: Option<Epoch<CpuTicks>>,
    pub cpu_percent: CpuPercentages,
    pub load: LoadAverage,
    pub vm: Option<Sampled<VmStatistics>>,
    pub swap: Option<SwapUsage>,
    pub memory: MemoryTotals,
    /// Present when framework collection is enabled.
    pub framework: Option<FrameworkTotals>,
    pub states: StateHistogram,
    pub processes: u32,
    pub threads: u32,
    pub running_threads: u32,
    pub net: Option<Epoch<NetCounters>>,
    pub disk: Option<Epoch<DiskCounters>>,
}
