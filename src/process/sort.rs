//! Two-level process ordering.
//!
//! Sort keys are written as a field name with an optional `+` (ascending) or
//! `-` (descending) prefix, e.g. `-cpu` or `+pid`. Without a prefix the
//! field's natural order applies: descending for resource figures, ascending
//! for identifiers and names.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::record::ProcessRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    Pid,
    Command,
    /// CPU time since the previous pass.
    Cpu,
    /// Total CPU time.
    Time,
    Resident,
    Virtual,
    PrivateResident,
    SharedResident,
    Threads,
    Ports,
    Faults,
    ContextSwitches,
    State,
    Uid,
    StartTime,
}

impl SortField {
    pub const ALL: [SortField; 15] = [
        SortField::Pid,
        SortField::Command,
        SortField::Cpu,
        SortField::Time,
        SortField::Resident,
        SortField::Virtual,
        SortField::PrivateResident,
        SortField::SharedResident,
        SortField::Threads,
        SortField::Ports,
        SortField::Faults,
        SortField::ContextSwitches,
        SortField::State,
        SortField::Uid,
        SortField::StartTime,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SortField::Pid => "pid",
            SortField::Command => "command",
            SortField::Cpu => "cpu",
            SortField::Time => "time",
            SortField::Resident => "rsize",
            SortField::Virtual => "vsize",
            SortField::PrivateResident => "rprvt",
            SortField::SharedResident => "rshrd",
            SortField::Threads => "th",
            SortField::Ports => "ports",
            SortField::Faults => "faults",
            SortField::ContextSwitches => "csw",
            SortField::State => "state",
            SortField::Uid => "uid",
            SortField::StartTime => "start",
        }
    }

    /// Order used when a key carries no explicit direction.
    pub fn natural_order(self) -> Order {
        match self {
            SortField::Pid | SortField::Command | SortField::State | SortField::Uid | SortField::StartTime => {
                Order::Ascending
            }
            _ => Order::Descending,
        }
    }

    /// Compares two records on this field, ascending.
    pub fn compare(self, a: &ProcessRecord, b: &ProcessRecord) -> Ordering {
        match self {
            SortField::Pid => a.pid.cmp(&b.pid),
            SortField::Command => a.command.cmp(&b.command),
            SortField::Cpu => a.cpu_delta().cmp(&b.cpu_delta()),
            SortField::Time => a.cpu_total().cmp(&b.cpu_total()),
            SortField::Resident => a.memory.now.resident.cmp(&b.memory.now.resident),
            SortField::Virtual => a.memory.now.virtual_size.cmp(&b.memory.now.virtual_size),
            SortField::PrivateResident => a
                .memory
                .now
                .private_resident
                .cmp(&b.memory.now.private_resident),
            SortField::SharedResident => a
                .memory
                .now
                .shared_resident
                .cmp(&b.memory.now.shared_resident),
            SortField::Threads => a.threads.now.cmp(&b.threads.now),
            SortField::Ports => a.ports.now.cmp(&b.ports.now),
            SortField::Faults => a.counters.faults.value().cmp(&b.counters.faults.value()),
            SortField::ContextSwitches => a
                .counters
                .context_switches
                .value()
                .cmp(&b.counters.context_switches.value()),
            SortField::State => a.run_state.cmp(&b.run_state),
            SortField::Uid => a.uid.cmp(&b.uid),
            SortField::StartTime => a.start_time.cmp(&b.start_time),
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        let field = match name.as_str() {
            "mem" | "rss" => Some(SortField::Resident),
            "threads" => Some(SortField::Threads),
            "command" | "comm" => Some(SortField::Command),
            _ => SortField::ALL.iter().copied().find(|f| f.name() == name),
        };
        field.ok_or_else(|| format!("unknown sort field '{}'", s.trim()))
    }
}

impl fmt::Display for SortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Order {
    Ascending,
    Descending,
}

impl Order {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Order::Ascending => ordering,
            Order::Descending => ordering.reverse(),
        }
    }
}

/// One field with its direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub field: SortField,
    pub order: Order,
}

impl SortSpec {
    pub fn new(field: SortField, order: Order) -> Self {
        Self { field, order }
    }
}

impl FromStr for SortSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (order, name) = if let Some(rest) = s.strip_prefix('+') {
            (Some(Order::Ascending), rest)
        } else if let Some(rest) = s.strip_prefix('-') {
            (Some(Order::Descending), rest)
        } else {
            (None, s)
        };
        let field: SortField = name.parse()?;
        Ok(SortSpec::new(field, order.unwrap_or_else(|| field.natural_order())))
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = match self.order {
            Order::Ascending => '+',
            Order::Descending => '-',
        };
        write!(f, "{}{}", sign, self.field)
    }
}

/// Primary and secondary comparison for the sorted view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub primary: SortSpec,
    pub secondary: SortSpec,
}

impl SortKey {
    pub fn new(primary: SortSpec, secondary: SortSpec) -> Self {
        Self { primary, secondary }
    }

    pub fn parse(primary: &str, secondary: &str) -> Result<Self, String> {
        Ok(Self::new(primary.parse()?, secondary.parse()?))
    }

    pub fn compare(&self, a: &ProcessRecord, b: &ProcessRecord) -> Ordering {
        self.primary
            .order
            .apply(self.primary.field.compare(a, b))
            .then_with(|| self.secondary.order.apply(self.secondary.field.compare(a, b)))
    }
}

impl Default for SortKey {
    fn default() -> Self {
        Self::new(
            SortSpec::new(SortField::Cpu, Order::Descending),
            SortSpec::new(SortField::Pid, Order::Ascending),
        )
    }
}
