//! Persistent table of process records.
//!
//! Records live in a pid-ordered map for the lifetime of the process. A sorted
//! view (a list of pids) is rebuilt whenever the caller resorts; records that
//! were not updated in the current pass are dropped at that point, or on a
//! plain pid-order iteration when no resort happened this pass.

use std::cmp::Ordering;
use std::collections::{btree_map, BTreeMap};

use super::record::ProcessRecord;

#[derive(Debug, Default)]
pub struct ProcessTable {
    records: BTreeMap<u32, ProcessRecord>,
    sorted: Vec<u32>,
    /// Pass the sorted view was built for.
    sorted_pass: Option<u64>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for `pid`, creating a blank one if needed. The flag
    /// is true when the record was created by this call.
    pub fn find_or_create(&mut self, pid: u32) -> (&mut ProcessRecord, bool) {
        match self.records.entry(pid) {
            btree_map::Entry::Occupied(e) => (e.into_mut(), false),
            btree_map::Entry::Vacant(e) => (e.insert(ProcessRecord::new(pid)), true),
        }
    }

    pub fn get(&self, pid: u32) -> Option<&ProcessRecord> {
        self.records.get(&pid)
    }

    pub fn get_mut(&mut self, pid: u32) -> Option<&mut ProcessRecord> {
        self.records.get_mut(&pid)
    }

    pub fn destroy(&mut self, pid: u32) -> Option<ProcessRecord> {
        self.sorted.retain(|p| *p != pid);
        self.records.remove(&pid)
    }

    /// Number of records, live or not.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of records updated in `pass`.
    pub fn live_count(&self, pass: u64) -> usize {
        self.records.values().filter(|r| r.is_live(pass)).count()
    }

    /// Records in pid order, without pruning.
    pub fn records(&self) -> btree_map::Values<'_, u32, ProcessRecord> {
        self.records.values()
    }

    /// Drops every record not updated in `pass`; returns how many went.
    pub fn prune(&mut self, pass: u64) -> usize {
        let before = self.records.len();
        self.records.retain(|_, r| r.is_live(pass));
        before - self.records.len()
    }

    /// Prunes stale records and rebuilds the sorted view with `compare`.
    pub fn resort<F>(&mut self, pass: u64, mut compare: F)
    where
        F: FnMut(&ProcessRecord, &ProcessRecord) -> Ordering,
    {
        self.prune(pass);
        let mut live: Vec<&ProcessRecord> = self.records.values().collect();
        live.sort_by(|a, b| compare(a, b));
        self.sorted = live.iter().map(|r| r.pid).collect();
        self.sorted_pass = Some(pass);
    }

    /// Iterates live records: in sorted order when `resort` ran for `pass`,
    /// otherwise in pid order after pruning stale records.
    pub fn iter(&mut self, pass: u64) -> ProcessIter<'_> {
        if self.sorted_pass == Some(pass) {
            ProcessIter::Sorted {
                pids: self.sorted.iter(),
                records: &self.records,
            }
        } else {
            self.prune(pass);
            ProcessIter::PidOrder(self.records.values())
        }
    }
}

/// Iterator over the live records of a [`ProcessTable`].
pub enum ProcessIter<'a> {
    Sorted {
        pids: std::slice::Iter<'a, u32>,
        records: &'a BTreeMap<u32, ProcessRecord>,
    },
    PidOrder(btree_map::Values<'a, u32, ProcessRecord>),
}

impl<'a> Iterator for ProcessIter<'a> {
    type Item = &'a ProcessRecord;

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            ProcessIter::Sorted { pids, records } => {
                let records: &'a BTreeMap<u32, ProcessRecord> = *records;
                for pid in pids.by_ref() {
                    if let Some(r) = records.get(pid) {
                        return Some(r);
                    }
                }
                None
            }
            ProcessIter::PidOrder(values) => values.next(),
        }
    }
}
