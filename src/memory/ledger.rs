//! Pass-scoped ledger of shared memory objects.
//!
//! A process can map the same memory object through several regions (a
//! library split by `mprotect`, a shared buffer mapped twice). Charging every
//! region separately would count the object's resident pages once per
//! fragment. The ledger records one entry per object; a process's shared and
//! aliased bytes are then reduced from the entries it touched during its
//! walk, so each object contributes exactly once no matter how fragmented the
//! mapping is.
//!
//! An object is reclassified as private-aliased when every reference to it
//! belongs to the walking process (`proc_ref_count == ref_count`). Every
//! mapping holds its own reference, so an object split into two fragments
//! reports one more reference than the same object mapped whole.

use ahash::{AHashMap as HashMap, AHashSet as HashSet};

use crate::platform::{ObjectId, RegionInfo, SharingClass};

/// Ledger record for one memory object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Pid of the process that visited the object most recently.
    pub owner: u32,
    /// Sharing class as reported by the last visit.
    pub sharing: SharingClass,
    pub resident_pages: u64,
    /// Host-wide reference count reported for the object.
    pub ref_count: u32,
    /// References seen from `owner` during its current walk.
    pub proc_ref_count: u32,
    pub size: u64,
}

impl LedgerEntry {
    /// Class after applying the aliasing rule.
    pub fn effective_sharing(&self) -> SharingClass {
        if self.sharing == SharingClass::SharedTrue && self.proc_ref_count == self.ref_count {
            SharingClass::PrivateAliased
        } else {
            self.sharing
        }
    }
}

/// Bytes one process is charged for the shared objects it touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SharedContribution {
    pub shared_resident: u64,
    pub aliased: u64,
    pub private_virtual: u64,
}

/// Objects visited by one process during one walk.
#[derive(Debug)]
pub struct ObjectWalk {
    pid: u32,
    touched: Vec<ObjectId>,
    seen: HashSet<ObjectId>,
}

impl ObjectWalk {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Distinct objects touched so far.
    pub fn objects(&self) -> &[ObjectId] {
        &self.touched
    }
}

#[derive(Debug, Default)]
pub struct ObjectLedger {
    entries: HashMap<ObjectId, LedgerEntry>,
    page_size: u64,
}

impl ObjectLedger {
    pub fn new(page_size: u64) -> Self {
        Self {
            entries: HashMap::new(),
            page_size,
        }
    }

    /// Forgets every object; called at the start of a sampling pass.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, object: &ObjectId) -> Option<&LedgerEntry> {
        self.entries.get(object)
    }

    pub fn begin_walk(&self, pid: u32) -> ObjectWalk {
        ObjectWalk {
            pid,
            touched: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Records one region's reference to its backing object.
    ///
    /// A visit from a process other than the entry's owner starts a fresh
    /// count for that process; repeated visits from the same walk bump
    /// `proc_ref_count` and replace the page figures with the latest ones.
    pub fn visit(&mut self, walk: &mut ObjectWalk, region: &RegionInfo) {
        let pid = walk.pid;
        let first_in_walk = walk.seen.insert(region.object);
        if first_in_walk {
            walk.touched.push(region.object);
        }

        let entry = self
            .entries
            .entry(region.object)
            .or_insert_with(|| LedgerEntry {
                owner: pid,
                sharing: region.sharing,
                resident_pages: region.resident_pages,
                ref_count: region.ref_count,
                proc_ref_count: 0,
                size: region.size,
            });

        if entry.owner != pid || first_in_walk {
            entry.owner = pid;
            entry.proc_ref_count = 1;
        } else {
            entry.proc_ref_count += 1;
        }

        entry.sharing = region.sharing;
        entry.resident_pages = region.resident_pages;
        entry.ref_count = region.ref_count;
        entry.size = region.size;
    }

    /// Reduces the walk's objects into byte totals.
    pub fn settle(&self, walk: &ObjectWalk) -> SharedContribution {
        let mut out = SharedContribution::default();
        for object in &walk.touched {
            let Some(entry) = self.entries.get(object) else {
                continue;
            };
            if entry.owner != walk.pid {
                continue;
            }
            let bytes = entry.resident_pages * self.page_size;
            match entry.effective_sharing() {
                SharingClass::PrivateAliased => {
                    out.aliased += bytes;
                    out.private_virtual += bytes;
                }
                _ => out.shared_resident += bytes,
            }
        }
        out
    }

    /// Resident bytes of objects still genuinely shared, each counted once.
    pub fn shared_resident_bytes(&self) -> u64 {
        self.entries
            .values()
            .filter(|e| e.effective_sharing() != SharingClass::PrivateAliased)
            .map(|e| e.resident_pages * self.page_size)
            .sum()
    }
}
