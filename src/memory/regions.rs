//! Per-process VM region accounting.
//!
//! [`RegionAccountant::walk`] consumes one task's regions in address order and
//! produces its private, shared, aliased and empty figures. Regions inside the
//! platform-shared window are tallied host wide in a [`FrameworkTally`]
//! instead of being charged to the process.

use ahash::AHashSet as HashSet;
use serde::Serialize;
use tracing::debug;

use super::ledger::ObjectLedger;
use crate::platform::{AddressWindow, ObjectId, PlatformError, RegionInfo, SharingClass};

/// Memory figures produced by one region walk, in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RegionTotals {
    /// Regions seen outside the shared window.
    pub regions: u32,
    pub private_resident: u64,
    pub private_virtual: u64,
    pub shared_resident: u64,
    pub aliased: u64,
    pub empty: u64,
    /// Private copy-on-write bytes inside the shared window.
    pub framework_private: u64,
    pub shared_segments_mapped: bool,
}

/// Host-wide totals of the platform-shared library region.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FrameworkTotals {
    pub resident_code: u64,
    pub resident_data: u64,
    pub resident_linkedit: u64,
    pub virtual_size: u64,
    pub regions: u32,
}

/// Shared-window regions accumulated over one pass, each object once.
#[derive(Debug, Default)]
pub struct FrameworkTally {
    seen: HashSet<ObjectId>,
    totals: FrameworkTotals,
}

impl FrameworkTally {
    pub fn clear(&mut self) {
        self.seen.clear();
        self.totals = FrameworkTotals::default();
    }

    pub fn totals(&self) -> FrameworkTotals {
        self.totals
    }

    fn add(&mut self, region: &RegionInfo, page_size: u64) {
        if !self.seen.insert(region.object) {
            return;
        }
        let resident = region.resident_pages * page_size;
        if region.protection.execute {
            self.totals.resident_code += resident;
        } else if region.protection.write {
            self.totals.resident_data += resident;
        } else {
            self.totals.resident_linkedit += resident;
        }
        self.totals.virtual_size += region.size;
        self.totals.regions += 1;
    }
}

/// Outcome of a region walk. `error` is set when the walk stopped early;
/// `totals` then covers the regions read before the failure.
#[derive(Debug)]
pub struct RegionScan {
    pub totals: RegionTotals,
    pub error: Option<PlatformError>,
}

pub struct RegionAccountant<'a> {
    ledger: &'a mut ObjectLedger,
    frameworks: &'a mut FrameworkTally,
    window: Option<AddressWindow>,
    page_size: u64,
}

impl<'a> RegionAccountant<'a> {
    pub fn new(
        ledger: &'a mut ObjectLedger,
        frameworks: &'a mut FrameworkTally,
        window: Option<AddressWindow>,
        page_size: u64,
    ) -> Self {
        Self {
            ledger,
            frameworks,
            window,
            page_size,
        }
    }

    /// Classifies every region of `pid` and settles its ledger contribution.
    pub fn walk<I>(&mut self, pid: u32, regions: I) -> RegionScan
    where
        I: IntoIterator<Item = Result<RegionInfo, PlatformError>>,
    {
        let ps = self.page_size;
        let mut totals = RegionTotals::default();
        let mut walk = self.ledger.begin_walk(pid);
        let mut error = None;

        for item in regions {
            let region = match item {
                Ok(r) => r,
                Err(e) => {
                    debug!(pid, error = %e, "region walk stopped early");
                    error = Some(e);
                    break;
                }
            };

            if self.window.is_some_and(|w| w.contains(region.start)) {
                self.frameworks.add(&region, ps);
                if region.sharing == SharingClass::CopyOnWrite {
                    let private = region.private_resident_pages * ps;
                    totals.private_resident += private;
                    totals.private_virtual += private;
                    totals.framework_private += private;
                }
                totals.shared_segments_mapped = true;
                continue;
            }

            totals.regions += 1;

            let sharing = match region.sharing {
                SharingClass::CopyOnWrite if region.ref_count == 1 => SharingClass::Private,
                other => other,
            };

            match sharing {
                SharingClass::Private | SharingClass::LargePage | SharingClass::PrivateAliased => {
                    totals.private_resident += region.private_resident_pages * ps;
                    totals.private_virtual += region.size;
                }
                SharingClass::Empty => {
                    totals.empty += region.size;
                }
                SharingClass::CopyOnWrite => {
                    let private = region.private_resident_pages * ps;
                    totals.private_resident += private;
                    totals.private_virtual += private;
                    self.ledger.visit(&mut walk, &region);
                }
                SharingClass::SharedTrue => {
                    self.ledger.visit(&mut walk, &region);
                }
            }
        }

        let shared = self.ledger.settle(&walk);
        totals.shared_resident += shared.shared_resident;
        totals.aliased += shared.aliased;
        totals.private_virtual += shared.private_virtual;

        RegionScan { totals, error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Protection;

    const PAGE: u64 = 4096;

    fn region(start: u64, object: u64, sharing: SharingClass) -> RegionInfo {
        RegionInfo {
            start,
            size: 16 * PAGE,
            object: ObjectId::Object(object),
            sharing,
            ref_count: 2,
            resident_pages: 8,
            private_resident_pages: 4,
            protection: Protection {
                read: true,
                write: false,
                execute: false,
            },
        }
    }

    fn walk(
        regions: Vec<Result<RegionInfo, PlatformError>>,
        window: Option<AddressWindow>,
    ) -> (RegionScan, FrameworkTally) {
        let mut ledger = ObjectLedger::new(PAGE);
        let mut tally = FrameworkTally::default();
        let scan = RegionAccountant::new(&mut ledger, &mut tally, window, PAGE).walk(1, regions);
        (scan, tally)
    }

    // -------------------------------------------------------------------------
    // Tests for classification outside the shared window
    // -------------------------------------------------------------------------

    #[test]
    fn test_private_and_empty_regions() {
        let (scan, _) = walk(
            vec![
                Ok(region(0x1000_0000, 1, SharingClass::Private)),
                Ok(region(0x2000_0000, 2, SharingClass::LargePage)),
                Ok(region(0x3000_0000, 3, SharingClass::Empty)),
            ],
            None,
        );
        let t = scan.totals;
        assert!(scan.error.is_none());
        assert_eq!(t.regions, 3);
        assert_eq!(t.private_resident, 8 * PAGE);
        assert_eq!(t.private_virtual, 32 * PAGE);
        assert_eq!(t.empty, 16 * PAGE);
        assert_eq!(t.shared_resident, 0);
        assert!(!t.shared_segments_mapped);
    }

    #[test]
    fn test_copy_on_write_adds_private_and_shared() {
        let (scan, _) = walk(vec![Ok(region(0x1000_0000, 1, SharingClass::CopyOnWrite))], None);
        let t = scan.totals;
        assert_eq!(t.private_resident, 4 * PAGE);
        assert_eq!(t.private_virtual, 4 * PAGE);
        assert_eq!(t.shared_resident, 8 * PAGE);
    }

    #[test]
    fn test_single_reference_copy_on_write_is_private() {
        let mut r = region(0x1000_0000, 1, SharingClass::CopyOnWrite);
        r.ref_count = 1;
        let (scan, _) = walk(vec![Ok(r)], None);
        assert_eq!(scan.totals.shared_resident, 0);
        assert_eq!(scan.totals.private_virtual, 16 * PAGE);
    }

    #[test]
    fn test_shared_object_fragments_counted_once() {
        let mut a = region(0x1000_0000, 7, SharingClass::SharedTrue);
        a.resident_pages = 100;
        a.ref_count = 3;
        let mut b = a;
        b.start = 0x1001_0000;
        let (scan, _) = walk(vec![Ok(a), Ok(b)], None);
        assert_eq!(scan.totals.shared_resident, 100 * PAGE);
        assert_eq!(scan.totals.regions, 2);
    }

    #[test]
    fn test_fragments_match_whole_mapping_when_all_references_local() {
        let mut a = region(0x1000_0000, 7, SharingClass::SharedTrue);
        a.resident_pages = 100;
        a.size = 60 * PAGE;
        let mut b = a;
        b.start = 0x1003_c000;
        b.size = 40 * PAGE;
        let (fragmented, _) = walk(vec![Ok(a), Ok(b)], None);

        let mut whole = a;
        whole.size = 100 * PAGE;
        whole.ref_count = 1;
        let (single, _) = walk(vec![Ok(whole)], None);

        let f = fragmented.totals;
        let s = single.totals;
        assert_eq!(f.shared_resident, 0);
        assert_eq!(f.aliased, 100 * PAGE);
        assert_eq!(f.aliased, s.aliased);
        assert_eq!(f.shared_resident, s.shared_resident);
        assert_eq!(f.private_virtual, s.private_virtual);
    }

    #[test]
    fn test_failed_walk_keeps_partial_totals() {
        let (scan, _) = walk(
            vec![
                Ok(region(0x1000_0000, 1, SharingClass::Private)),
                Err(PlatformError::Exited(1)),
                Ok(region(0x2000_0000, 2, SharingClass::Private)),
            ],
            None,
        );
        assert!(matches!(scan.error, Some(PlatformError::Exited(1))));
        assert_eq!(scan.totals.regions, 1);
        assert_eq!(scan.totals.private_resident, 4 * PAGE);
    }

    // -------------------------------------------------------------------------
    // Tests for the shared window
    // -------------------------------------------------------------------------

    #[test]
    fn test_shared_window_goes_to_framework_totals() {
        let window = AddressWindow {
            start: 0x9000_0000,
            end: 0xa000_0000,
        };
        let mut code = region(0x9000_0000, 10, SharingClass::SharedTrue);
        code.protection.execute = true;
        let mut data = region(0x9100_0000, 11, SharingClass::CopyOnWrite);
        data.protection.write = true;
        let linkedit = region(0x9200_0000, 12, SharingClass::SharedTrue);
        // Second mapping of the code object is not tallied again
        let mut code_again = code;
        code_again.start = 0x9300_0000;

        let (scan, tally) = walk(
            vec![
                Ok(region(0x1000_0000, 1, SharingClass::Private)),
                Ok(code),
                Ok(data),
                Ok(linkedit),
                Ok(code_again),
            ],
            Some(window),
        );

        let t = scan.totals;
        assert!(t.shared_segments_mapped);
        assert_eq!(t.regions, 1);
        assert_eq!(t.framework_private, 4 * PAGE);
        assert_eq!(t.private_resident, 8 * PAGE);
        assert_eq!(t.shared_resident, 0);

        let f = tally.totals();
        assert_eq!(f.resident_code, 8 * PAGE);
        assert_eq!(f.resident_data, 8 * PAGE);
        assert_eq!(f.resident_linkedit, 8 * PAGE);
        assert_eq!(f.virtual_size, 48 * PAGE);
        assert_eq!(f.regions, 3);
    }
}
