//! VM region parsing from /proc/<pid>/smaps.
//!
//! Each smaps mapping becomes one [`RegionInfo`]. Mappings of the same file
//! (device + inode) are treated as one memory object: the object's resident
//! pages are summed over all of the task's mappings of it, and its reference
//! count is the number of those mappings plus the other processes estimated
//! from Rss/Pss.

use crate::platform::{ObjectId, Protection, RegionInfo, SharingClass};
use ahash::AHashMap as HashMap;
use std::io::BufRead;

/// One mapping of an smaps file, sizes in kB.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SmapsEntry {
    pub start: u64,
    pub end: u64,
    pub protection: Protection,
    pub shared_mapping: bool,
    pub device: u64,
    pub inode: u64,
    pub rss_kb: u64,
    pub pss_kb: u64,
    pub shared_clean_kb: u64,
    pub shared_dirty_kb: u64,
    pub private_clean_kb: u64,
    pub private_dirty_kb: u64,
    pub kernel_page_kb: u64,
}

impl SmapsEntry {
    fn object(&self) -> ObjectId {
        if self.inode != 0 {
            ObjectId::File {
                device: self.device,
                inode: self.inode,
            }
        } else {
            ObjectId::Anonymous(self.start)
        }
    }

    fn shared_kb(&self) -> u64 {
        self.shared_clean_kb + self.shared_dirty_kb
    }

    fn private_kb(&self) -> u64 {
        self.private_clean_kb + self.private_dirty_kb
    }
}

/// Parses kilobyte values from smaps field lines.
pub fn parse_kb_value(v: &str) -> Option<u64> {
    v.split_whitespace().next()?.parse().ok()
}

/// Parses a mapping header such as
/// `7f00a000-7f00b000 r-xp 00000000 08:02 1234   /usr/lib/libc.so.6`.
fn parse_header(line: &str) -> Option<SmapsEntry> {
    let mut parts = line.split_whitespace();
    let (start, end) = parts.next()?.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;

    let perms = parts.next()?.as_bytes();
    if perms.len() < 4 {
        return None;
    }
    let _offset = parts.next()?;
    let (major, minor) = parts.next()?.split_once(':')?;
    let device = (u64::from_str_radix(major, 16).ok()? << 20) | u64::from_str_radix(minor, 16).ok()?;
    let inode = parts.next()?.parse().ok()?;

    Some(SmapsEntry {
        start,
        end,
        protection: Protection {
            read: perms[0] == b'r',
            write: perms[1] == b'w',
            execute: perms[2] == b'x',
        },
        shared_mapping: perms[3] == b's',
        device,
        inode,
        ..Default::default()
    })
}

/// Parses smaps content from a reader.
///
/// Returns the mappings read so far together with the I/O error that cut the
/// read short, if any.
pub fn parse_smaps<R: BufRead>(reader: R) -> (Vec<SmapsEntry>, Option<std::io::Error>) {
    let mut entries: Vec<SmapsEntry> = Vec::new();

    for line in reader.lines() {
        let l = match line {
            Ok(l) => l,
            Err(e) => return (entries, Some(e)),
        };

        if let Some(entry) = parse_header(&l) {
            entries.push(entry);
            continue;
        }

        let Some(current) = entries.last_mut() else {
            continue;
        };
        if let Some(kb) = l.strip_prefix("Rss:") {
            current.rss_kb = parse_kb_value(kb).unwrap_or(0);
        } else if let Some(kb) = l.strip_prefix("Pss:") {
            current.pss_kb = parse_kb_value(kb).unwrap_or(0);
        } else if let Some(kb) = l.strip_prefix("Shared_Clean:") {
            current.shared_clean_kb = parse_kb_value(kb).unwrap_or(0);
        } else if let Some(kb) = l.strip_prefix("Shared_Dirty:") {
            current.shared_dirty_kb = parse_kb_value(kb).unwrap_or(0);
        } else if let Some(kb) = l.strip_prefix("Private_Clean:") {
            current.private_clean_kb = parse_kb_value(kb).unwrap_or(0);
        } else if let Some(kb) = l.strip_prefix("Private_Dirty:") {
            current.private_dirty_kb = parse_kb_value(kb).unwrap_or(0);
        } else if let Some(kb) = l.strip_prefix("KernelPageSize:") {
            current.kernel_page_kb = parse_kb_value(kb).unwrap_or(0);
        }
    }

    (entries, None)
}

#[derive(Default)]
struct ObjectTotals {
    mappings: u32,
    rss_kb: u64,
    pss_kb: u64,
    shared_kb: u64,
}

/// Converts parsed mappings into regions, ascending by address.
pub fn build_regions(entries: &[SmapsEntry], page_size: u64) -> Vec<RegionInfo> {
    let page_kb = (page_size / 1024).max(1);

    let mut objects: HashMap<ObjectId, ObjectTotals> = HashMap::new();
    for e in entries {
        let t = objects.entry(e.object()).or_default();
        t.mappings += 1;
        t.rss_kb += e.rss_kb;
        t.pss_kb += e.pss_kb;
        t.shared_kb += e.shared_kb();
    }

    let mut regions: Vec<RegionInfo> = entries
        .iter()
        .map(|e| {
            let object = e.object();
            let totals = &objects[&object];
            let other_processes = if totals.pss_kb > 0 {
                ((totals.rss_kb as f64 / totals.pss_kb as f64).round() as u32).saturating_sub(1)
            } else {
                0
            };

            let sharing = if e.rss_kb == 0 {
                SharingClass::Empty
            } else if e.kernel_page_kb > page_kb {
                SharingClass::LargePage
            } else if e.shared_mapping {
                SharingClass::SharedTrue
            } else if e.shared_kb() > 0 {
                SharingClass::CopyOnWrite
            } else {
                SharingClass::Private
            };

            let (resident_kb, private_kb) = match sharing {
                SharingClass::SharedTrue => (totals.rss_kb, e.private_kb()),
                SharingClass::CopyOnWrite => (totals.shared_kb, e.private_kb()),
                _ => (e.rss_kb, e.rss_kb),
            };

            RegionInfo {
                start: e.start,
                size: e.end.saturating_sub(e.start),
                object,
                sharing,
                ref_count: totals.mappings + other_processes,
                resident_pages: resident_kb / page_kb,
                private_resident_pages: private_kb / page_kb,
                protection: e.protection,
            }
        })
        .collect();

    regions.sort_by_key(|r| r.start);
    regions
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SMAPS: &str = "\
00400000-0040b000 r-xp 00000000 08:02 1234   /usr/bin/cat
Size:                 44 kB
KernelPageSize:        4 kB
Rss:                  40 kB
Pss:                  20 kB
Shared_Clean:         40 kB
Shared_Dirty:          0 kB
Private_Clean:         0 kB
Private_Dirty:         0 kB
VmFlags: rd ex mr mw me dw
0060a000-0060b000 rw-p 0000a000 08:02 1234   /usr/bin/cat
Size:                  4 kB
KernelPageSize:        4 kB
Rss:                   4 kB
Pss:                   4 kB
Shared_Clean:          0 kB
Shared_Dirty:          0 kB
Private_Clean:         0 kB
Private_Dirty:         4 kB
01e3c000-01e5d000 rw-p 00000000 00:00 0      [heap]
Size:                132 kB
KernelPageSize:        4 kB
Rss:                  12 kB
Pss:                  12 kB
Shared_Clean:          0 kB
Shared_Dirty:          0 kB
Private_Clean:         0 kB
Private_Dirty:        12 kB
7f0000000000-7f0000200000 rw-p 00000000 00:00 0
Size:               2048 kB
KernelPageSize:     2048 kB
Rss:                2048 kB
Pss:                2048 kB
Shared_Clean:          0 kB
Shared_Dirty:          0 kB
Private_Clean:         0 kB
Private_Dirty:      2048 kB
7f1000000000-7f1000010000 rw-s 00000000 00:05 99     /dev/shm/buf
Size:                 64 kB
KernelPageSize:        4 kB
Rss:                  16 kB
Pss:                   8 kB
Shared_Clean:          0 kB
Shared_Dirty:         16 kB
Private_Clean:         0 kB
Private_Dirty:         0 kB
7ffd00000000-7ffd00001000 ---p 00000000 00:00 0
Size:                  4 kB
KernelPageSize:        4 kB
Rss:                   0 kB
Pss:                   0 kB
";

    #[test]
    fn test_parse_kb_value() {
        assert_eq!(parse_kb_value("       1234 kB"), Some(1234));
        assert_eq!(parse_kb_value(""), None);
        assert_eq!(parse_kb_value("-1 kB"), None);
    }

    #[test]
    fn test_parse_smaps_entries() {
        let (entries, err) = parse_smaps(Cursor::new(SMAPS));
        assert!(err.is_none());
        assert_eq!(entries.len(), 6);

        let text = &entries[0];
        assert_eq!(text.start, 0x400000);
        assert_eq!(text.end, 0x40b000);
        assert!(text.protection.read && text.protection.execute && !text.protection.write);
        assert!(!text.shared_mapping);
        assert_eq!(text.inode, 1234);
        assert_eq!(text.device, (8 << 20) | 2);
        assert_eq!(text.rss_kb, 40);
        assert_eq!(text.shared_clean_kb, 40);

        assert!(entries[4].shared_mapping);
        assert_eq!(entries[3].kernel_page_kb, 2048);
    }

    #[test]
    fn test_build_regions_classification() {
        let (entries, _) = parse_smaps(Cursor::new(SMAPS));
        let regions = build_regions(&entries, 4096);
        let classes: Vec<SharingClass> = regions.iter().map(|r| r.sharing).collect();
        assert_eq!(
            classes,
            vec![
                SharingClass::CopyOnWrite,
                SharingClass::Private,
                SharingClass::Private,
                SharingClass::LargePage,
                SharingClass::SharedTrue,
                SharingClass::Empty,
            ]
        );

        // Both mappings of /usr/bin/cat share one object
        assert_eq!(regions[0].object, regions[1].object);
        // two local mappings + one other process (Rss/Pss = 44/24 rounds to 2)
        assert_eq!(regions[0].ref_count, 3);
        assert_eq!(regions[0].resident_pages, 10);

        let heap = &regions[2];
        assert_eq!(heap.object, ObjectId::Anonymous(0x01e3c000));
        assert_eq!(heap.private_resident_pages, 3);
        assert_eq!(heap.size, 0x21000);

        let shm = &regions[4];
        assert_eq!(shm.ref_count, 2);
        assert_eq!(shm.resident_pages, 4);

        // Guard page sits above every other mapping
        let guard = &regions[5];
        assert_eq!(guard.start, 0x7ffd_0000_0000);
        assert_eq!(guard.size, 4096);
    }
}
