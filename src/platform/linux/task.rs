//! Per-task parsing of /proc/<pid> files.
//!
//! This module provides functions to discover pids and to parse `stat`,
//! `status`, `io`, thread states and the ELF header of the executable.

use crate::platform::{Arch, ThreadInfo, ThreadRunState};
use std::fs;
use std::io::Read;
use std::path::Path;

/// Fields of /proc/<pid>/stat used by the sampler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatFields {
    pub comm: String,
    pub state: char,
    pub ppid: u32,
    pub pgrp: u32,
    pub minflt: u64,
    pub majflt: u64,
    pub utime: u64,
    pub stime: u64,
    pub num_threads: u32,
    pub starttime: u64,
    pub vsize: u64,
    pub rss_pages: u64,
}

/// Fields of /proc/<pid>/status used by the sampler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusFields {
    pub uid: u32,
    pub voluntary_ctxt_switches: u64,
    pub nonvoluntary_ctxt_switches: u64,
}

/// Scans a proc root for numeric pid directories.
pub fn collect_pids(root: &Path) -> std::io::Result<Vec<u32>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(root)?.flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if !name.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        if let Ok(pid) = name.parse() {
            out.push(pid);
        }
    }
    out.sort_unstable();
    Ok(out)
}

/// Parses /proc/<pid>/stat. The comm field may contain spaces and parens,
/// so fields are counted from the last closing paren.
pub fn parse_stat(content: &str) -> Option<StatFields> {
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    let comm = content.get(open + 1..close)?.to_string();
    let fields: Vec<&str> = content[close + 1..].split_whitespace().collect();
    // Fields after comm: state(0) ppid(1) pgrp(2) session(3) tty_nr(4)
    // tpgid(5) flags(6) minflt(7) cminflt(8) majflt(9) cmajflt(10)
    // utime(11) stime(12) cutime(13) cstime(14) priority(15) nice(16)
    // num_threads(17) itrealvalue(18) starttime(19) vsize(20) rss(21)
    if fields.len() < 22 {
        return None;
    }
    let num = |idx: usize| fields[idx].parse::<u64>().ok();

    Some(StatFields {
        comm,
        state: fields[0].chars().next()?,
        ppid: num(1)? as u32,
        pgrp: num(2)? as u32,
        minflt: num(7)?,
        majflt: num(9)?,
        utime: num(11)?,
        stime: num(12)?,
        num_threads: num(17)? as u32,
        starttime: num(19)?,
        vsize: num(20)?,
        rss_pages: num(21)?,
    })
}

/// Parses /proc/<pid>/status.
pub fn parse_status(content: &str) -> StatusFields {
    let mut fields = StatusFields::default();
    for line in content.lines() {
        if let Some(v) = line.strip_prefix("Uid:") {
            // real, effective, saved, fs
            fields.uid = v
                .split_whitespace()
                .next()
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
        } else if let Some(v) = line.strip_prefix("voluntary_ctxt_switches:") {
            fields.voluntary_ctxt_switches = v.trim().parse().unwrap_or(0);
        } else if let Some(v) = line.strip_prefix("nonvoluntary_ctxt_switches:") {
            fields.nonvoluntary_ctxt_switches = v.trim().parse().unwrap_or(0);
        }
    }
    fields
}

/// Reads syscall counts (syscr + syscw) from /proc/<pid>/io.
pub fn parse_io_syscalls(content: &str) -> u64 {
    let mut total = 0u64;
    for line in content.lines() {
        if let Some(v) = line
            .strip_prefix("syscr:")
            .or_else(|| line.strip_prefix("syscw:"))
        {
            total += v.trim().parse::<u64>().unwrap_or(0);
        }
    }
    total
}

/// Reads the process name from comm or extracts it from cmdline.
pub fn read_process_name(proc_path: &Path) -> Option<String> {
    if let Ok(s) = fs::read_to_string(proc_path.join("comm")) {
        let t = s.trim();
        if !t.is_empty() {
            return Some(t.into());
        }
    }

    let content = fs::read(proc_path.join("cmdline")).ok()?;
    let first = content.split(|&b| b == 0u8).next()?;
    let first = std::str::from_utf8(first).ok()?;
    Path::new(first)
        .file_name()
        .and_then(|n| n.to_str())
        .map(|s| s.to_string())
}

/// Maps a thread state letter from /proc/<pid>/task/<tid>/stat.
///
/// `I` (idle kernel thread) is reported as a waiting thread with a positive
/// sleep time; plain `S` carries no sleep time.
pub fn thread_info_from_state(state: char) -> ThreadInfo {
    let (run_state, sleep_time) = match state {
        'R' => (ThreadRunState::Running, 0),
        'D' => (ThreadRunState::Uninterruptible, 0),
        'S' => (ThreadRunState::Waiting, 0),
        'I' => (ThreadRunState::Waiting, 1),
        'T' | 't' => (ThreadRunState::Stopped, 0),
        'Z' | 'X' | 'x' => (ThreadRunState::Halted, 0),
        _ => (ThreadRunState::Other, 0),
    };
    ThreadInfo {
        run_state,
        sleep_time,
    }
}

/// Reads the threads of a task from its `task/` directory.
pub fn read_threads(proc_path: &Path) -> std::io::Result<Vec<ThreadInfo>> {
    let mut threads = Vec::new();
    for entry in fs::read_dir(proc_path.join("task"))?.flatten() {
        // Threads can exit while we walk the directory
        let Ok(content) = fs::read_to_string(entry.path().join("stat")) else {
            continue;
        };
        if let Some(stat) = parse_stat(&content) {
            threads.push(thread_info_from_state(stat.state));
        }
    }
    Ok(threads)
}

/// Extracts the architecture from the first bytes of an ELF file.
pub fn parse_elf_arch(header: &[u8]) -> Option<Arch> {
    if header.len() < 20 || &header[..4] != b"\x7fELF" {
        return None;
    }
    let bytes = [header[18], header[19]];
    let machine = match header[5] {
        1 => u16::from_le_bytes(bytes),
        2 => u16::from_be_bytes(bytes),
        _ => return None,
    };
    Some(Arch::from_elf_machine(machine))
}

/// Reads the architecture of /proc/<pid>/exe.
pub fn read_exe_arch(proc_path: &Path) -> std::io::Result<Option<Arch>> {
    let mut header = [0u8; 20];
    let mut file = fs::File::open(proc_path.join("exe"))?;
    file.read_exact(&mut header)?;
    Ok(parse_elf_arch(&header))
}
