//! Process run-state classification.

use serde::Serialize;
use std::fmt;

use crate::platform::{ThreadInfo, ThreadRunState};

/// Run state of a process, ordered from least to most blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub enum RunState {
    Running,
    /// Uninterruptible wait.
    Stuck,
    Sleeping,
    /// Waiting with a known, positive sleep time.
    Idle,
    Stopped,
    Halted,
    #[default]
    Unknown,
}

impl RunState {
    pub const COUNT: usize = 7;

    pub const ALL: [RunState; RunState::COUNT] = [
        RunState::Running,
        RunState::Stuck,
        RunState::Sleeping,
        RunState::Idle,
        RunState::Stopped,
        RunState::Halted,
        RunState::Unknown,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Running => "running",
            RunState::Stuck => "stuck",
            RunState::Sleeping => "sleeping",
            RunState::Idle => "idle",
            RunState::Stopped => "stopped",
            RunState::Halted => "halted",
            RunState::Unknown => "unknown",
        }
    }

    fn of_thread(thread: &ThreadInfo) -> RunState {
        match thread.run_state {
            ThreadRunState::Running => RunState::Running,
            ThreadRunState::Uninterruptible => RunState::Stuck,
            ThreadRunState::Waiting if thread.sleep_time > 0 => RunState::Idle,
            ThreadRunState::Waiting => RunState::Sleeping,
            ThreadRunState::Stopped => RunState::Stopped,
            ThreadRunState::Halted => RunState::Halted,
            ThreadRunState::Other => RunState::Unknown,
        }
    }

    /// State of the least blocked thread; `Unknown` for a task without
    /// threads.
    pub fn classify(threads: &[ThreadInfo]) -> RunState {
        threads
            .iter()
            .map(RunState::of_thread)
            .min()
            .unwrap_or(RunState::Unknown)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
