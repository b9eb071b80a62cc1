//! Process bookkeeping.
//!
//! This module provides:
//! - `record`: per-process figures with their previous values
//! - `table`: the persistent pid-keyed table and its sorted view
//! - `sort`: two-level comparison keys
//! - `state`: run-state classification from thread states

pub mod record;
pub mod sort;
pub mod state;
pub mod table;

// Re-export commonly used types
pub use record::{MemoryFigures, ProcessCounters, ProcessRecord};
pub use sort::{Order, SortField, SortKey, SortSpec};
pub use state::RunState;
pub use table::{ProcessIter, ProcessTable};
