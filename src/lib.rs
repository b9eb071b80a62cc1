//! Herakles Process Sampler Library
//!
//! The sampling engine of a top-style process monitor. Once per interval it
//! queries the host kernel for per-process and host-wide resource usage,
//! rebuilds monotonic counters from wrapping 32-bit kernel values, keeps a
//! queryable table of live processes and classifies each process's VM regions
//! into sharing categories without counting shared pages twice.
//!
//! # Features
//!
//! - **Sampling passes**: one synchronous call collects processes, load, CPU
//!   ticks, VM statistics, network and disk counters
//! - **Wrap-safe counters**: faults, pageins, syscalls and context switches
//!   keep growing across 32-bit wraparound
//! - **Shared memory deduplication**: objects mapped through several regions
//!   are charged once per process
//! - **Sorted views**: two-level sort keys or arbitrary comparisons
//!
//! # Usage
//!
//! ```no_run
//! use herakles_sampler::platform::linux::LinuxPlatform;
//! use herakles_sampler::{Sampler, SortKey};
//!
//! let mut sampler = Sampler::new(LinuxPlatform::new());
//! sampler.sample(true, false)?;
//! sampler.sort(&SortKey::parse("-rsize", "+pid")?);
//!
//! for record in sampler.iter().take(5) {
//!     println!("{} {} {}", record.pid, record.command, record.memory.now.resident);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod accumulator;
pub mod memory;
pub mod platform;
pub mod process;
pub mod sample;
pub mod sampler;

// Re-export main types for convenience
pub use accumulator::Accumulator;
pub use platform::{Platform, PlatformError};
pub use process::{ProcessRecord, RunState, SortField, SortKey};
pub use sample::GlobalSample;
pub use sampler::{SampleError, SamplePhase, Sampler};
