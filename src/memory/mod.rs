//! Memory accounting: region classification and shared-object deduplication.

pub mod ledger;
pub mod regions;

pub use ledger::{LedgerEntry, ObjectLedger, ObjectWalk, SharedContribution};
pub use regions::{FrameworkTally, FrameworkTotals, RegionAccountant, RegionScan, RegionTotals};
