//! Key management.
//!
//! - [`allocate_ids`] reserves ranges of surrogate keys for autocounter
//!   entities through a compare-and-swap on a reserved counter table, so
//!   several processes can insert into the same entity.
//! - [`refresh_id_table`] rebuilds the counters from the data after bulk loads.
//! - [`IdHelper`] finds or creates instances by an alternate key.

mod allocate;
mod id_helper;

pub use allocate::{allocate_ids, compare_and_swap, refresh_id_table, COUNTER_TABLE};
pub(crate) use allocate::ensure_counter_table;
pub use id_helper::{ExclusiveIdHelper, IdHelper, SharedIdHelper};
