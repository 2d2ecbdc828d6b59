//! Storage Module
//!
//! The data half of the server: tagged values, reference-counted
//! entries, the segmented concurrent store, and the glob matcher used by
//! key scans.
//!
//! ## Ownership
//!
//! ```text
//! Store ──owns──> Segment ──owns──> Arc<Entry> ──owns──> Value
//!                                     │
//!                      borrows ───────┘  (GET holds a clone while the
//!                                         reply is produced)
//! ```
//!
//! The store's map holds one reference per entry; every borrower holds
//! another. An entry's value is destroyed only when the map reference
//! and all borrows are gone, so readers never observe a freed value.

pub mod entry;
pub mod glob;
pub mod store;
pub mod value;

// Re-export commonly used types
pub use entry::{Entry, EntryRef};
pub use glob::glob_match;
pub use store::{Store, DEFAULT_SEGMENTS, MAX_SEGMENTS};
pub use value::{Value, ValueError};
