//! Relationships between records
//!
//! Links are stored on the source record as target ids. Targets are checked
//! when a transaction commits (every linked id must exist in the state the
//! commit produces); deleting a target later is allowed and shows up as a
//! `DanglingReference` when the link is followed.

mod resolver;

pub use resolver::{resolve, validate_links, ResolveIter, Resolved};
