//! Transaction layer: writer admission, conflict detection and the
//! transaction handle

pub mod coordinator;
pub mod transaction;

pub use coordinator::{TransactionCoordinator, TransactionCoordinatorStats, TransactionId, TransactionState};
pub use transaction::Transaction;
