pub mod aggregate;
pub mod conflict;
pub mod coordinator;
pub mod history;
pub mod merge;

pub use aggregate::{Aggregator, LookupCache};
pub use conflict::{find_conflict, overlaps, ConflictGuard};
pub use coordinator::{FulfillmentRequest, WriteCoordinator};
pub use history::patient_history;
pub use merge::{flatten_identity, merge_fields, nest, Precedence};
