use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use std::cmp::Ordering;

use crate::error::AppError;
use crate::model::{ChangeSet, Id, LocalLink, OwnerRef};

/// How a record's remote snapshots are folded into its merged view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeShape {
    /// Each snapshot nests under its owner reference's role.
    Nested,
    /// Exactly one identity snapshot, flattened under the record's own fields.
    Flattened,
}

/// A locally owned entity kind, stored as one collection in the record store.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection name, also the HTTP path segment.
    const COLLECTION: &'static str;
    /// Human-readable kind used in error messages.
    const LABEL: &'static str;
    const MERGE_SHAPE: MergeShape = MergeShape::Nested;

    /// Create input.
    type Draft: DeserializeOwned + Send + 'static;
    /// Partial-update input.
    type Changes: ChangeSet + DeserializeOwned + Send + 'static;
    /// List query filter.
    type Filter: DeserializeOwned + Default + Send + Sync + 'static;

    fn id(&self) -> &str;

    /// Validate a draft and build the record. `generated_id` is used unless the kind
    /// is keyed by a caller-supplied id.
    fn from_draft(draft: Self::Draft, generated_id: Id, now: DateTime<Utc>)
        -> Result<Self, AppError>;

    /// Apply a partial update. Returns whether any field changed.
    fn apply_changes(&mut self, changes: Self::Changes) -> Result<bool, AppError>;

    fn touch(&mut self, now: DateTime<Utc>);

    fn matches(&self, filter: &Self::Filter) -> bool;

    /// Ordering of list responses.
    fn listing_order(a: &Self, b: &Self) -> Ordering;

    fn owner_refs(&self) -> Vec<OwnerRef>;

    /// Other local records nested into this record's merged view.
    fn local_links(&self) -> Vec<LocalLink> {
        Vec::new()
    }

    /// Secondary unique keys besides the id, as (key name, value).
    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }
}

/// A record carrying a half-open `[start, end)` interval scheduled against one owner.
pub trait IntervalResource: Record {
    /// ConflictError message when the owner's schedule is taken.
    const UNAVAILABLE: &'static str;

    fn schedule_owner(&self) -> &str;
    fn interval(&self) -> (DateTime<Utc>, DateTime<Utc>);
    /// Only active intervals take part in overlap checks.
    fn is_active(&self) -> bool;
}
