use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

pub type Id = String;

/// Remote collection holding identity snapshots for every user id.
pub const USERS: &str = "users";

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// A foreign id owned by another service, plus the remote collection it lives in
/// and the section name its snapshot is nested under.
///
/// Never checked against the remote collection on write; a dangling reference only
/// surfaces as an annotation when the record is aggregated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub role: String,
    pub collection: String,
    pub id: Id,
}

impl OwnerRef {
    pub fn new(role: &str, collection: &str, id: impl Into<Id>) -> Self {
        Self {
            role: role.to_string(),
            collection: collection.to_string(),
            id: id.into(),
        }
    }

    pub fn user(role: &str, id: &str) -> Self {
        Self::new(role, USERS, id)
    }

    /// Key used to de-duplicate lookups within one aggregation.
    pub fn lookup_key(&self) -> (String, Id) {
        (self.collection.clone(), self.id.clone())
    }
}

/// A reference to another locally owned record, nested under `role` in merged views.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalLink {
    pub role: &'static str,
    pub collection: &'static str,
    pub kind: &'static str,
    pub id: Id,
}

/// Inclusive-lower / exclusive-upper window over a record's designated date-time field.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimeWindow {
    pub after: Option<DateTime<Utc>>,
    pub before: Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn new(after: Option<DateTime<Utc>>, before: Option<DateTime<Utc>>) -> Self {
        Self { after, before }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.after.map_or(true, |after| instant >= after)
            && self.before.map_or(true, |before| instant < before)
    }
}

/// Trimmed, non-empty text for a required input field.
pub fn require_text(field: &str, value: Option<String>) -> Result<String, AppError> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::validation(format!("{} is required", field))),
    }
}

/// Check a required set of fields at once so the caller sees every missing name.
pub fn require_fields(present: &[(&str, bool)]) -> Result<(), AppError> {
    let missing: Vec<&str> = present
        .iter()
        .filter(|(_, ok)| !ok)
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AppError::validation(format!("{} are required", missing.join(", "))))
    }
}

/// Exact-match filter helper: `None` accepts everything.
pub fn matches_exact(expected: &Option<String>, actual: &str) -> bool {
    expected.as_deref().map_or(true, |e| e == actual)
}
