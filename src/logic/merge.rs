use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::model::MergedView;
use crate::remote::{Snapshot, BLOCKED_FIELDS};

/// Which side keeps a key present on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precedence {
    LocalWins,
    RemoteWins,
}

/// Identity fields that never survive a flattened merge, besides [`BLOCKED_FIELDS`].
pub const IDENTITY_EXCLUSIONS: &[&str] = &["id", "date_joined", "last_login"];

/// Section name of the identity annotation in a flattened view.
pub const IDENTITY_SECTION: &str = "user";

/// Combine a local record with one remote snapshot into a key-ordered map.
///
/// `exclusions` (and the lookup block-list) are dropped from the remote side only,
/// so a local `id` always survives.
pub fn merge_fields(
    local: &Map<String, Value>,
    remote: &Snapshot,
    exclusions: &[&str],
    precedence: Precedence,
) -> Map<String, Value> {
    let mut merged: BTreeMap<String, Value> = remote
        .iter()
        .filter(|(key, _)| {
            !exclusions.contains(&key.as_str()) && !BLOCKED_FIELDS.contains(&key.as_str())
        })
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    for (key, value) in local {
        match precedence {
            Precedence::LocalWins => {
                merged.insert(key.clone(), value.clone());
            }
            Precedence::RemoteWins => {
                merged.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
    }

    merged.into_iter().collect()
}

/// Flattened 1:1 merge of a profile with its identity snapshot. Local fields win;
/// without a snapshot the profile stands alone with a `_user_error` annotation.
pub fn flatten_identity(
    local: Map<String, Value>,
    identity: Option<Snapshot>,
    reason: Option<String>,
) -> MergedView {
    match identity {
        Some(snapshot) => MergedView::from_fields(merge_fields(
            &local,
            &snapshot,
            IDENTITY_EXCLUSIONS,
            Precedence::LocalWins,
        )),
        None => {
            let mut view = MergedView::from_fields(local);
            view.annotate(
                IDENTITY_SECTION,
                reason.unwrap_or_else(|| "identity lookup was not performed".to_string()),
            );
            view
        }
    }
}

/// Namespaced merge: place a snapshot under `role`, or its annotation if it is missing.
pub fn nest(view: &mut MergedView, role: &str, data: Option<Value>, reason: Option<String>) {
    match data {
        Some(data) => view.attach_data(role, data),
        None => view.annotate(
            role,
            reason.unwrap_or_else(|| format!("{} could not be resolved", role)),
        ),
    }
}
