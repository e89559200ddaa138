use serde::{Deserialize, Deserializer};

use crate::error::AppError;

/// Tri-state field for partial updates: absent ("don't touch"), explicit null
/// ("clear") or a new value.
///
/// Fields of this type must carry `#[serde(default)]` so a missing key becomes `Absent`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Patch<T> {
    #[default]
    Absent,
    Null,
    Value(T),
}

impl<'de, T> Deserialize<'de> for Patch<T>
where
    T: Deserialize<'de>,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Patch::Value(value),
            None => Patch::Null,
        })
    }
}

impl<T: PartialEq> Patch<T> {
    pub fn is_absent(&self) -> bool {
        matches!(self, Patch::Absent)
    }

    /// Apply to a nullable field. Returns whether the stored value changed.
    pub fn apply_optional(self, target: &mut Option<T>) -> bool {
        let next = match self {
            Patch::Absent => return false,
            Patch::Null => None,
            Patch::Value(v) => Some(v),
        };
        if *target == next {
            return false;
        }
        *target = next;
        true
    }

    /// Apply to a required field; an explicit null is rejected.
    pub fn apply_required(self, field: &str, target: &mut T) -> Result<bool, AppError> {
        match self {
            Patch::Absent => Ok(false),
            Patch::Null => Err(AppError::validation(format!("{} cannot be null", field))),
            Patch::Value(v) => {
                if *target == v {
                    return Ok(false);
                }
                *target = v;
                Ok(true)
            }
        }
    }
}

impl<T: PartialEq + std::fmt::Display> Patch<T> {
    /// Apply to a field that may be set once and then never cleared or re-pointed.
    /// Repeating the stored value is a no-op.
    pub fn apply_once(self, field: &str, target: &mut Option<T>) -> Result<bool, AppError> {
        match (self, target.as_ref()) {
            (Patch::Absent, _) => Ok(false),
            (Patch::Null, _) => Err(AppError::validation(format!("{} cannot be cleared", field))),
            (Patch::Value(v), None) => {
                *target = Some(v);
                Ok(true)
            }
            (Patch::Value(v), Some(current)) if *current == v => Ok(false),
            (Patch::Value(_), Some(current)) => Err(AppError::validation(format!(
                "{} is already set to '{}'",
                field, current
            ))),
        }
    }
}

/// A partial-update input that can tell whether the caller supplied any field.
pub trait ChangeSet {
    fn is_empty(&self) -> bool;
}
