use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::AppError;
use crate::model::{
    matches_exact, require_fields, ChangeSet, Id, MergeShape, OwnerRef, Patch, Record,
};

/// Role profiles are keyed by the identity they extend, so their id is the user id.
fn profile_id(user_id: Option<Id>) -> Option<Id> {
    user_id.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pharmacist {
    pub user_id: Id,
    pub pharmacy_name: String,
    pub pharmacy_license_number: String,
    pub phone_number: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPharmacist {
    pub user_id: Option<Id>,
    pub pharmacy_name: Option<String>,
    pub pharmacy_license_number: Option<String>,
    pub phone_number: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PharmacistChanges {
    #[serde(default)]
    pub pharmacy_name: Patch<String>,
    #[serde(default)]
    pub pharmacy_license_number: Patch<String>,
    #[serde(default)]
    pub phone_number: Patch<String>,
    #[serde(default)]
    pub address: Patch<String>,
}

impl ChangeSet for PharmacistChanges {
    fn is_empty(&self) -> bool {
        self.pharmacy_name.is_absent()
            && self.pharmacy_license_number.is_absent()
            && self.phone_number.is_absent()
            && self.address.is_absent()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PharmacistFilter {
    pub pharmacy_name: Option<String>,
    pub pharmacy_license_number: Option<String>,
}

impl Record for Pharmacist {
    const COLLECTION: &'static str = "pharmacists";
    const LABEL: &'static str = "Pharmacist";
    const MERGE_SHAPE: MergeShape = MergeShape::Flattened;

    type Draft = NewPharmacist;
    type Changes = PharmacistChanges;
    type Filter = PharmacistFilter;

    fn id(&self) -> &str {
        &self.user_id
    }

    fn from_draft(draft: NewPharmacist, _generated_id: Id, now: DateTime<Utc>) -> Result<Self, AppError> {
        let user_id = profile_id(draft.user_id);
        let name = draft.pharmacy_name.filter(|v| !v.trim().is_empty());
        let license = draft.pharmacy_license_number.filter(|v| !v.trim().is_empty());
        require_fields(&[
            ("user_id", user_id.is_some()),
            ("pharmacy_name", name.is_some()),
            ("pharmacy_license_number", license.is_some()),
        ])?;

        Ok(Self {
            user_id: user_id.unwrap_or_default(),
            pharmacy_name: name.unwrap_or_default(),
            pharmacy_license_number: license.unwrap_or_default(),
            phone_number: draft.phone_number,
            address: draft.address,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_changes(&mut self, changes: PharmacistChanges) -> Result<bool, AppError> {
        let mut changed = changes
            .pharmacy_name
            .apply_required("pharmacy_name", &mut self.pharmacy_name)?;
        changed |= changes
            .pharmacy_license_number
            .apply_required("pharmacy_license_number", &mut self.pharmacy_license_number)?;
        changed |= changes.phone_number.apply_optional(&mut self.phone_number);
        changed |= changes.address.apply_optional(&mut self.address);
        Ok(changed)
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn matches(&self, filter: &PharmacistFilter) -> bool {
        matches_exact(&filter.pharmacy_name, &self.pharmacy_name)
            && matches_exact(&filter.pharmacy_license_number, &self.pharmacy_license_number)
    }

    fn listing_order(a: &Self, b: &Self) -> Ordering {
        a.user_id.cmp(&b.user_id)
    }

    fn owner_refs(&self) -> Vec<OwnerRef> {
        vec![OwnerRef::user("user", &self.user_id)]
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![("pharmacy_license_number", self.pharmacy_license_number.clone())]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabTechnician {
    pub user_id: Id,
    pub employee_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewLabTechnician {
    pub user_id: Option<Id>,
    pub employee_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabTechnicianChanges {
    #[serde(default)]
    pub employee_id: Patch<String>,
}

impl ChangeSet for LabTechnicianChanges {
    fn is_empty(&self) -> bool {
        self.employee_id.is_absent()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabTechnicianFilter {
    pub employee_id: Option<String>,
}

impl Record for LabTechnician {
    const COLLECTION: &'static str = "lab-technicians";
    const LABEL: &'static str = "Lab Technician";
    const MERGE_SHAPE: MergeShape = MergeShape::Flattened;

    type Draft = NewLabTechnician;
    type Changes = LabTechnicianChanges;
    type Filter = LabTechnicianFilter;

    fn id(&self) -> &str {
        &self.user_id
    }

    fn from_draft(draft: NewLabTechnician, _generated_id: Id, now: DateTime<Utc>) -> Result<Self, AppError> {
        let user_id = profile_id(draft.user_id);
        let employee_id = draft.employee_id.filter(|v| !v.trim().is_empty());
        require_fields(&[
            ("user_id", user_id.is_some()),
            ("employee_id", employee_id.is_some()),
        ])?;

        Ok(Self {
            user_id: user_id.unwrap_or_default(),
            employee_id: employee_id.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_changes(&mut self, changes: LabTechnicianChanges) -> Result<bool, AppError> {
        changes.employee_id.apply_required("employee_id", &mut self.employee_id)
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn matches(&self, filter: &LabTechnicianFilter) -> bool {
        matches_exact(&filter.employee_id, &self.employee_id)
    }

    fn listing_order(a: &Self, b: &Self) -> Ordering {
        a.user_id.cmp(&b.user_id)
    }

    fn owner_refs(&self) -> Vec<OwnerRef> {
        vec![OwnerRef::user("user", &self.user_id)]
    }

    fn unique_keys(&self) -> Vec<(&'static str, String)> {
        vec![("employee_id", self.employee_id.clone())]
    }
}
