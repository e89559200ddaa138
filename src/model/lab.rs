use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

use crate::error::AppError;
use crate::model::{
    matches_exact, require_fields, ChangeSet, Id, LocalLink, OwnerRef, Patch, Record, TimeWindow,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabOrderStatus {
    Ordered,
    SampleCollected,
    TestingInProgress,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabOrder {
    pub id: Id,
    pub patient_user_id: Id,
    pub doctor_user_id: Id,
    pub order_date: DateTime<Utc>,
    pub test_type: String,
    pub status: LabOrderStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewLabOrder {
    pub patient_user_id: Option<Id>,
    pub doctor_user_id: Option<Id>,
    pub order_date: Option<DateTime<Utc>>,
    pub test_type: Option<String>,
    pub status: Option<LabOrderStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabOrderChanges {
    #[serde(default)]
    pub status: Patch<LabOrderStatus>,
    #[serde(default)]
    pub notes: Patch<String>,
    #[serde(default)]
    pub test_type: Patch<String>,
}

impl ChangeSet for LabOrderChanges {
    fn is_empty(&self) -> bool {
        self.status.is_absent() && self.notes.is_absent() && self.test_type.is_absent()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabOrderFilter {
    pub patient_user_id: Option<Id>,
    pub doctor_user_id: Option<Id>,
    pub status: Option<LabOrderStatus>,
    pub order_date_after: Option<DateTime<Utc>>,
    pub order_date_before: Option<DateTime<Utc>>,
}

impl Record for LabOrder {
    const COLLECTION: &'static str = "lab-orders";
    const LABEL: &'static str = "Lab Order";

    type Draft = NewLabOrder;
    type Changes = LabOrderChanges;
    type Filter = LabOrderFilter;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(draft: NewLabOrder, id: Id, now: DateTime<Utc>) -> Result<Self, AppError> {
        let patient = draft.patient_user_id.filter(|v| !v.trim().is_empty());
        let doctor = draft.doctor_user_id.filter(|v| !v.trim().is_empty());
        let test_type = draft.test_type.filter(|v| !v.trim().is_empty());
        require_fields(&[
            ("patient_user_id", patient.is_some()),
            ("doctor_user_id", doctor.is_some()),
            ("test_type", test_type.is_some()),
        ])?;

        Ok(Self {
            id,
            patient_user_id: patient.unwrap_or_default(),
            doctor_user_id: doctor.unwrap_or_default(),
            order_date: draft.order_date.unwrap_or(now),
            test_type: test_type.unwrap_or_default(),
            status: draft.status.unwrap_or(LabOrderStatus::Ordered),
            notes: draft.notes,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_changes(&mut self, changes: LabOrderChanges) -> Result<bool, AppError> {
        let mut changed = changes.status.apply_required("status", &mut self.status)?;
        changed |= changes.notes.apply_optional(&mut self.notes);
        changed |= changes.test_type.apply_required("test_type", &mut self.test_type)?;
        Ok(changed)
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn matches(&self, filter: &LabOrderFilter) -> bool {
        matches_exact(&filter.patient_user_id, &self.patient_user_id)
            && matches_exact(&filter.doctor_user_id, &self.doctor_user_id)
            && filter.status.map_or(true, |s| s == self.status)
            && TimeWindow::new(filter.order_date_after, filter.order_date_before)
                .contains(self.order_date)
    }

    fn listing_order(a: &Self, b: &Self) -> Ordering {
        b.order_date.cmp(&a.order_date).then_with(|| a.id.cmp(&b.id))
    }

    fn owner_refs(&self) -> Vec<OwnerRef> {
        vec![
            OwnerRef::user("patient", &self.patient_user_id),
            OwnerRef::user("doctor", &self.doctor_user_id),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabResultStatus {
    Preliminary,
    Final,
    Corrected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabResult {
    pub id: Id,
    pub lab_order_id: Id,
    pub lab_technician_user_id: Id,
    pub result_date: DateTime<Utc>,
    pub result_data: Value,
    pub status: LabResultStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewLabResult {
    pub lab_order_id: Option<Id>,
    pub lab_technician_user_id: Option<Id>,
    pub result_date: Option<DateTime<Utc>>,
    pub result_data: Option<Value>,
    pub status: Option<LabResultStatus>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabResultChanges {
    #[serde(default)]
    pub status: Patch<LabResultStatus>,
    #[serde(default)]
    pub notes: Patch<String>,
    #[serde(default)]
    pub result_data: Patch<Value>,
}

impl ChangeSet for LabResultChanges {
    fn is_empty(&self) -> bool {
        self.status.is_absent() && self.notes.is_absent() && self.result_data.is_absent()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LabResultFilter {
    pub lab_order_id: Option<Id>,
    pub lab_technician_user_id: Option<Id>,
    pub status: Option<LabResultStatus>,
    pub result_date_after: Option<DateTime<Utc>>,
    pub result_date_before: Option<DateTime<Utc>>,
}

fn check_result_data(data: &Value) -> Result<(), AppError> {
    if data.is_object() || data.is_array() {
        Ok(())
    } else {
        Err(AppError::validation("result_data must be a JSON object or array"))
    }
}

impl Record for LabResult {
    const COLLECTION: &'static str = "lab-results";
    const LABEL: &'static str = "Lab Result";

    type Draft = NewLabResult;
    type Changes = LabResultChanges;
    type Filter = LabResultFilter;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(draft: NewLabResult, id: Id, now: DateTime<Utc>) -> Result<Self, AppError> {
        let order = draft.lab_order_id.filter(|v| !v.trim().is_empty());
        let technician = draft.lab_technician_user_id.filter(|v| !v.trim().is_empty());
        let data = draft.result_data.filter(|v| !v.is_null());
        require_fields(&[
            ("lab_order_id", order.is_some()),
            ("lab_technician_user_id", technician.is_some()),
            ("result_data", data.is_some()),
        ])?;
        let result_data = data.unwrap_or_default();
        check_result_data(&result_data)?;

        Ok(Self {
            id,
            lab_order_id: order.unwrap_or_default(),
            lab_technician_user_id: technician.unwrap_or_default(),
            result_date: draft.result_date.unwrap_or(now),
            result_data,
            status: draft.status.unwrap_or(LabResultStatus::Final),
            notes: draft.notes,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_changes(&mut self, changes: LabResultChanges) -> Result<bool, AppError> {
        if let Patch::Value(data) = &changes.result_data {
            check_result_data(data)?;
        }
        let mut changed = changes.status.apply_required("status", &mut self.status)?;
        changed |= changes.notes.apply_optional(&mut self.notes);
        changed |= changes.result_data.apply_required("result_data", &mut self.result_data)?;
        Ok(changed)
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn matches(&self, filter: &LabResultFilter) -> bool {
        matches_exact(&filter.lab_order_id, &self.lab_order_id)
            && matches_exact(&filter.lab_technician_user_id, &self.lab_technician_user_id)
            && filter.status.map_or(true, |s| s == self.status)
            && TimeWindow::new(filter.result_date_after, filter.result_date_before)
                .contains(self.result_date)
    }

    fn listing_order(a: &Self, b: &Self) -> Ordering {
        b.result_date.cmp(&a.result_date).then_with(|| a.id.cmp(&b.id))
    }

    fn owner_refs(&self) -> Vec<OwnerRef> {
        vec![OwnerRef::user("lab_technician", &self.lab_technician_user_id)]
    }

    fn local_links(&self) -> Vec<LocalLink> {
        vec![LocalLink {
            role: "order",
            collection: LabOrder::COLLECTION,
            kind: LabOrder::LABEL,
            id: self.lab_order_id.clone(),
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn result_data_must_be_structured() {
        let draft = NewLabResult {
            lab_order_id: Some("o-1".to_string()),
            lab_technician_user_id: Some("T1".to_string()),
            result_data: Some(json!("positive")),
            ..Default::default()
        };
        assert!(LabResult::from_draft(draft, "r-1".to_string(), Utc::now()).is_err());

        let draft = NewLabResult {
            lab_order_id: Some("o-1".to_string()),
            lab_technician_user_id: Some("T1".to_string()),
            result_data: Some(json!({"hemoglobin": 13.5})),
            ..Default::default()
        };
        let result = LabResult::from_draft(draft, "r-1".to_string(), Utc::now()).unwrap();
        assert_eq!(result.status, LabResultStatus::Final);
    }

    #[test]
    fn order_status_uses_snake_case_names() {
        let status: LabOrderStatus = serde_json::from_value(json!("sample_collected")).unwrap();
        assert_eq!(status, LabOrderStatus::SampleCollected);
        assert!(serde_json::from_value::<LabOrderStatus>(json!("shipped")).is_err());
    }
}
