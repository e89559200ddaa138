use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::AppError;
use crate::model::{
    matches_exact, require_fields, ChangeSet, Id, OwnerRef, Patch, Record, TimeWindow,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrescriptionStatus {
    Active,
    Filled,
    Cancelled,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prescription {
    pub id: Id,
    pub patient_user_id: Id,
    pub doctor_user_id: Id,
    pub prescription_date: DateTime<Utc>,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
    pub notes: Option<String>,
    pub status: PrescriptionStatus,
    pub fulfilled_by_pharmacist_user_id: Option<Id>,
    pub fulfilled_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewPrescription {
    pub patient_user_id: Option<Id>,
    pub doctor_user_id: Option<Id>,
    pub prescription_date: Option<DateTime<Utc>>,
    pub medication_name: Option<String>,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub notes: Option<String>,
    pub status: Option<PrescriptionStatus>,
}

/// Partial update; also the payload shape a pharmacy sends when fulfilling.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrescriptionChanges {
    #[serde(default)]
    pub status: Patch<PrescriptionStatus>,
    #[serde(default)]
    pub notes: Patch<String>,
    #[serde(default)]
    pub dosage: Patch<String>,
    #[serde(default)]
    pub frequency: Patch<String>,
    #[serde(default)]
    pub duration: Patch<String>,
    #[serde(default)]
    pub fulfilled_by_pharmacist_user_id: Patch<Id>,
    #[serde(default)]
    pub fulfilled_date: Patch<DateTime<Utc>>,
}

impl ChangeSet for PrescriptionChanges {
    fn is_empty(&self) -> bool {
        self.status.is_absent() && self.notes.is_absent() && self.dosage.is_absent() && self.frequency.is_absent() && self.duration.is_absent() && self.fulfilled_by_pharmacist_user_id.is_absent() && self.fulfilled_date.is_absent()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrescriptionFilter {
    pub patient_user_id: Option<Id>,
    pub doctor_user_id: Option<Id>,
    pub fulfilled_by_pharmacist_user_id: Option<Id>,
    pub status: Option<PrescriptionStatus>,
    pub prescription_date_after: Option<DateTime<Utc>>,
    pub prescription_date_before: Option<DateTime<Utc>>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Record for Prescription {
    const COLLECTION: &'static str = "prescriptions";
    const LABEL: &'static str = "Prescription";

    type Draft = NewPrescription;
    type Changes = PrescriptionChanges;
    type Filter = PrescriptionFilter;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(draft: NewPrescription, id: Id, now: DateTime<Utc>) -> Result<Self, AppError> {
        let patient = non_blank(draft.patient_user_id);
        let doctor = non_blank(draft.doctor_user_id);
        let medication = non_blank(draft.medication_name);
        let dosage = non_blank(draft.dosage);
        let frequency = non_blank(draft.frequency);
        let duration = non_blank(draft.duration);
        require_fields(&[
            ("patient_user_id", patient.is_some()),
            ("doctor_user_id", doctor.is_some()),
            ("medication_name", medication.is_some()),
            ("dosage", dosage.is_some()),
            ("frequency", frequency.is_some()),
            ("duration", duration.is_some()),
        ])?;

        Ok(Self {
            id,
            patient_user_id: patient.unwrap_or_default(),
            doctor_user_id: doctor.unwrap_or_default(),
            prescription_date: draft.prescription_date.unwrap_or(now),
            medication_name: medication.unwrap_or_default(),
            dosage: dosage.unwrap_or_default(),
            frequency: frequency.unwrap_or_default(),
            duration: duration.unwrap_or_default(),
            notes: draft.notes,
            status: draft.status.unwrap_or(PrescriptionStatus::Active),
            fulfilled_by_pharmacist_user_id: None,
            fulfilled_date: None,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_changes(&mut self, changes: PrescriptionChanges) -> Result<bool, AppError> {
        let mut changed = false;
        changed |= changes.status.apply_required("status", &mut self.status)?;
        changed |= changes.notes.apply_optional(&mut self.notes);
        changed |= changes.dosage.apply_required("dosage", &mut self.dosage)?;
        changed |= changes.frequency.apply_required("frequency", &mut self.frequency)?;
        changed |= changes.duration.apply_required("duration", &mut self.duration)?;
        // The pharmacist reference is only ever written by fulfillment.
        let fulfilling = changes
            .fulfilled_by_pharmacist_user_id
            .apply_once("fulfilled_by_pharmacist_user_id", &mut self.fulfilled_by_pharmacist_user_id)?;
        if fulfilling && self.status != PrescriptionStatus::Filled {
            return Err(AppError::validation(
                "fulfilled_by_pharmacist_user_id can only be set when status is 'filled'",
            ));
        }
        changed |= fulfilling;
        changed |= changes.fulfilled_date.apply_once("fulfilled_date", &mut self.fulfilled_date)?;
        Ok(changed)
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn matches(&self, filter: &PrescriptionFilter) -> bool {
        matches_exact(&filter.patient_user_id, &self.patient_user_id)
            && matches_exact(&filter.doctor_user_id, &self.doctor_user_id)
            && filter
                .fulfilled_by_pharmacist_user_id
                .as_deref()
                .map_or(true, |p| self.fulfilled_by_pharmacist_user_id.as_deref() == Some(p))
            && filter.status.map_or(true, |s| s == self.status)
            && TimeWindow::new(filter.prescription_date_after, filter.prescription_date_before)
                .contains(self.prescription_date)
    }

    fn listing_order(a: &Self, b: &Self) -> Ordering {
        b.prescription_date
            .cmp(&a.prescription_date)
            .then_with(|| a.id.cmp(&b.id))
    }

    fn owner_refs(&self) -> Vec<OwnerRef> {
        let mut refs = vec![
            OwnerRef::user("patient", &self.patient_user_id),
            OwnerRef::user("doctor", &self.doctor_user_id),
        ];
        if let Some(pharmacist) = &self.fulfilled_by_pharmacist_user_id {
            refs.push(OwnerRef::user("pharmacist", pharmacist));
        }
        refs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn prescription() -> Prescription {
        let draft: NewPrescription = serde_json::from_value(json!({
            "patient_user_id": "P1",
            "doctor_user_id": "D1",
            "medication_name": "Amoxicillin",
            "dosage": "500mg",
            "frequency": "Every 8 hours",
            "duration": "10 days",
        }))
        .unwrap();
        Prescription::from_draft(draft, "rx-1".to_string(), Utc::now()).unwrap()
    }

    #[test]
    fn pharmacist_section_appears_only_once_fulfilled() {
        let mut rx = prescription();
        assert_eq!(rx.owner_refs().len(), 2);

        let changes: PrescriptionChanges = serde_json::from_value(json!({
            "status": "filled",
            "fulfilled_by_pharmacist_user_id": "PH1",
            "fulfilled_date": "2025-01-02T12:00:00Z",
        }))
        .unwrap();
        assert!(rx.apply_changes(changes).unwrap());
        assert_eq!(rx.status, PrescriptionStatus::Filled);
        assert_eq!(rx.owner_refs()[2], OwnerRef::user("pharmacist", "PH1"));
    }

    #[test]
    fn fulfillment_fields_are_write_once() {
        let mut rx = prescription();
        let fulfil: PrescriptionChanges = serde_json::from_value(json!({
            "status": "filled",
            "fulfilled_by_pharmacist_user_id": "PH1",
        }))
        .unwrap();
        assert!(rx.apply_changes(fulfil).unwrap());

        let repoint: PrescriptionChanges =
            serde_json::from_value(json!({"fulfilled_by_pharmacist_user_id": "PH2"})).unwrap();
        assert!(matches!(rx.clone().apply_changes(repoint), Err(AppError::Validation(_))));

        let clear: PrescriptionChanges =
            serde_json::from_value(json!({"fulfilled_by_pharmacist_user_id": null})).unwrap();
        assert!(matches!(rx.clone().apply_changes(clear), Err(AppError::Validation(_))));

        let mut unfilled = prescription();
        let sneak: PrescriptionChanges =
            serde_json::from_value(json!({"fulfilled_by_pharmacist_user_id": "PH1"})).unwrap();
        assert!(unfilled.apply_changes(sneak).is_err());
    }

    #[test]
    fn missing_fields_are_reported_together() {
        let err = Prescription::from_draft(NewPrescription::default(), "rx-2".to_string(), Utc::now())
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("medication_name"));
        assert!(message.contains("duration"));
    }
}
