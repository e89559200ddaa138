use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::AppError;
use crate::model::{
    matches_exact, require_fields, ChangeSet, Id, OwnerRef, Patch, Record, TimeWindow,
};

/// A narrative report a doctor writes about a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoctorReport {
    pub id: Id,
    pub patient_user_id: Id,
    pub doctor_user_id: Id,
    pub report_date: DateTime<Utc>,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewDoctorReport {
    pub patient_user_id: Option<Id>,
    pub doctor_user_id: Option<Id>,
    pub report_date: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorReportChanges {
    #[serde(default)]
    pub title: Patch<String>,
    #[serde(default)]
    pub content: Patch<String>,
    #[serde(default)]
    pub report_date: Patch<DateTime<Utc>>,
}

impl ChangeSet for DoctorReportChanges {
    fn is_empty(&self) -> bool {
        self.title.is_absent() && self.content.is_absent() && self.report_date.is_absent()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DoctorReportFilter {
    pub patient_user_id: Option<Id>,
    pub doctor_user_id: Option<Id>,
    pub report_date_after: Option<DateTime<Utc>>,
    pub report_date_before: Option<DateTime<Utc>>,
}

impl Record for DoctorReport {
    const COLLECTION: &'static str = "doctor-reports";
    const LABEL: &'static str = "Doctor Report";

    type Draft = NewDoctorReport;
    type Changes = DoctorReportChanges;
    type Filter = DoctorReportFilter;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(draft: NewDoctorReport, id: Id, now: DateTime<Utc>) -> Result<Self, AppError> {
        let patient = draft.patient_user_id.filter(|v| !v.trim().is_empty());
        let doctor = draft.doctor_user_id.filter(|v| !v.trim().is_empty());
        let title = draft.title.filter(|v| !v.trim().is_empty());
        let content = draft.content.filter(|v| !v.trim().is_empty());
        require_fields(&[
            ("patient_user_id", patient.is_some()),
            ("doctor_user_id", doctor.is_some()),
            ("title", title.is_some()),
            ("content", content.is_some()),
        ])?;

        Ok(Self {
            id,
            patient_user_id: patient.unwrap_or_default(),
            doctor_user_id: doctor.unwrap_or_default(),
            report_date: draft.report_date.unwrap_or(now),
            title: title.unwrap_or_default(),
            content: content.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_changes(&mut self, changes: DoctorReportChanges) -> Result<bool, AppError> {
        let mut changed = changes.title.apply_required("title", &mut self.title)?;
        changed |= changes.content.apply_required("content", &mut self.content)?;
        changed |= changes.report_date.apply_required("report_date", &mut self.report_date)?;
        Ok(changed)
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn matches(&self, filter: &DoctorReportFilter) -> bool {
        matches_exact(&filter.patient_user_id, &self.patient_user_id)
            && matches_exact(&filter.doctor_user_id, &self.doctor_user_id)
            && TimeWindow::new(filter.report_date_after, filter.report_date_before)
                .contains(self.report_date)
    }

    fn listing_order(a: &Self, b: &Self) -> Ordering {
        b.report_date.cmp(&a.report_date).then_with(|| a.id.cmp(&b.id))
    }

    fn owner_refs(&self) -> Vec<OwnerRef> {
        vec![
            OwnerRef::user("patient", &self.patient_user_id),
            OwnerRef::user("doctor", &self.doctor_user_id),
        ]
    }
}
