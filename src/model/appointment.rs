use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::error::AppError;
use crate::model::{
    matches_exact, require_fields, ChangeSet, Id, IntervalResource, OwnerRef, Patch, Record, TimeWindow,
};

/// Appointment lifecycle. `Booked` is the only active state; the rest are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Booked,
    Completed,
    Cancelled,
    #[serde(alias = "no-show", alias = "no_show")]
    NoShow,
}

impl AppointmentStatus {
    pub fn is_active(self) -> bool {
        self == AppointmentStatus::Booked
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    /// Booked may move to any terminal state; terminal states only to themselves.
    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        self == next || self.is_active()
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            AppointmentStatus::Booked => write!(f, "booked"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "noshow"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Id,
    pub patient_user_id: Option<Id>,
    pub doctor_user_id: Id,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Appointment input model for creation. The doctor is the schedule owner.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewAppointment {
    #[serde(alias = "patientId")]
    pub patient_user_id: Option<Id>,
    #[serde(alias = "ownerId", alias = "owner_id")]
    pub doctor_user_id: Option<Id>,
    #[serde(alias = "start")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(alias = "end")]
    pub end_time: Option<DateTime<Utc>>,
    pub status: Option<AppointmentStatus>,
    pub notes: Option<String>,
}

/// Appointment update model for PATCH/PUT. Owners and creation time are fixed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentChanges {
    #[serde(default)]
    pub status: Patch<AppointmentStatus>,
    #[serde(default)]
    pub notes: Patch<String>,
    #[serde(default, alias = "start")]
    pub start_time: Patch<DateTime<Utc>>,
    #[serde(default, alias = "end")]
    pub end_time: Patch<DateTime<Utc>>,
}

impl ChangeSet for AppointmentChanges {
    fn is_empty(&self) -> bool {
        self.status.is_absent() && self.notes.is_absent() && self.start_time.is_absent() && self.end_time.is_absent()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppointmentFilter {
    pub patient_user_id: Option<Id>,
    #[serde(alias = "ownerId", alias = "owner_id")]
    pub doctor_user_id: Option<Id>,
    pub status: Option<AppointmentStatus>,
    pub start_time_after: Option<DateTime<Utc>>,
    pub start_time_before: Option<DateTime<Utc>>,
}

fn check_interval(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), AppError> {
    if start >= end {
        return Err(AppError::validation("start_time must be before end_time"));
    }
    Ok(())
}

impl Record for Appointment {
    const COLLECTION: &'static str = "appointments";
    const LABEL: &'static str = "Appointment";

    type Draft = NewAppointment;
    type Changes = AppointmentChanges;
    type Filter = AppointmentFilter;

    fn id(&self) -> &str {
        &self.id
    }

    fn from_draft(draft: NewAppointment, id: Id, now: DateTime<Utc>) -> Result<Self, AppError> {
        let doctor = draft.doctor_user_id.filter(|d| !d.trim().is_empty());
        require_fields(&[
            ("doctor_user_id", doctor.is_some()),
            ("start_time", draft.start_time.is_some()),
            ("end_time", draft.end_time.is_some()),
        ])?;
        let (Some(doctor_user_id), Some(start_time), Some(end_time)) =
            (doctor, draft.start_time, draft.end_time)
        else {
            return Err(AppError::validation("doctor_user_id, start_time and end_time are required"));
        };
        check_interval(start_time, end_time)?;

        Ok(Self {
            id,
            patient_user_id: draft.patient_user_id.filter(|p| !p.trim().is_empty()),
            doctor_user_id,
            start_time,
            end_time,
            status: draft.status.unwrap_or(AppointmentStatus::Booked),
            notes: draft.notes,
            created_at: now,
            updated_at: now,
        })
    }

    fn apply_changes(&mut self, changes: AppointmentChanges) -> Result<bool, AppError> {
        let reschedules = !changes.start_time.is_absent() || !changes.end_time.is_absent();
        if reschedules && self.status.is_terminal() {
            return Err(AppError::validation(format!(
                "Only booked appointments can be rescheduled (status is '{}')",
                self.status
            )));
        }

        let mut changed = false;
        if let Patch::Value(next) = &changes.status {
            if !self.status.can_transition_to(*next) {
                return Err(AppError::validation(format!(
                    "Cannot change status from '{}' to '{}'",
                    self.status, next
                )));
            }
        }
        changed |= changes.status.apply_required("status", &mut self.status)?;
        changed |= changes.notes.apply_optional(&mut self.notes);
        changed |= changes.start_time.apply_required("start_time", &mut self.start_time)?;
        changed |= changes.end_time.apply_required("end_time", &mut self.end_time)?;
        check_interval(self.start_time, self.end_time)?;
        Ok(changed)
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    fn matches(&self, filter: &AppointmentFilter) -> bool {
        filter
            .patient_user_id
            .as_deref()
            .map_or(true, |p| self.patient_user_id.as_deref() == Some(p))
            && matches_exact(&filter.doctor_user_id, &self.doctor_user_id)
            && filter.status.map_or(true, |s| s == self.status)
            && TimeWindow::new(filter.start_time_after, filter.start_time_before)
                .contains(self.start_time)
    }

    fn listing_order(a: &Self, b: &Self) -> Ordering {
        a.start_time.cmp(&b.start_time).then_with(|| a.id.cmp(&b.id))
    }

    fn owner_refs(&self) -> Vec<OwnerRef> {
        let mut refs = Vec::with_capacity(2);
        if let Some(patient) = &self.patient_user_id {
            refs.push(OwnerRef::user("patient", patient));
        }
        refs.push(OwnerRef::user("doctor", &self.doctor_user_id));
        refs
    }
}

impl IntervalResource for Appointment {
    const UNAVAILABLE: &'static str = "Doctor is not available during this time slot.";

    fn schedule_owner(&self) -> &str {
        &self.doctor_user_id
    }

    fn interval(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.start_time, self.end_time)
    }

    fn is_active(&self) -> bool {
        self.status.is_active()
    }
}
