use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::error::AppError;
use crate::logic::conflict::{find_conflict, ConflictGuard};
use crate::model::{generate_id, require_text, ChangeSet, Id, IntervalResource, Prescription, Record};
use crate::remote::{Outcome, RemoteCollections};
use crate::store::{RecordStore, Store};

/// Request to mark a prescription filled in the service that owns it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FulfillmentRequest {
    pub prescription_id: Option<Id>,
    pub pharmacist_user_id: Option<Id>,
}

/// Commits local writes and delegates the one cross-service mutation.
pub struct WriteCoordinator<S: Store> {
    store: Arc<S>,
    remote: Arc<dyn RemoteCollections>,
    guard: ConflictGuard,
}

impl<S: Store> WriteCoordinator<S> {
    pub fn new(store: Arc<S>, remote: Arc<dyn RemoteCollections>) -> Self {
        Self {
            store,
            remote,
            guard: ConflictGuard::new(),
        }
    }

    pub async fn create<R: Record>(&self, draft: R::Draft) -> Result<R, AppError> {
        let record = R::from_draft(draft, generate_id(), Utc::now())?;
        let created = self.store.create_record(record).await?;
        log::info!("Created {} {}", R::LABEL, created.id());
        Ok(created)
    }

    /// Create an interval record, rejecting it if an active interval of the same
    /// owner overlaps. The scan and the write happen under the owner's lock.
    pub async fn create_interval<R: IntervalResource>(&self, draft: R::Draft) -> Result<R, AppError> {
        let record = R::from_draft(draft, generate_id(), Utc::now())?;
        if !record.is_active() {
            return Ok(self.store.create_record(record).await?);
        }

        let _owner = self.guard.lock_owner(record.schedule_owner()).await;
        self.ensure_available(&record).await?;
        let created = self.store.create_record(record).await?;
        log::info!(
            "Booked {} {} for owner {}",
            R::LABEL,
            created.id(),
            created.schedule_owner()
        );
        Ok(created)
    }

    pub async fn update<R: Record>(&self, id: &str, changes: R::Changes) -> Result<R, AppError> {
        if changes.is_empty() {
            return Err(AppError::validation("No updatable fields provided"));
        }
        let mut record: R = self.store.get_record(id).await?;
        if !record.apply_changes(changes)? {
            return Ok(record);
        }
        record.touch(Utc::now());
        Ok(self.store.update_record(record).await?)
    }

    /// Update an interval record. A change that leaves it active is re-checked for
    /// overlaps, excluding the record's own current slot.
    pub async fn update_interval<R: IntervalResource>(&self, id: &str, changes: R::Changes) -> Result<R, AppError> {
        if changes.is_empty() {
            return Err(AppError::validation("No updatable fields provided"));
        }
        // The owner never changes through updates, so lock on the stored one and
        // re-read under the lock.
        let current: R = self.store.get_record(id).await?;
        let _owner = self.guard.lock_owner(current.schedule_owner()).await;

        let mut record: R = self.store.get_record(id).await?;
        if !record.apply_changes(changes)? {
            return Ok(record);
        }
        if record.is_active() {
            self.ensure_available(&record).await?;
        }
        record.touch(Utc::now());
        Ok(self.store.update_record(record).await?)
    }

    pub async fn delete<R: Record>(&self, id: &str) -> Result<(), AppError> {
        self.store.delete_record::<R>(id).await?;
        log::info!("Deleted {} {}", R::LABEL, id);
        Ok(())
    }

    async fn ensure_available<R: IntervalResource>(&self, candidate: &R) -> Result<(), AppError> {
        let existing: Vec<R> = self.store.list_records(&R::Filter::default()).await?;
        if let Some(taken) = find_conflict(&existing, candidate) {
            log::info!(
                "Rejected {} for owner {}: overlaps {}",
                R::LABEL,
                candidate.schedule_owner(),
                taken.id()
            );
            return Err(AppError::Conflict(R::UNAVAILABLE.to_string()));
        }
        Ok(())
    }

    /// Ask the prescription service to mark a prescription filled and relay its answer.
    ///
    /// Not idempotent and not retried: a failure after the remote committed is
    /// reported as an upstream error.
    pub async fn fulfill_prescription(&self, request: FulfillmentRequest) -> Result<Value, AppError> {
        let prescription_id = require_text("prescription_id", request.prescription_id)?;
        let pharmacist_user_id = require_text("pharmacist_user_id", request.pharmacist_user_id)?;

        let payload = json!({
            "status": "filled",
            "fulfilled_by_pharmacist_user_id": pharmacist_user_id,
            "fulfilled_date": Utc::now(),
        });
        let outcome = self
            .remote
            .patch(Prescription::COLLECTION, &prescription_id, payload)
            .await;

        match outcome {
            Outcome::Found(body) => {
                log::info!(
                    "Prescription {} fulfilled by pharmacist {}",
                    prescription_id,
                    pharmacist_user_id
                );
                Ok(body)
            }
            Outcome::NotFound | Outcome::RemoteError { status: 404, .. } => Err(AppError::NotFound(
                format!("Prescription not found: {}", prescription_id),
            )),
            Outcome::RemoteError { status: 400, body } => Err(AppError::Validation(body)),
            Outcome::RemoteError { status: 409, body } => Err(AppError::Conflict(body)),
            other => {
                let reason = other.reason(Prescription::COLLECTION, &prescription_id);
                Err(AppError::upstream("Prescription service failed to fulfill the prescription", reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Appointment, AppointmentChanges, AppointmentStatus, NewAppointment, Patch};
    use crate::remote::StubRemote;
    use crate::store::MemoryStore;
    use chrono::{DateTime, TimeZone};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, hour, minute, 0).unwrap()
    }

    fn draft(doctor: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> NewAppointment {
        NewAppointment {
            patient_user_id: Some("P1".to_string()),
            doctor_user_id: Some(doctor.to_string()),
            start_time: Some(start),
            end_time: Some(end),
            ..Default::default()
        }
    }

    fn coordinator(remote: StubRemote) -> WriteCoordinator<MemoryStore> {
        WriteCoordinator::new(Arc::new(MemoryStore::new()), Arc::new(remote))
    }

    #[tokio::test]
    async fn cancelling_frees_the_slot() {
        let coordinator = coordinator(StubRemote::new());
        let first: Appointment = coordinator
            .create_interval(draft("D1", at(9, 0), at(10, 0)))
            .await
            .unwrap();

        let err = coordinator
            .create_interval::<Appointment>(draft("D1", at(9, 30), at(10, 30)))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let cancel = AppointmentChanges {
            status: Patch::Value(AppointmentStatus::Cancelled),
            ..Default::default()
        };
        coordinator
            .update_interval::<Appointment>(&first.id, cancel)
            .await
            .unwrap();

        coordinator
            .create_interval::<Appointment>(draft("D1", at(9, 30), at(10, 30)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reschedule_checks_other_slots_only() {
        let coordinator = coordinator(StubRemote::new());
        let first: Appointment = coordinator
            .create_interval(draft("D1", at(9, 0), at(10, 0)))
            .await
            .unwrap();
        coordinator
            .create_interval::<Appointment>(draft("D1", at(11, 0), at(12, 0)))
            .await
            .unwrap();

        // Shifting within its own old slot is fine.
        let shift = AppointmentChanges {
            start_time: Patch::Value(at(9, 30)),
            end_time: Patch::Value(at(10, 30)),
            ..Default::default()
        };
        let moved = coordinator
            .update_interval::<Appointment>(&first.id, shift)
            .await
            .unwrap();
        assert_eq!(moved.start_time, at(9, 30));

        let collide = AppointmentChanges {
            end_time: Patch::Value(at(11, 15)),
            ..Default::default()
        };
        let err = coordinator
            .update_interval::<Appointment>(&first.id, collide)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn empty_update_is_rejected() {
        let coordinator = coordinator(StubRemote::new());
        let first: Appointment = coordinator
            .create_interval(draft("D1", at(9, 0), at(10, 0)))
            .await
            .unwrap();
        let err = coordinator
            .update_interval::<Appointment>(&first.id, AppointmentChanges::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "No updatable fields provided");
    }

    #[tokio::test]
    async fn concurrent_bookings_admit_exactly_one() {
        let coordinator = Arc::new(coordinator(StubRemote::new()));
        let attempts = (0..8).map(|_| {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .create_interval::<Appointment>(draft("D1", at(9, 0), at(10, 0)))
                    .await
            })
        });

        let mut booked = 0;
        for attempt in futures::future::join_all(attempts).await {
            if attempt.unwrap().is_ok() {
                booked += 1;
            }
        }
        assert_eq!(booked, 1);
    }

    #[tokio::test]
    async fn fulfillment_relays_remote_outcome() {
        let remote = StubRemote::new()
            .with_mutation(
                "prescriptions",
                "rx-1",
                Outcome::Found(json!({"id": "rx-1", "status": "filled"})),
            )
            .with_mutation(
                "prescriptions",
                "rx-2",
                Outcome::RemoteError {
                    status: 400,
                    body: "Invalid status".to_string(),
                },
            )
            .with_mutation(
                "prescriptions",
                "rx-3",
                Outcome::RemoteError {
                    status: 503,
                    body: "maintenance".to_string(),
                },
            );
        let coordinator = coordinator(remote);
        let request = |id: &str| FulfillmentRequest {
            prescription_id: Some(id.to_string()),
            pharmacist_user_id: Some("PH1".to_string()),
        };

        let body = coordinator.fulfill_prescription(request("rx-1")).await.unwrap();
        assert_eq!(body["status"], "filled");

        let err = coordinator.fulfill_prescription(request("rx-2")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let err = coordinator.fulfill_prescription(request("rx-3")).await.unwrap_err();
        assert!(matches!(err, AppError::Upstream { .. }));

        let err = coordinator.fulfill_prescription(request("rx-404")).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let err = coordinator
            .fulfill_prescription(FulfillmentRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
