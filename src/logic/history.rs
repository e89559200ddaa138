use serde_json::{json, Map, Value};
use std::collections::HashSet;

use crate::error::AppError;
use crate::logic::aggregate::{section_from, Aggregator};
use crate::logic::merge::nest;
use crate::model::{
    DoctorReport, DoctorReportFilter, LabOrder, LabOrderFilter, LabResult, LabResultFilter,
    MergedView, Prescription, PrescriptionFilter, Record, USERS,
};
use crate::store::{RecordStore, Store};

/// Remote collection holding patient profiles.
pub const PATIENTS: &str = "patients";
/// Remote collection holding vitals, already aggregated by its owner.
pub const VITALS: &str = "vitals";

type SectionResult = Result<Value, String>;

/// A patient's full medical history, one independent section per source.
///
/// Always succeeds: a section that cannot be built is replaced by its annotation.
pub async fn patient_history<S: Store>(aggregator: &Aggregator, store: &S, patient_id: &str) -> MergedView {
    let remote = aggregator.remote();
    let vitals_query = vec![("patient_user_id".to_string(), patient_id.to_string())];
    let report_filter = DoctorReportFilter {
        patient_user_id: Some(patient_id.to_string()),
        ..Default::default()
    };
    let prescription_filter = PrescriptionFilter {
        patient_user_id: Some(patient_id.to_string()),
        ..Default::default()
    };

    let (user, profile, vitals, orders, reports, prescriptions) = tokio::join!(
        remote.fetch(USERS, patient_id),
        remote.fetch(PATIENTS, patient_id),
        remote.query(VITALS, &vitals_query),
        patient_orders(store, patient_id),
        aggregated::<_, DoctorReport>(aggregator, store, &report_filter),
        aggregated::<_, Prescription>(aggregator, store, &prescription_filter),
    );

    // Orders are an intermediate stage: results hang off the patient's orders.
    let (lab_orders, lab_results) = match orders {
        Ok(orders) => {
            let results = patient_results(aggregator, store, &orders).await;
            (views_of(aggregator, store, &orders).await, results)
        }
        Err(reason) => (Err(reason.clone()), Err(reason)),
    };

    let mut fields = Map::new();
    fields.insert("patient_user_id".to_string(), json!(patient_id));
    let mut history = MergedView::from_fields(fields);

    let (data, reason) = section_from(user, USERS, patient_id);
    nest(&mut history, "patient_user", data, reason);
    let (data, reason) = section_from(profile, PATIENTS, patient_id);
    nest(&mut history, "patient_profile", data, reason);
    let (data, reason) = section_from(vitals, VITALS, patient_id);
    nest(&mut history, "vitals_history", data, reason);

    for (name, section) in [
        ("lab_orders", lab_orders),
        ("lab_results", lab_results),
        ("doctor_reports", reports),
        ("prescriptions", prescriptions),
    ] {
        match section {
            Ok(data) => history.attach_data(name, data),
            Err(reason) => {
                log::warn!("history of {}: {} unavailable: {}", patient_id, name, reason);
                history.annotate(name, reason)
            }
        }
    }
    history
}

async fn patient_orders<S: Store>(store: &S, patient_id: &str) -> Result<Vec<LabOrder>, String> {
    let filter = LabOrderFilter {
        patient_user_id: Some(patient_id.to_string()),
        ..Default::default()
    };
    store
        .list_records(&filter)
        .await
        .map_err(|e| format!("Error fetching lab orders: {}", e))
}

async fn patient_results<S: Store>(aggregator: &Aggregator, store: &S, orders: &[LabOrder]) -> SectionResult {
    if orders.is_empty() {
        return Ok(Value::Array(Vec::new()));
    }
    let order_ids: HashSet<&str> = orders.iter().map(|o| o.id()).collect();

    let mut results: Vec<LabResult> = store
        .list_records(&LabResultFilter::default())
        .await
        .map_err(|e| format!("Error fetching lab results: {}", e))?;
    results.retain(|r| order_ids.contains(r.lab_order_id.as_str()));

    views_of(aggregator, store, &results).await
}

async fn aggregated<S: Store, R: Record>(aggregator: &Aggregator, store: &S, filter: &R::Filter) -> SectionResult {
    let records: Vec<R> = store
        .list_records(filter)
        .await
        .map_err(|e| format!("Error fetching {}: {}", R::COLLECTION, e))?;
    views_of(aggregator, store, &records).await
}

async fn views_of<S: Store, R: Record>(aggregator: &Aggregator, store: &S, records: &[R]) -> SectionResult {
    let views = aggregator
        .list(store, records)
        .await
        .map_err(|e: AppError| e.to_string())?;
    Ok(Value::Array(views.into_iter().map(MergedView::into_value).collect()))
}
