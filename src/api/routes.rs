use axum::{
    routing::{get, post},
    Router,
};

use crate::api::handlers::{self, SharedState};
use crate::model::{
    Appointment, DoctorReport, IntervalResource, LabOrder, LabResult, LabTechnician, Pharmacist,
    Prescription, Record,
};
use crate::store::Store;

pub fn create_router<S: Store>() -> Router<SharedState<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Interval resources go through the conflict guard
        .merge(interval_collection::<S, Appointment>())
        // Plain local collections
        .merge(collection::<S, Prescription>())
        .merge(collection::<S, LabOrder>())
        .merge(collection::<S, LabResult>())
        .merge(collection::<S, DoctorReport>())
        .merge(collection::<S, Pharmacist>())
        .merge(collection::<S, LabTechnician>())
        // Cross-service operations
        .route(
            "/fulfillments",
            post(handlers::fulfill_prescription::<S>).fallback(handlers::method_not_allowed),
        )
        .route(
            "/patients/:id/history",
            get(handlers::get_patient_history::<S>).fallback(handlers::method_not_allowed),
        )
        .fallback(handlers::not_found)
}

fn collection<S: Store, R: Record>() -> Router<SharedState<S>> {
    Router::new()
        .route(
            &format!("/{}", R::COLLECTION),
            get(handlers::list_records::<S, R>)
                .post(handlers::create_record::<S, R>)
                .fallback(handlers::method_not_allowed),
        )
        .route(
            &format!("/{}/:id", R::COLLECTION),
            get(handlers::get_record::<S, R>)
                .patch(handlers::update_record::<S, R>)
                .put(handlers::update_record::<S, R>)
                .delete(handlers::delete_record::<S, R>)
                .fallback(handlers::method_not_allowed),
        )
}

fn interval_collection<S: Store, R: IntervalResource>() -> Router<SharedState<S>> {
    Router::new()
        .route(
            &format!("/{}", R::COLLECTION),
            get(handlers::list_records::<S, R>)
                .post(handlers::create_interval::<S, R>)
                .fallback(handlers::method_not_allowed),
        )
        .route(
            &format!("/{}/:id", R::COLLECTION),
            get(handlers::get_record::<S, R>)
                .patch(handlers::update_interval::<S, R>)
                .put(handlers::update_interval::<S, R>)
                .delete(handlers::delete_record::<S, R>)
                .fallback(handlers::method_not_allowed),
        )
}
