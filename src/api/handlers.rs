use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::api::extract::{ValidJson, ValidQuery};
use crate::error::{AppError, ErrorResponse};
use crate::logic::{patient_history, Aggregator, FulfillmentRequest, WriteCoordinator};
use crate::model::{IntervalResource, MergedView, Record};
use crate::remote::RemoteCollections;
use crate::store::{RecordStore, Store};

/// Everything a request handler needs, shared behind one `Arc`.
pub struct AppState<S: Store> {
    pub store: Arc<S>,
    pub aggregator: Aggregator,
    pub coordinator: WriteCoordinator<S>,
}

impl<S: Store> AppState<S> {
    pub fn new(store: Arc<S>, remote: Arc<dyn RemoteCollections>, max_concurrency: usize) -> Self {
        Self {
            aggregator: Aggregator::new(Arc::clone(&remote), max_concurrency),
            coordinator: WriteCoordinator::new(Arc::clone(&store), remote),
            store,
        }
    }
}

pub type SharedState<S> = Arc<AppState<S>>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

/// List records matching the query filter, each merged with its remote sections.
pub async fn list_records<S: Store, R: Record>(
    State(state): State<SharedState<S>>,
    ValidQuery(filter): ValidQuery<R::Filter>,
) -> Result<Json<Vec<MergedView>>, AppError> {
    let records: Vec<R> = state.store.list_records(&filter).await?;
    let views = state.aggregator.list(&*state.store, &records).await?;
    Ok(Json(views))
}

pub async fn get_record<S: Store, R: Record>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> Result<Json<MergedView>, AppError> {
    let record: R = state.store.get_record(&id).await?;
    let view = state.aggregator.detail(&*state.store, &record).await?;
    Ok(Json(view))
}

pub async fn create_record<S: Store, R: Record>(
    State(state): State<SharedState<S>>,
    ValidJson(draft): ValidJson<R::Draft>,
) -> Result<(StatusCode, Json<R>), AppError> {
    let record = state.coordinator.create::<R>(draft).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Create an interval resource behind the overlap check.
pub async fn create_interval<S: Store, R: IntervalResource>(
    State(state): State<SharedState<S>>,
    ValidJson(draft): ValidJson<R::Draft>,
) -> Result<(StatusCode, Json<R>), AppError> {
    let record = state.coordinator.create_interval::<R>(draft).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// Partial update (PATCH and PUT alike); responds with the re-aggregated record.
pub async fn update_record<S: Store, R: Record>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
    ValidJson(changes): ValidJson<R::Changes>,
) -> Result<Json<MergedView>, AppError> {
    let record = state.coordinator.update::<R>(&id, changes).await?;
    let view = state.aggregator.detail(&*state.store, &record).await?;
    Ok(Json(view))
}

pub async fn update_interval<S: Store, R: IntervalResource>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
    ValidJson(changes): ValidJson<R::Changes>,
) -> Result<Json<MergedView>, AppError> {
    let record = state.coordinator.update_interval::<R>(&id, changes).await?;
    let view = state.aggregator.detail(&*state.store, &record).await?;
    Ok(Json(view))
}

pub async fn delete_record<S: Store, R: Record>(
    State(state): State<SharedState<S>>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.coordinator.delete::<R>(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Delegate prescription fulfillment to the prescription service.
pub async fn fulfill_prescription<S: Store>(
    State(state): State<SharedState<S>>,
    ValidJson(request): ValidJson<FulfillmentRequest>,
) -> Result<Json<Value>, AppError> {
    let body = state.coordinator.fulfill_prescription(request).await?;
    Ok(Json(body))
}

pub async fn get_patient_history<S: Store>(
    State(state): State<SharedState<S>>,
    Path(patient_id): Path<String>,
) -> Json<MergedView> {
    Json(patient_history(&state.aggregator, &*state.store, &patient_id).await)
}

pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed
}

pub async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("Resource not found")),
    )
        .into_response()
}
