use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Query, Request},
    http::request::Parts,
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// JSON body extractor whose rejections render as a ValidationError.
///
/// Malformed JSON, schema mismatches (unknown enum values, naive timestamps) and a
/// missing or wrong `Content-Type` all become `400 {"error": ...}`; axum's 415 and 422
/// rejections are folded into ValidationError.
#[derive(Debug, Clone)]
pub struct ValidJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ValidJson(value)),
            Err(rejection) => Err(AppError::validation(rejection.body_text())),
        }
    }
}

/// Query-string extractor whose rejections render as a ValidationError.
#[derive(Debug, Clone)]
pub struct ValidQuery<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for ValidQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ValidQuery(value)),
            Err(rejection) => Err(AppError::validation(rejection.body_text())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AppointmentFilter;
    use axum::http::Request as HttpRequest;

    #[tokio::test]
    async fn query_rejection_is_a_validation_error() {
        let (mut parts, _) = HttpRequest::builder()
            .uri("/appointments?status=pending")
            .body(())
            .unwrap()
            .into_parts();

        let err = ValidQuery::<AppointmentFilter>::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn missing_content_type_is_a_validation_error() {
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/appointments")
            .body(axum::body::Body::from(r#"{"doctor_user_id": "D1"}"#))
            .unwrap();

        let err = ValidJson::<AppointmentFilter>::from_request(request, &())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn query_accepts_window_bounds() {
        let (mut parts, _) = HttpRequest::builder()
            .uri("/appointments?doctor_user_id=D1&start_time_after=2025-01-01T00:00:00Z")
            .body(())
            .unwrap()
            .into_parts();

        let ValidQuery(filter) = ValidQuery::<AppointmentFilter>::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(filter.doctor_user_id.as_deref(), Some("D1"));
        assert!(filter.start_time_after.is_some());
    }
}
