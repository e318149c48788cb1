//! Extractors whose rejections use the JSON error envelope

use async_trait::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request};
use axum::http::request::Parts;
use axum::Json;
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// `Json<T>` that rejects a missing, malformed or mistyped body with a
/// 400 `bad_request` body instead of axum's plain-text 415/422.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

/// `Path<T>`; an unparsable segment is a 400 `bad_request` body.
#[derive(Debug, Clone, Copy)]
pub struct ApiPath<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(ApiPath(value))
    }
}

/// `Query<T>`; an unparsable query string is a 400 `bad_request` body.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(ApiQuery(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{self, header, StatusCode};
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Dose {
        prescription_id: i64,
        quantity: i64,
    }

    fn request(body: &str, content_type: Option<&str>) -> Request {
        let mut builder = http::Request::builder().method("POST").uri("/");
        if let Some(value) = content_type {
            builder = builder.header(header::CONTENT_TYPE, value);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn well_formed_body_is_extracted() {
        let ApiJson(dose) = ApiJson::<Dose>::from_request(
            request(r#"{"prescription_id": 3, "quantity": 2}"#, Some("application/json")),
            &(),
        )
        .await
        .unwrap();
        assert_eq!((dose.prescription_id, dose.quantity), (3, 2));
    }

    #[tokio::test]
    async fn missing_field_is_a_json_bad_request() {
        let body = request(r#"{"quantity": 2}"#, Some("application/json"));
        let err = ApiJson::<Dose>::from_request(body, &()).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_type(), "bad_request");
        assert!(err.to_string().contains("prescription_id"));
    }

    #[tokio::test]
    async fn missing_content_type_is_a_json_bad_request() {
        let err = ApiJson::<Dose>::from_request(request("{}", None), &()).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[derive(Debug, Deserialize)]
    struct Window {
        days: Option<i64>,
    }

    #[tokio::test]
    async fn non_numeric_query_value_is_a_json_bad_request() {
        let (mut parts, _) = http::Request::builder()
            .uri("/inventory/near-expiry?days=soon")
            .body(())
            .unwrap()
            .into_parts();
        let err = ApiQuery::<Window>::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_type(), "bad_request");

        let (mut parts, _) = http::Request::builder()
            .uri("/inventory/near-expiry?days=14")
            .body(())
            .unwrap()
            .into_parts();
        let ApiQuery(window) = ApiQuery::<Window>::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(window.days, Some(14));
    }
}
