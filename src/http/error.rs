use crate::dto::ErrorBody;
use crate::http::media::KAFKA_V2_JSON;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use kafka_rest_types::Error;
use tracing::{error, warn};

/// A gateway error on its way to an HTTP caller.
#[derive(Debug)]
pub struct ApiError(pub Error);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected: {}", self.0);
        }
        (
            status,
            [(header::CONTENT_TYPE, KAFKA_V2_JSON)],
            Json(ErrorBody::from(&self.0)),
        )
            .into_response()
    }
}

/// JSON request body whose rejections render as gateway errors.
pub struct KafkaJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for KafkaJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| KafkaJson(value))
            .map_err(|rejection| ApiError(Error::InvalidDataFormat(rejection.body_text())))
    }
}
