//! Pieces shared by the route modules.
//!
//! Handlers return [`ApiResult`] and use `?` on service calls; request
//! bodies are read through [`Payload`] so that a body that does not decode
//! gets the same error envelope as every other failure. Field validation
//! lives in the services.

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    http::StatusCode,
    Json,
};
use serde::{de::DeserializeOwned, Serialize};

use crate::{errors::ApiError, ApiResponse};

pub type ApiResult<T> = Result<T, ApiError>;

/// Wraps `data` in the success envelope with the given status.
pub fn respond<T: Serialize>(status: StatusCode, data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    (status, Json(ApiResponse::success(data)))
}

pub fn ok<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    respond(StatusCode::OK, data)
}

pub fn created<T: Serialize>(data: T) -> (StatusCode, Json<ApiResponse<T>>) {
    respond(StatusCode::CREATED, data)
}

/// JSON request body.
pub struct Payload<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Payload<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Payload(value))
    }
}
