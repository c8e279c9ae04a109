//! JSON body extractor whose rejections use the standard error envelope.

use crate::error::AppError;
use async_trait::async_trait;
use axum::extract::{FromRequest, Json, Request};
use serde::de::DeserializeOwned;

pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        Json::<T>::from_request(req, state)
            .await
            .map(|Json(value)| JsonBody(value))
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))
    }
}
