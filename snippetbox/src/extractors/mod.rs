//! Request extractors
//!
//! [`DecodedForm`] decodes an urlencoded body into a typed form. Any decode
//! failure, wrong content type or malformed field, is a plain 400 in the
//! application's error envelope instead of axum's text rejection.

use axum::extract::{Form, FromRequest, Request};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// Urlencoded form body decoded into `T`
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodedForm<T>(pub T);

impl<T, S> FromRequest<S> for DecodedForm<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Form::<T>::from_request(req, state).await {
            Ok(Form(value)) => Ok(Self(value)),
            Err(rejection) => {
                tracing::debug!(error = %rejection, "form decode failed");
                Err(AppError::bad_request())
            }
        }
    }
}
