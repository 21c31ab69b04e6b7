//! 请求体提取器
//!
//! `ValidatedJson<T>`: 反序列化失败或 `validator` 校验失败都返回 400 + `ApiResponse` 错误体，
//! 而不是 axum 默认的纯文本拒绝。

use axum::Json;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::utils::{AppError, ErrorCode};

pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| {
                AppError::with_message(ErrorCode::InvalidFormat, rejection.body_text())
            })?;

        value
            .validate()
            .map_err(|e| AppError::validation(e.to_string()))?;

        Ok(Self(value))
    }
}
