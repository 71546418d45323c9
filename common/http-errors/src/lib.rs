use axum::{http::{StatusCode, HeaderValue}, response::{IntoResponse, Response}, Json};
use serde::Serialize;

/// Wire shape shared by every failed request: `{"success": false, "error": <status>, "message": ...}`.
#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub success: bool,
    pub error: u16,
    pub message: String,
}

impl ErrorBody {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { success: false, error: status.as_u16(), message: message.into() }
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest { code: &'static str, message: Option<String> },
    NotFound { code: &'static str },
    Unprocessable { code: &'static str, message: Option<String> },
    Internal { message: Option<String> },
}

impl ApiError {
    pub fn internal<E: std::fmt::Display>(e: E) -> Self { Self::Internal { message: Some(e.to_string()) } }
    pub fn bad_request(code: &'static str) -> Self { Self::BadRequest { code, message: None } }
    pub fn not_found(code: &'static str) -> Self { Self::NotFound { code } }
    pub fn unprocessable(code: &'static str) -> Self { Self::Unprocessable { code, message: None } }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Unprocessable { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest { code, .. }
            | ApiError::NotFound { code }
            | ApiError::Unprocessable { code, .. } => code,
            ApiError::Internal { .. } => "internal_error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_code = self.code();
        // Internal detail goes to the log; clients only ever see the generic message.
        let message = match self {
            ApiError::BadRequest { message, .. } => message.unwrap_or_else(|| "bad request".into()),
            ApiError::NotFound { .. } => "resource not found".into(),
            ApiError::Unprocessable { message, .. } => message.unwrap_or_else(|| "unprocessable".into()),
            ApiError::Internal { message } => {
                if let Some(detail) = message {
                    tracing::error!(error = %detail, "internal error");
                }
                "internal server error".into()
            }
        };
        let mut resp = (status, Json(ErrorBody::new(status, message))).into_response();
        if let Ok(val) = HeaderValue::from_str(error_code) {
            resp.headers_mut().insert("X-Error-Code", val);
        }
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
