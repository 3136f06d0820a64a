//! Response envelope and error mapping.
//!
//! Every response body is `{ "success": bool, "message": str, "data": any }`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use serde_json::json;

use cg_domain::{Error, SubjectKey};

#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub message: String,
    pub data: T,
}

/// A successful `200 OK` envelope.
pub fn ok<T: Serialize>(message: impl Into<String>, data: T) -> Response {
    Json(Envelope {
        success: true,
        message: message.into(),
        data,
    })
    .into_response()
}

/// Domain error carried out of a handler.
#[derive(Debug)]
pub struct ApiError(pub Error);

pub type ApiResult<T = Response> = std::result::Result<T, ApiError>;

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

/// Log `err` against the caller's subject and conversation, then hand it
/// back for the response.  Handlers route every failure through here.
pub fn rejected(err: Error, subject: Option<&SubjectKey>, conversation_id: Option<i64>) -> ApiError {
    err.log(subject.map(SubjectKey::as_str), conversation_id);
    ApiError(err)
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::QuotaExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::NotFound => StatusCode::NOT_FOUND,
            Error::GatewayFailure(_)
            | Error::GatewayMisconfigured(_)
            | Error::Storage(_)
            | Error::Json(_)
            | Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> &'static str {
        match &self.0 {
            Error::Unauthenticated(_) => "Unauthorized",
            Error::Validation(_) => "Invalid Input",
            Error::QuotaExceeded { .. } => "Usage Limit Exceeded",
            Error::NotFound => "Not Found",
            Error::GatewayFailure(_) => "Completion Failed",
            Error::GatewayMisconfigured(_) => "API Key Missing",
            Error::Storage(_) | Error::Json(_) | Error::Config(_) => "Internal Error",
        }
    }

    /// Client-facing detail.  Server-side failures get a fixed text; the
    /// underlying cause is only logged.
    fn data(&self) -> serde_json::Value {
        let kind = self.0.kind();
        match &self.0 {
            Error::Unauthenticated(msg) | Error::Validation(msg) => {
                json!({ "error": msg, "kind": kind })
            }
            Error::QuotaExceeded {
                used_minutes,
                limit_minutes,
            } => json!({
                "error": format!(
                    "daily limit of {limit_minutes} minutes reached ({used_minutes} used)"
                ),
                "kind": kind,
                "used_minutes": used_minutes,
                "limit_minutes": limit_minutes,
            }),
            Error::NotFound => json!({
                "error": "conversation not found or not owned by caller",
                "kind": kind,
            }),
            Error::GatewayFailure(_) => json!({
                "error": "the completion service did not return a reply",
                "kind": kind,
            }),
            Error::GatewayMisconfigured(_) => json!({
                "error": "the completion service is not configured",
                "kind": kind,
            }),
            Error::Storage(_) | Error::Json(_) | Error::Config(_) => json!({
                "error": "internal error",
                "kind": kind,
            }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Envelope {
            success: false,
            message: self.message().to_owned(),
            data: self.data(),
        };
        (status, Json(body)).into_response()
    }
}
