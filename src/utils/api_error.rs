#![forbid(unsafe_code)]

//! The request-facing error taxonomy. Every `v1` handler resolves its
//! fallible work into an `ApiError`, then converts it into the endpoint's
//! own `poem_openapi::ApiResponse` enum the way the teacher's
//! `make_http_4xx`/`make_http_5xx` helpers do, except the mapping from
//! kind to status lives here once instead of being re-derived per file.

use log::error;
use poem_openapi::Object;
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Object)]
pub struct ErrorBody {
    pub detail: String,
    #[oai(skip_serializing_if_is_none)]
    pub correlation_id: Option<String>,
    #[oai(skip_serializing_if_is_none)]
    pub overlapping_ids: Option<Vec<String>>,
}

impl ErrorBody {
    fn simple(detail: &str) -> Self {
        Self { detail: detail.to_string(), correlation_id: None, overlapping_ids: None }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("mfa_required")]
    MfaRequired,
    #[error("mfa_invalid")]
    MfaInvalid,
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String, Vec<String>),
    #[error("quota_exceeded: {0}")]
    QuotaExceeded(String),
    #[error("precondition: {0}")]
    Precondition(String),
    #[error("internal error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Validation(_) => 400,
            ApiError::Unauthenticated(_) => 401,
            ApiError::MfaRequired | ApiError::MfaInvalid | ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_, _) => 409,
            ApiError::Precondition(_) => 412,
            ApiError::QuotaExceeded(_) => 429,
            ApiError::Internal(_) => 500,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation",
            ApiError::Unauthenticated(_) => "unauthenticated",
            ApiError::MfaRequired => "mfa_required",
            ApiError::MfaInvalid => "mfa_invalid",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::NotFound(_) => "not_found",
            ApiError::Conflict(_, _) => "conflict",
            ApiError::QuotaExceeded(_) => "quota_exceeded",
            ApiError::Precondition(_) => "precondition",
            ApiError::Internal(_) => "internal",
        }
    }

    /// Build the wire body. Internal errors never leak their cause; they
    /// log it under a correlation id and return that id instead.
    pub fn body(&self) -> ErrorBody {
        match self {
            ApiError::Internal(e) => {
                let id = Uuid::new_v4().to_string();
                error!("internal error [{}]: {:#}", id, e);
                ErrorBody {
                    detail: "internal".to_string(),
                    correlation_id: Some(id),
                    overlapping_ids: None,
                }
            }
            ApiError::Conflict(msg, ids) => ErrorBody {
                detail: self.kind().to_string(),
                correlation_id: None,
                overlapping_ids: if ids.is_empty() { None } else { Some(ids.clone()) }
                    .map(|v| { let _ = msg; v }),
            },
            _ => ErrorBody::simple(self.kind()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Generates a per-endpoint `poem_openapi::ApiResponse` enum with one
/// success variant plus the full `ApiError` status spread, and `ok`/`err`
/// constructors so handlers don't hand-write the status match every time
/// (the teacher's `make_http_NNN` helpers do the same job, repeated once
/// per file; this collapses that repetition into one macro invocation).
#[macro_export]
macro_rules! api_response {
    ($name:ident, $success_status:literal, $success_payload:ty) => {
        #[derive(Debug, poem_openapi::ApiResponse)]
        pub enum $name {
            #[oai(status = $success_status)]
            Ok(poem_openapi::payload::Json<$success_payload>),
            #[oai(status = 400)]
            BadRequest(poem_openapi::payload::Json<$crate::utils::api_error::ErrorBody>),
            #[oai(status = 401)]
            Unauthenticated(poem_openapi::payload::Json<$crate::utils::api_error::ErrorBody>),
            #[oai(status = 403)]
            Forbidden(poem_openapi::payload::Json<$crate::utils::api_error::ErrorBody>),
            #[oai(status = 404)]
            NotFound(poem_openapi::payload::Json<$crate::utils::api_error::ErrorBody>),
            #[oai(status = 409)]
            Conflict(poem_openapi::payload::Json<$crate::utils::api_error::ErrorBody>),
            #[oai(status = 412)]
            Precondition(poem_openapi::payload::Json<$crate::utils::api_error::ErrorBody>),
            #[oai(status = 429)]
            TooManyRequests(poem_openapi::payload::Json<$crate::utils::api_error::ErrorBody>),
            #[oai(status = 500)]
            Internal(poem_openapi::payload::Json<$crate::utils::api_error::ErrorBody>),
        }

        impl $name {
            #[allow(dead_code)]
            pub fn ok(payload: $success_payload) -> Self {
                $name::Ok(poem_openapi::payload::Json(payload))
            }

            #[allow(dead_code)]
            pub fn err(e: $crate::utils::api_error::ApiError) -> Self {
                let body = poem_openapi::payload::Json(e.body());
                match e.status() {
                    400 => $name::BadRequest(body),
                    401 => $name::Unauthenticated(body),
                    403 => $name::Forbidden(body),
                    404 => $name::NotFound(body),
                    409 => $name::Conflict(body),
                    412 => $name::Precondition(body),
                    429 => $name::TooManyRequests(body),
                    _ => $name::Internal(body),
                }
            }
        }
    };
}
