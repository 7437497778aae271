use axum::http::{StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use serde::Serialize;

pub async fn handler404(path: Uri) -> (StatusCode, Json<Error>) {
    (
        StatusCode::NOT_FOUND,
        Json(Error::NotFound {
            message: format!("Invalid path: {}", path),
        }),
    )
}

/// Envelope wrapped around every successful response body.
#[derive(Debug, Clone, Serialize)]
pub struct Success<V> {
    success: bool,
    #[serde(flatten)]
    value: V,
}

impl<V: Serialize> Success<V> {
    pub fn of(value: V) -> Self {
        Self {
            success: true,
            value,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "error")]
pub enum Error {
    /// Malformed, out-of-range or duplicate input. 400.
    Validation {
        field: &'static str,
        message: String,
    },
    /// Bad credentials or a disabled account at login. 400.
    AuthenticationFailure { message: String },
    /// Missing or invalid bearer token on a protected route. 401.
    Unauthorized { message: String },
    /// Authenticated, but the caller's role does not allow the operation. 403.
    Forbidden { message: String },
    /// Authenticated account is not linked to the role the operation needs. 400.
    NoRole { message: String },
    NotFound { message: String },
    InternalError { kind: &'static str, message: String },
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Validation { .. }
            | Error::AuthenticationFailure { .. }
            | Error::NoRole { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Error::Forbidden { .. } => StatusCode::FORBIDDEN,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn validation<S: Into<String>>(field: &'static str, message: S) -> Error {
        Error::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(message: S) -> Error {
        Error::NotFound {
            message: message.into(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        log::error!("database error: {}", err);
        Self::InternalError {
            kind: "DatabaseError",
            message: err.to_string(),
        }
    }
}

impl From<pbkdf2::password_hash::Error> for Error {
    fn from(err: pbkdf2::password_hash::Error) -> Self {
        Self::InternalError {
            kind: "PasswordHashError",
            message: err.to_string(),
        }
    }
}

/// The UNIQUE indexes are the actual guarantee against duplicate usernames,
/// test names and (student, test) pairs; the SELECT-based checks in the
/// handlers are only a fast path for a friendlier message. A racing insert
/// that slips past the fast path surfaces the constraint violation as the
/// same validation error instead of a 500.
pub fn unique_violation(err: sqlx::Error, field: &'static str, message: &str) -> Error {
    if let sqlx::Error::Database(db) = &err {
        if db.message().contains("UNIQUE constraint failed") {
            return Error::validation(field, message);
        }
    }
    err.into()
}
