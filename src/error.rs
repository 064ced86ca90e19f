//! Errors for each layer of the application.
//!
//! - [`EngineError`] is raised by the balance calculation when the expenses
//!   it receives break one of its preconditions.
//! - [`StoreError`] wraps failures of the persistence backend.
//! - [`ServiceError`] is what the HTTP layer turns into a response.
use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde::Serialize;
use thiserror::Error;

/// Precondition violations detected while computing balances.
#[derive(Error, Debug, PartialEq)]
pub enum EngineError {
    #[error("expense `{expense}` references `{member}` who is not a member of the group")]
    UnknownMember { expense: String, member: String },
    #[error("expense `{expense}` has a non-positive amount ({amount})")]
    NonPositiveAmount { expense: String, amount: f64 },
    #[error("expense `{expense}` has no beneficiaries")]
    NoBeneficiaries { expense: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Serialize)]
struct ErrorBody {
    status: u16,
    error: String,
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Validation(_) | ServiceError::Engine(_) => StatusCode::BAD_REQUEST,
            ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        HttpResponse::build(status).json(ErrorBody {
            status: status.as_u16(),
            error: self.to_string(),
        })
    }
}
