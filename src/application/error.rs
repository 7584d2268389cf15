use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::{
    application::{artifact::ArtifactError, build::BuildError},
    domain::error::DomainError,
    infra::error::InfraError,
};

/// Coarse classification used when reporting failures.
///
/// Configuration errors are fatal and never retried, transient errors belong
/// to a single work item, invariant errors indicate a programming error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Configuration,
    Transient,
    Invariant,
    Cancelled,
}

impl ErrorClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::Configuration => "configuration",
            ErrorClass::Transient => "transient",
            ErrorClass::Invariant => "invariant",
            ErrorClass::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::Domain(DomainError::Invariant { .. }) => ErrorClass::Invariant,
            AppError::Domain(_) => ErrorClass::Configuration,
            AppError::Infra(InfraError::Io(_)) => ErrorClass::Transient,
            AppError::Infra(_) => ErrorClass::Configuration,
            AppError::Artifact(err) => err.class(),
            AppError::Build(err) => err.class(),
            AppError::Unexpected(_) => ErrorClass::Invariant,
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Domain(DomainError::InvalidSeed { .. })
            | AppError::Domain(DomainError::Validation { .. }) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Domain(DomainError::InvalidSeed { .. }) => "Invalid seed",
            AppError::Domain(DomainError::Validation { .. }) => "Request could not be processed",
            AppError::Artifact(_) => "Project bundle unavailable",
            AppError::Infra(InfraError::Configuration { .. }) => "Service misconfigured",
            AppError::Build(_) => "Build sequence error.",
            _ => "Unexpected error occurred",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(
                target = "pressrun::http",
                class = self.class().as_str(),
                error = %self,
                "request failed"
            );
        }
        (status, self.presentation_message()).into_response()
    }
}
