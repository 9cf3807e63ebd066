use std::time::Duration;

use thiserror::Error;

use crate::models::pattern::PatternId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ThesisError {
    #[error("unknown pattern family: {0}")]
    UnknownFamily(String),
    #[error("component not found: {0}")]
    ComponentNotFound(String),
    #[error("confidence must be within 0..=100, got {0}")]
    InvalidConfidence(f64),
}

/// Geometry that a projection needs but the detector has not supplied yet
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("pattern geometry is missing {0}")]
    Missing(&'static str),
    #[error("right shoulder has not formed yet")]
    RightShoulderPending,
}

/// Failure reported by a store or alert collaborator
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("collaborator call timed out after {0:?}")]
    Timeout(Duration),
    #[error("collaborator error: {0}")]
    Backend(String),
}

impl From<anyhow::Error> for CollaboratorError {
    fn from(error: anyhow::Error) -> Self {
        CollaboratorError::Backend(format!("{:#}", error))
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unknown pattern: {0}")]
    UnknownPattern(PatternId),
    #[error("pattern {0} is retired")]
    PatternRetired(PatternId),
    #[error(transparent)]
    Thesis(#[from] ThesisError),
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ServiceError::Validation(errors.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_keep_their_message() {
        let error: CollaboratorError = anyhow::anyhow!("connection reset").into();
        assert!(matches!(error, CollaboratorError::Backend(ref msg) if msg == "connection reset"));

        let wrapped: ServiceError = error.into();
        assert_eq!(wrapped.to_string(), "collaborator error: connection reset");
    }

    #[test]
    fn backend_errors_keep_context_chain() {
        let error: CollaboratorError = anyhow::anyhow!("connection reset")
            .context("saving level AAPL#0")
            .into();
        assert!(
            matches!(error, CollaboratorError::Backend(ref msg) if msg == "saving level AAPL#0: connection reset")
        );
    }
}
