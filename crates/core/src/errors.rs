use thiserror::Error;

use crate::domain::expense::{ExpenseId, ExpenseStatus};
use crate::domain::user::UserId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error(
        "no approver found for submitter {submitter_id}: \
         no approval rule applies and no manager is assigned"
    )]
    NoApproverFound { submitter_id: UserId },
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },
    #[error("user {actor} is not allowed to act: {reason}")]
    Forbidden { actor: UserId, reason: String },
    #[error("expense {expense_id} has already been processed (status `{status}`)")]
    AlreadyProcessed { expense_id: ExpenseId, status: ExpenseStatus },
    #[error("inconsistent approval state: {0}")]
    InvalidState(String),
    #[error("currency conversion from {from} to {to} failed: {reason}")]
    RateLookupFailed { from: String, to: String, reason: String },
    #[error("conflict: {0}")]
    Conflict(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound { entity, id: id.to_string() }
    }

    pub fn forbidden(actor: UserId, reason: impl Into<String>) -> Self {
        Self::Forbidden { actor, reason: reason.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            Self::Domain(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("forbidden: {message}")]
    Forbidden { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => "bad_request",
            Self::NotFound { .. } => "not_found",
            Self::Forbidden { .. } => "forbidden",
            Self::Conflict { .. } => "conflict",
            Self::ServiceUnavailable { .. } => "service_unavailable",
            Self::Internal { .. } => "internal",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest { message, .. }
            | Self::NotFound { message, .. }
            | Self::Forbidden { message, .. }
            | Self::Conflict { message, .. }
            | Self::ServiceUnavailable { message, .. }
            | Self::Internal { message, .. } => message,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::Forbidden { correlation_id, .. }
            | Self::Conflict { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested record does not exist.",
            Self::Forbidden { .. } => "You are not allowed to perform this action.",
            Self::Conflict { .. } => {
                "The request conflicts with the current state. Refresh and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::Forbidden { correlation_id: id, .. }
            | InterfaceError::Conflict { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(
                error @ (DomainError::Validation(_) | DomainError::NoApproverFound { .. }),
            ) => Self::BadRequest { message: error.to_string(), correlation_id },
            ApplicationError::Domain(error @ DomainError::NotFound { .. }) => {
                Self::NotFound { message: error.to_string(), correlation_id }
            }
            ApplicationError::Domain(error @ DomainError::Forbidden { .. }) => {
                Self::Forbidden { message: error.to_string(), correlation_id }
            }
            ApplicationError::Domain(
                error @ (DomainError::AlreadyProcessed { .. } | DomainError::Conflict(_)),
            ) => {
                Self::Conflict { message: error.to_string(), correlation_id }
            }
            // The detail stays in server logs; callers only learn that the decision failed.
            ApplicationError::Domain(DomainError::InvalidState(_)) => Self::Internal {
                message: "the expense approval state is inconsistent".to_owned(),
                correlation_id,
            },
            ApplicationError::Domain(error @ DomainError::RateLookupFailed { .. }) => {
                Self::ServiceUnavailable { message: error.to_string(), correlation_id }
            }
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::expense::{ExpenseId, ExpenseStatus};
    use crate::domain::user::UserId;
    use crate::errors::{ApplicationError, DomainError, InterfaceError};

    #[test]
    fn validation_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::Validation(
            "amount must be greater than zero".to_owned(),
        ))
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ref message,
            } if correlation_id == "req-1" && message.contains("amount")
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn no_approver_found_is_a_user_facing_rejection() {
        let interface =
            ApplicationError::from(DomainError::NoApproverFound { submitter_id: UserId(4) })
                .into_interface("req-2");

        assert_eq!(interface.error_class(), "bad_request");
        assert!(interface.message().contains("submitter 4"));
    }

    #[test]
    fn lost_race_maps_to_conflict() {
        let interface = ApplicationError::from(DomainError::AlreadyProcessed {
            expense_id: ExpenseId(11),
            status: ExpenseStatus::Approved,
        })
        .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Conflict { .. }));
        assert_eq!(interface.correlation_id(), "req-3");
    }

    #[test]
    fn invalid_state_does_not_leak_detail() {
        let interface = ApplicationError::from(DomainError::InvalidState(
            "approver 9 has no step in rule 2".to_owned(),
        ))
        .into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert!(!interface.message().contains("approver 9"));
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-5");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn forbidden_keeps_reason() {
        let interface = ApplicationError::from(DomainError::forbidden(
            UserId(5),
            "not the current approver of expense 3",
        ))
        .into_interface("req-6");

        assert_eq!(interface.error_class(), "forbidden");
        assert!(interface.message().contains("not the current approver"));
    }
}
