use thiserror::Error;

use crate::decimal::Money;
use crate::ports::{ChannelError, IdentityError, RepositoryError};
use crate::types::{ApplicationId, ProductTypeId};

#[derive(Error, Debug)]
pub enum LoanError {
    #[error("applicant not found: {email}")]
    ApplicantNotFound {
        email: String,
    },

    #[error("loan product type not found: {id}")]
    ProductNotFound {
        id: ProductTypeId,
    },

    #[error("requested amount {requested} is outside the allowed range: minimum {minimum}, maximum {maximum}")]
    AmountOutOfRange {
        requested: Money,
        minimum: Money,
        maximum: Money,
    },

    #[error("loan application not found: {id}")]
    ApplicationNotFound {
        id: ApplicationId,
    },

    #[error("status not found: {reference}")]
    StatusNotFound {
        reference: String,
    },

    #[error("status with name '{name}' already exists")]
    DuplicateStatusName {
        name: String,
    },

    #[error("debt aggregation failed for application {application_id}: {reason}")]
    AggregationFailure {
        application_id: ApplicationId,
        reason: String,
    },

    #[error("term must be a positive number of periods, got {term}")]
    InvalidTerm {
        term: u32,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },

    #[error("external communication failure: {0}")]
    ExternalCommunicationFailure(#[from] ExternalFailure),
}

impl LoanError {
    /// errors caused by the request itself rather than by a collaborator
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            LoanError::ApplicantNotFound { .. }
                | LoanError::ProductNotFound { .. }
                | LoanError::AmountOutOfRange { .. }
                | LoanError::ApplicationNotFound { .. }
                | LoanError::StatusNotFound { .. }
                | LoanError::DuplicateStatusName { .. }
                | LoanError::InvalidTerm { .. }
                | LoanError::InvalidConfiguration { .. }
        )
    }

    /// errors worth retrying once the collaborator recovers
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LoanError::AggregationFailure { .. } | LoanError::ExternalCommunicationFailure(_)
        )
    }
}

/// failure reported by one of the external collaborators
#[derive(Error, Debug)]
pub enum ExternalFailure {
    #[error("persistence: {0}")]
    Repository(#[from] RepositoryError),

    #[error("identity service: {0}")]
    Identity(#[from] IdentityError),

    #[error("notification channel: {0}")]
    Channel(#[from] ChannelError),
}

impl From<RepositoryError> for LoanError {
    fn from(err: RepositoryError) -> Self {
        LoanError::ExternalCommunicationFailure(err.into())
    }
}

impl From<IdentityError> for LoanError {
    fn from(err: IdentityError) -> Self {
        LoanError::ExternalCommunicationFailure(err.into())
    }
}

impl From<ChannelError> for LoanError {
    fn from(err: ChannelError) -> Self {
        LoanError::ExternalCommunicationFailure(err.into())
    }
}

pub type Result<T> = std::result::Result<T, LoanError>;
