//! Contracts the lifecycle engine requires from its external collaborators.
//!
//! Persistence, identity verification and message publishing live outside this
//! crate; implementations plug in behind these traits. `adapters::memory`
//! provides in-process versions for tests and demos.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::routing::ValidationRequest;
use crate::types::{
    ApplicationId, LoanApplication, LoanProductType, LoanSummary, ProductTypeId, Status, StatusId,
    User,
};

/// persistence failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// a uniqueness constraint rejected the write
    #[error("unique constraint violated: {key}")]
    Conflict { key: String },

    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// identity service failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("identity service unavailable: {0}")]
    Unavailable(String),
}

/// publish failure on one of the outbound channels
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("publish to {topic} failed: {message}")]
    Transport { topic: String, message: String },

    #[error("message serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    /// insert or replace by id
    async fn save(&self, application: LoanApplication) -> RepositoryResult<LoanApplication>;
    async fn find_by_id(&self, id: ApplicationId) -> RepositoryResult<Option<LoanApplication>>;
    async fn find_all(&self) -> RepositoryResult<Vec<LoanApplication>>;
    async fn delete_by_id(&self, id: ApplicationId) -> RepositoryResult<()>;
    async fn find_by_applicant_and_status(
        &self,
        email: &str,
        status_id: StatusId,
    ) -> RepositoryResult<Vec<LoanApplication>>;
    /// zero-based page of summaries whose status has exactly `status_name`
    async fn find_summaries_by_status(
        &self,
        status_name: &str,
        page: usize,
        size: usize,
    ) -> RepositoryResult<Vec<LoanSummary>>;
}

#[async_trait]
pub trait ProductTypeRepository: Send + Sync {
    /// inserts when `id` is unassigned, replaces otherwise
    async fn save(&self, product: LoanProductType) -> RepositoryResult<LoanProductType>;
    async fn find_by_id(&self, id: ProductTypeId) -> RepositoryResult<Option<LoanProductType>>;
    async fn find_all(&self) -> RepositoryResult<Vec<LoanProductType>>;
    async fn delete_by_id(&self, id: ProductTypeId) -> RepositoryResult<()>;
    async fn exists_by_name(&self, name: &str) -> RepositoryResult<bool>;
}

#[async_trait]
pub trait StatusRepository: Send + Sync {
    /// inserts when `id` is unassigned, replaces otherwise.
    /// must fail with [`RepositoryError::Conflict`] when another row owns the name.
    async fn save(&self, status: Status) -> RepositoryResult<Status>;
    async fn find_by_id(&self, id: StatusId) -> RepositoryResult<Option<Status>>;
    async fn find_by_name(&self, name: &str) -> RepositoryResult<Option<Status>>;
    async fn find_all(&self) -> RepositoryResult<Vec<Status>>;
    async fn delete_by_id(&self, id: StatusId) -> RepositoryResult<()>;
    async fn exists_by_name(&self, name: &str) -> RepositoryResult<bool>;
}

#[async_trait]
pub trait IdentityGateway: Send + Sync {
    async fn exists_by_email(&self, email: &str) -> std::result::Result<bool, IdentityError>;
    /// batch lookup; unknown emails are simply absent from the result
    async fn find_details_by_emails(
        &self,
        emails: &[String],
    ) -> std::result::Result<Vec<User>, IdentityError>;
}

/// status change notice for the reviewer/applicant notification topic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusNotification {
    pub loan_id: ApplicationId,
    pub status: String,
    pub email: String,
}

/// fire-and-forget publishing; success means the publish was accepted, nothing more
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn notify(&self, notification: &StatusNotification) -> std::result::Result<(), ChannelError>;
    async fn submit_for_validation(
        &self,
        request: &ValidationRequest,
    ) -> std::result::Result<(), ChannelError>;
}

/// every collaborator the engine talks to
#[derive(Clone)]
pub struct Ports {
    pub applications: Arc<dyn ApplicationRepository>,
    pub products: Arc<dyn ProductTypeRepository>,
    pub statuses: Arc<dyn StatusRepository>,
    pub identity: Arc<dyn IdentityGateway>,
    pub channel: Arc<dyn NotificationChannel>,
}
