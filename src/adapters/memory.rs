//! In-process collaborators for tests and demos.
//!
//! `InMemoryStore` keeps every table behind one `RwLock`, so the summary join
//! always sees a consistent snapshot and the unique status name check is
//! atomic with the insert.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::config::ChannelTopics;
use crate::decimal::Money;
use crate::ports::{
    ApplicationRepository, ChannelError, IdentityError, IdentityGateway, NotificationChannel,
    ProductTypeRepository, RepositoryError, RepositoryResult, StatusNotification, StatusRepository,
};
use crate::routing::ValidationRequest;
use crate::types::{
    ApplicationId, LoanApplication, LoanProductType, LoanSummary, ProductTypeId, Status, StatusId,
    User, UNASSIGNED_ID,
};

#[derive(Debug, Default)]
struct Tables {
    /// insertion order, which is also the listing order
    applications: Vec<LoanApplication>,
    products: BTreeMap<ProductTypeId, LoanProductType>,
    statuses: BTreeMap<StatusId, Status>,
    last_product_id: ProductTypeId,
    last_status_id: StatusId,
}

impl Tables {
    fn status_named(&self, name: &str) -> Option<&Status> {
        self.statuses.values().find(|status| status.name == name)
    }

    fn approved_principal(&self, email: &str, approved: Option<StatusId>) -> Money {
        let Some(approved) = approved else {
            return Money::ZERO;
        };
        self.applications
            .iter()
            .filter(|app| app.email == email && app.status_id == approved)
            .map(|app| app.amount)
            .sum()
    }
}

/// application, product and status tables in one store
#[derive(Debug)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
    /// status whose loans count towards `total_approved_debt` in summaries
    approved_status: String,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::with_approved_status("APROBADO")
    }

    pub fn with_approved_status(name: impl Into<String>) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            approved_status: name.into(),
            unavailable: AtomicBool::new(false),
        }
    }

    /// make every subsequent call fail with `RepositoryError::Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> RepositoryResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("in-memory store switched off".to_string()));
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApplicationRepository for InMemoryStore {
    async fn save(&self, application: LoanApplication) -> RepositoryResult<LoanApplication> {
        self.check()?;
        let mut tables = self.tables.write().await;
        match tables.applications.iter().position(|app| app.id == application.id) {
            Some(index) => tables.applications[index] = application.clone(),
            None => tables.applications.push(application.clone()),
        }
        Ok(application)
    }

    async fn find_by_id(&self, id: ApplicationId) -> RepositoryResult<Option<LoanApplication>> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(tables.applications.iter().find(|app| app.id == id).cloned())
    }

    async fn find_all(&self) -> RepositoryResult<Vec<LoanApplication>> {
        self.check()?;
        Ok(self.tables.read().await.applications.clone())
    }

    async fn delete_by_id(&self, id: ApplicationId) -> RepositoryResult<()> {
        self.check()?;
        self.tables.write().await.applications.retain(|app| app.id != id);
        Ok(())
    }

    async fn find_by_applicant_and_status(
        &self,
        email: &str,
        status_id: StatusId,
    ) -> RepositoryResult<Vec<LoanApplication>> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(tables
            .applications
            .iter()
            .filter(|app| app.email == email && app.status_id == status_id)
            .cloned()
            .collect())
    }

    async fn find_summaries_by_status(
        &self,
        status_name: &str,
        page: usize,
        size: usize,
    ) -> RepositoryResult<Vec<LoanSummary>> {
        self.check()?;
        let tables = self.tables.read().await;
        let Some(status) = tables.status_named(status_name) else {
            return Ok(Vec::new());
        };
        let approved = tables.status_named(&self.approved_status).map(|s| s.id);

        // inner join: rows whose product vanished are not listed
        let rows = tables
            .applications
            .iter()
            .filter(|app| app.status_id == status.id)
            .filter_map(|app| {
                tables
                    .products
                    .get(&app.product_type_id)
                    .map(|product| (app, product))
            })
            .skip(page.saturating_mul(size))
            .take(size)
            .map(|(app, product)| LoanSummary {
                application_id: app.id,
                amount: app.amount,
                term: app.term,
                email: app.email.clone(),
                applicant_name: None,
                base_salary: None,
                product_type_id: product.id,
                product_name: product.name.clone(),
                interest_rate: product.interest_rate,
                automatic_validation: product.automatic_validation,
                status_name: status.name.clone(),
                total_approved_debt: tables.approved_principal(&app.email, approved),
            })
            .collect();

        Ok(rows)
    }
}

#[async_trait]
impl ProductTypeRepository for InMemoryStore {
    async fn save(&self, product: LoanProductType) -> RepositoryResult<LoanProductType> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let product = if product.id == UNASSIGNED_ID {
            tables.last_product_id += 1;
            product.with_id(tables.last_product_id)
        } else {
            tables.last_product_id = tables.last_product_id.max(product.id);
            product
        };
        tables.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn find_by_id(&self, id: ProductTypeId) -> RepositoryResult<Option<LoanProductType>> {
        self.check()?;
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn find_all(&self) -> RepositoryResult<Vec<LoanProductType>> {
        self.check()?;
        Ok(self.tables.read().await.products.values().cloned().collect())
    }

    async fn delete_by_id(&self, id: ProductTypeId) -> RepositoryResult<()> {
        self.check()?;
        self.tables.write().await.products.remove(&id);
        Ok(())
    }

    async fn exists_by_name(&self, name: &str) -> RepositoryResult<bool> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(tables.products.values().any(|product| product.name == name))
    }
}

#[async_trait]
impl StatusRepository for InMemoryStore {
    async fn save(&self, status: Status) -> RepositoryResult<Status> {
        self.check()?;
        let mut tables = self.tables.write().await;

        if tables
            .statuses
            .values()
            .any(|other| other.name == status.name && other.id != status.id)
        {
            return Err(RepositoryError::Conflict { key: status.name });
        }

        let status = if status.id == UNASSIGNED_ID {
            tables.last_status_id += 1;
            status.with_id(tables.last_status_id)
        } else {
            tables.last_status_id = tables.last_status_id.max(status.id);
            status
        };
        tables.statuses.insert(status.id, status.clone());
        Ok(status)
    }

    async fn find_by_id(&self, id: StatusId) -> RepositoryResult<Option<Status>> {
        self.check()?;
        Ok(self.tables.read().await.statuses.get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> RepositoryResult<Option<Status>> {
        self.check()?;
        Ok(self.tables.read().await.status_named(name).cloned())
    }

    async fn find_all(&self) -> RepositoryResult<Vec<Status>> {
        self.check()?;
        Ok(self.tables.read().await.statuses.values().cloned().collect())
    }

    async fn delete_by_id(&self, id: StatusId) -> RepositoryResult<()> {
        self.check()?;
        self.tables.write().await.statuses.remove(&id);
        Ok(())
    }

    async fn exists_by_name(&self, name: &str) -> RepositoryResult<bool> {
        self.check()?;
        Ok(self.tables.read().await.status_named(name).is_some())
    }
}

/// identity directory keyed by email
#[derive(Debug, Default)]
pub struct InMemoryIdentityGateway {
    users: Mutex<HashMap<String, User>>,
    unavailable: AtomicBool,
}

impl InMemoryIdentityGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let gateway = Self::new();
        for user in users {
            gateway.register(user);
        }
        gateway
    }

    pub fn register(&self, user: User) {
        self.users().insert(user.email.clone(), user);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), IdentityError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(IdentityError::Unavailable("identity directory switched off".to_string()));
        }
        Ok(())
    }

    fn users(&self) -> MutexGuard<'_, HashMap<String, User>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl IdentityGateway for InMemoryIdentityGateway {
    async fn exists_by_email(&self, email: &str) -> Result<bool, IdentityError> {
        self.check()?;
        Ok(self.users().contains_key(email))
    }

    async fn find_details_by_emails(&self, emails: &[String]) -> Result<Vec<User>, IdentityError> {
        self.check()?;
        let users = self.users();
        Ok(emails.iter().filter_map(|email| users.get(email).cloned()).collect())
    }
}

/// keeps every published message as JSON, per topic
#[derive(Debug)]
pub struct RecordingChannel {
    topics: ChannelTopics,
    published: Mutex<HashMap<String, Vec<String>>>,
    failing: AtomicBool,
}

impl RecordingChannel {
    pub fn new(topics: ChannelTopics) -> Self {
        Self {
            topics,
            published: Mutex::new(HashMap::new()),
            failing: AtomicBool::new(false),
        }
    }

    /// reject every subsequent publish
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// raw payloads published to `topic`, oldest first
    pub fn published(&self, topic: &str) -> Vec<String> {
        self.messages().get(topic).cloned().unwrap_or_default()
    }

    pub fn notifications(&self) -> Vec<StatusNotification> {
        self.decoded(&self.topics.notifications)
    }

    pub fn validation_requests(&self) -> Vec<ValidationRequest> {
        self.decoded(&self.topics.validation_requests)
    }

    fn decoded<T: DeserializeOwned>(&self, topic: &str) -> Vec<T> {
        self.published(topic)
            .iter()
            .filter_map(|body| serde_json::from_str(body).ok())
            .collect()
    }

    fn publish<T: Serialize>(&self, topic: &str, message: &T) -> Result<(), ChannelError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ChannelError::Transport {
                topic: topic.to_string(),
                message: "channel switched off".to_string(),
            });
        }
        let body = serde_json::to_string(message)?;
        self.messages().entry(topic.to_string()).or_default().push(body);
        Ok(())
    }

    fn messages(&self) -> MutexGuard<'_, HashMap<String, Vec<String>>> {
        self.published.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RecordingChannel {
    fn default() -> Self {
        Self::new(ChannelTopics::default())
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    async fn notify(&self, notification: &StatusNotification) -> Result<(), ChannelError> {
        self.publish(&self.topics.notifications, notification)
    }

    async fn submit_for_validation(&self, request: &ValidationRequest) -> Result<(), ChannelError> {
        self.publish(&self.topics.validation_requests, request)
    }
}
