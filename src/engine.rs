use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::EngineConfig;
use crate::decisions::ValidationDecision;
use crate::errors::{LoanError, Result};
use crate::events::{Event, EventLog};
use crate::ports::Ports;
use crate::products::validate_amount;
use crate::routing::{RoutingOutcome, ValidationRouter};
use crate::statuses::StatusResolver;
use crate::types::{ApplicationDetails, ApplicationId, LoanApplication, LoanSummary, StatusId, User};

/// orchestrates intake, routing and status transitions of loan applications
pub struct LoanApplicationEngine {
    config: EngineConfig,
    ports: Ports,
    router: Arc<ValidationRouter>,
    resolver: StatusResolver,
    events: EventLog,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl LoanApplicationEngine {
    pub fn new(config: EngineConfig, ports: Ports) -> Result<Self> {
        config
            .validate()
            .map_err(|err| LoanError::InvalidConfiguration {
                message: err.to_string(),
            })?;

        let events = EventLog::with_capacity(config.event_log_capacity);
        let router = ValidationRouter::new(ports.clone(), config.statuses.approved.clone(), events.clone());
        let resolver = StatusResolver::new(
            Arc::clone(&ports.statuses),
            config.statuses.clone(),
            config.status_creation_attempts,
            events.clone(),
        );

        Ok(Self {
            config,
            ports,
            router: Arc::new(router),
            resolver,
            events,
            background: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// validate and persist a new application in pending review
    ///
    /// For automatically validated products the validation request is
    /// dispatched on a background task; its outcome never affects the result.
    pub async fn create(&self, application: LoanApplication) -> Result<LoanApplication> {
        if application.term == 0 {
            return Err(LoanError::InvalidTerm { term: application.term });
        }

        let (known, product) = tokio::join!(
            self.ports.identity.exists_by_email(&application.email),
            self.ports.products.find_by_id(application.product_type_id),
        );
        if !known? {
            if let Err(err) = &product {
                debug!(product_type_id = application.product_type_id, error = %err, "product lookup also failed");
            }
            return Err(LoanError::ApplicantNotFound {
                email: application.email,
            });
        }
        let product = product?.ok_or(LoanError::ProductNotFound {
            id: application.product_type_id,
        })?;

        validate_amount(application.amount, &product)?;

        let pending = self.resolver.resolve_pending().await?;
        let saved = self
            .ports
            .applications
            .save(application.with_status(pending.id).with_product_type(product.id))
            .await?;

        info!(
            application_id = %saved.id,
            product_type_id = product.id,
            amount = %saved.amount,
            automatic = product.automatic_validation,
            "loan application created"
        );
        self.events.emit(Event::ApplicationCreated {
            application_id: saved.id,
            product_type_id: product.id,
            status_id: saved.status_id,
            amount: saved.amount,
            timestamp: Utc::now(),
        });

        if product.automatic_validation {
            let router = Arc::clone(&self.router);
            let events = self.events.clone();
            let application = saved.clone();
            let handle = tokio::spawn(async move {
                if let Err(err) = router.submit_automatic(&application, &product, None).await {
                    error!(
                        application_id = %application.id,
                        error = %err,
                        "automatic validation dispatch failed, application stays pending"
                    );
                    events.emit(Event::ValidationDispatchFailed {
                        application_id: application.id,
                        reason: err.to_string(),
                        timestamp: Utc::now(),
                    });
                }
            });
            self.track(handle);
        }

        Ok(saved)
    }

    /// replace an existing application wholesale
    pub async fn update(&self, application: LoanApplication) -> Result<LoanApplication> {
        if self.ports.applications.find_by_id(application.id).await?.is_none() {
            return Err(LoanError::ApplicationNotFound { id: application.id });
        }
        Ok(self.ports.applications.save(application).await?)
    }

    pub async fn get_by_id(&self, id: ApplicationId) -> Result<Option<LoanApplication>> {
        Ok(self.ports.applications.find_by_id(id).await?)
    }

    pub async fn get_all(&self) -> Result<Vec<LoanApplication>> {
        Ok(self.ports.applications.find_all().await?)
    }

    pub async fn delete(&self, id: ApplicationId) -> Result<()> {
        Ok(self.ports.applications.delete_by_id(id).await?)
    }

    /// request a move to `status_id`, routed by the application's product
    pub async fn update_status(&self, id: ApplicationId, status_id: StatusId) -> Result<RoutingOutcome> {
        let application = self
            .ports
            .applications
            .find_by_id(id)
            .await?
            .ok_or(LoanError::ApplicationNotFound { id })?;
        let product = self
            .ports
            .products
            .find_by_id(application.product_type_id)
            .await?
            .ok_or(LoanError::ProductNotFound {
                id: application.product_type_id,
            })?;

        self.router.route(application, product, status_id).await
    }

    pub async fn update_status_and_get_details(
        &self,
        id: ApplicationId,
        status_id: StatusId,
    ) -> Result<ApplicationDetails> {
        Ok(self.update_status(id, status_id).await?.into_details())
    }

    /// page of applications in status `name` (case-insensitive), decorated with applicant details
    pub async fn find_by_status_name(&self, name: &str, page: usize, size: usize) -> Result<Vec<LoanSummary>> {
        let status_name = name.trim().to_uppercase();
        let summaries = self
            .ports
            .applications
            .find_summaries_by_status(&status_name, page, size)
            .await?;
        if summaries.is_empty() {
            return Ok(summaries);
        }

        let mut emails: Vec<String> = summaries.iter().map(|s| s.email.clone()).collect();
        emails.sort();
        emails.dedup();

        let users = match self.ports.identity.find_details_by_emails(&emails).await {
            Ok(users) => users,
            Err(err) => {
                warn!(status = %status_name, error = %err, "applicant lookup failed, listing without details");
                Vec::new()
            }
        };
        let by_email: HashMap<&str, &User> = users.iter().map(|u| (u.email.as_str(), u)).collect();

        debug!(
            status = %status_name,
            rows = summaries.len(),
            resolved = by_email.len(),
            "summaries decorated"
        );

        Ok(summaries
            .into_iter()
            .map(|summary| match by_email.get(summary.email.as_str()) {
                Some(user) => summary.with_applicant(user),
                None => summary,
            })
            .collect())
    }

    /// apply the external validator's verdict through the ordinary update path
    ///
    /// Returns `None` when the decision carries no status.
    pub async fn apply_validation_decision(
        &self,
        decision: &ValidationDecision,
    ) -> Result<Option<LoanApplication>> {
        if !decision.is_actionable() {
            debug!(application_id = %decision.loan_id, "blank validation decision ignored");
            return Ok(None);
        }

        let status = self
            .ports
            .statuses
            .find_by_name(&decision.status)
            .await?
            .ok_or_else(|| LoanError::StatusNotFound {
                reference: decision.status.clone(),
            })?;
        let application = self
            .get_by_id(decision.loan_id)
            .await?
            .ok_or(LoanError::ApplicationNotFound { id: decision.loan_id })?;

        let updated = self.update(application.with_status(status.id)).await?;

        info!(application_id = %updated.id, status = %status.name, "validation decision applied");
        self.events.emit(Event::DecisionApplied {
            application_id: updated.id,
            status_name: status.name,
            timestamp: Utc::now(),
        });

        Ok(Some(updated))
    }

    /// wait for every background dispatch started so far
    pub async fn drain_background(&self) {
        let handles = std::mem::take(&mut *self.background());
        for handle in handles {
            if let Err(err) = handle.await {
                warn!(error = %err, "background dispatch task did not complete");
            }
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut background = self.background();
        background.retain(|h| !h.is_finished());
        background.push(handle);
    }

    fn background(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.background.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Money;
    use crate::errors::ExternalFailure;
    use crate::fixtures::Harness;
    use crate::ports::{ApplicationRepository, StatusNotification, StatusRepository};
    use crate::types::LoanProductType;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn request(harness: &Harness, product: &LoanProductType, amount: Money) -> LoanApplication {
        LoanApplication::new(amount, 12, harness.applicant.email.clone(), product.id)
    }

    #[tokio::test]
    async fn test_create_manual_persists_in_pending_review() {
        let harness = Harness::seeded().await;
        let engine = harness.engine();

        let created = engine
            .create(request(&harness, &harness.manual_product, Money::from_major(5_000)))
            .await
            .unwrap();

        assert_eq!(created.status_id, harness.pending.id);
        assert_eq!(engine.get_by_id(created.id).await.unwrap(), Some(created.clone()));
        engine.drain_background().await;
        assert!(harness.channel.validation_requests().is_empty());
        assert!(matches!(engine.events().events()[0], Event::ApplicationCreated { .. }));
    }

    #[tokio::test]
    async fn test_create_lazily_creates_pending_status() {
        let harness = Harness::without_pending().await;
        let engine = harness.engine();

        let created = engine
            .create(request(&harness, &harness.manual_product, Money::from_major(5_000)))
            .await
            .unwrap();

        let pending = StatusRepository::find_by_name(harness.store.as_ref(), "PENDIENTE_REVISION")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(created.status_id, pending.id);
        assert!(engine
            .events()
            .events()
            .iter()
            .any(|e| matches!(e, Event::PendingStatusCreated { .. })));
    }

    #[tokio::test]
    async fn test_create_unknown_applicant_persists_nothing() {
        let harness = Harness::seeded().await;
        let engine = harness.engine();
        let stranger = LoanApplication::new(
            Money::from_major(5_000),
            12,
            "ghost@example.com",
            harness.manual_product.id,
        );

        let err = engine.create(stranger).await.unwrap_err();

        assert!(matches!(err, LoanError::ApplicantNotFound { .. }));
        assert!(engine.get_all().await.unwrap().is_empty());
        assert!(engine.events().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_product_and_bad_amount() {
        let harness = Harness::seeded().await;
        let engine = harness.engine();
        let email = harness.applicant.email.clone();

        let no_product = LoanApplication::new(Money::from_major(5_000), 12, email.clone(), 999);
        assert!(matches!(
            engine.create(no_product).await,
            Err(LoanError::ProductNotFound { id: 999 })
        ));

        let too_big = request(&harness, &harness.manual_product, Money::from_decimal(dec!(50000.01)));
        assert!(matches!(
            engine.create(too_big).await,
            Err(LoanError::AmountOutOfRange { .. })
        ));

        let no_term = LoanApplication::new(Money::from_major(5_000), 0, email, harness.manual_product.id);
        assert!(matches!(engine.create(no_term).await, Err(LoanError::InvalidTerm { term: 0 })));

        assert!(engine.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_identity_failure_reported_before_product() {
        let harness = Harness::seeded().await;
        harness.identity.set_unavailable(true);
        let engine = harness.engine();
        let app = LoanApplication::new(Money::from_major(5_000), 12, harness.applicant.email.clone(), 999);

        let err = engine.create(app).await.unwrap_err();
        assert!(matches!(
            err,
            LoanError::ExternalCommunicationFailure(ExternalFailure::Identity(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_applicant_wins_over_product_outage() {
        let harness = Harness::seeded().await;
        let engine = harness.engine();
        harness.store.set_unavailable(true);
        let stranger = LoanApplication::new(
            Money::from_major(5_000),
            12,
            "ghost@example.com",
            harness.manual_product.id,
        );

        let err = engine.create(stranger).await.unwrap_err();

        assert!(matches!(err, LoanError::ApplicantNotFound { ref email } if email == "ghost@example.com"));
        harness.store.set_unavailable(false);
        assert!(engine.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_automatic_dispatches_in_background() {
        let harness = Harness::seeded().await;
        let engine = harness.engine();

        let created = engine
            .create(request(&harness, &harness.automatic_product, Money::from_major(3_000)))
            .await
            .unwrap();
        engine.drain_background().await;

        assert_eq!(created.status_id, harness.pending.id);
        let sent = harness.channel.validation_requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].loan_id, created.id);
        assert_eq!(sent[0].requested_status_id, None);
        assert!(sent[0].active_monthly_payments.is_empty());
    }

    #[tokio::test]
    async fn test_create_automatic_survives_dispatch_failure() {
        let harness = Harness::seeded().await;
        harness.channel.set_failing(true);
        let engine = harness.engine();

        let created = engine
            .create(request(&harness, &harness.automatic_product, Money::from_major(3_000)))
            .await
            .unwrap();
        engine.drain_background().await;

        let stored = engine.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(stored.status_id, harness.pending.id);
        assert!(harness.channel.validation_requests().is_empty());
        assert!(engine.events().events().iter().any(|e| matches!(
            e,
            Event::ValidationDispatchFailed { application_id, .. } if *application_id == created.id
        )));
    }

    #[tokio::test]
    async fn test_manual_status_change_notifies_once() {
        let harness = Harness::seeded().await;
        let engine = harness.engine();
        let created = engine
            .create(request(&harness, &harness.manual_product, Money::from_major(5_000)))
            .await
            .unwrap();

        let details = engine
            .update_status_and_get_details(created.id, harness.rejected.id)
            .await
            .unwrap();

        assert_eq!(details.application.status_id, harness.rejected.id);
        assert_eq!(details.status, harness.rejected);
        assert_eq!(details.product, harness.manual_product);
        assert_eq!(
            engine.get_by_id(created.id).await.unwrap().unwrap().status_id,
            harness.rejected.id
        );
        assert_eq!(
            harness.channel.notifications(),
            vec![StatusNotification {
                loan_id: created.id,
                status: "RECHAZADO".to_string(),
                email: created.email.clone(),
            }]
        );
    }

    #[tokio::test]
    async fn test_status_change_requires_existing_application() {
        let harness = Harness::seeded().await;
        let engine = harness.engine();
        let id = Uuid::new_v4();

        let err = engine
            .update_status_and_get_details(id, harness.approved.id)
            .await
            .unwrap_err();
        assert!(matches!(err, LoanError::ApplicationNotFound { id: missing } if missing == id));
        assert!(harness.channel.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_automatic_status_change_keeps_pending() {
        let harness = Harness::seeded().await;
        let engine = harness.engine();
        let created = engine
            .create(request(&harness, &harness.automatic_product, Money::from_major(3_000)))
            .await
            .unwrap();
        engine.drain_background().await;

        let outcome = engine.update_status(created.id, harness.approved.id).await.unwrap();

        assert!(outcome.is_automatic());
        assert_eq!(outcome.details().status, harness.pending);
        let sent = harness.channel.validation_requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].requested_status_id, Some(harness.approved.id));
        assert!(harness.channel.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_update_requires_existing_application() {
        let harness = Harness::seeded().await;
        let engine = harness.engine();
        let ghost = request(&harness, &harness.manual_product, Money::from_major(5_000));

        assert!(matches!(
            engine.update(ghost).await,
            Err(LoanError::ApplicationNotFound { .. })
        ));

        let created = engine
            .create(request(&harness, &harness.manual_product, Money::from_major(5_000)))
            .await
            .unwrap();
        let resized = created.clone().with_terms(Money::from_major(6_000), 24);
        let updated = engine.update(resized).await.unwrap();
        assert_eq!(updated.amount, Money::from_major(6_000));
        assert_eq!(updated.term, 24);

        engine.delete(created.id).await.unwrap();
        assert_eq!(engine.get_by_id(created.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_find_by_status_name_decorates_best_effort() {
        let harness = Harness::seeded().await;
        let engine = harness.engine();
        engine
            .create(request(&harness, &harness.manual_product, Money::from_major(5_000)))
            .await
            .unwrap();
        // applicant unknown to the identity service, stored directly
        let orphan = LoanApplication::new(
            Money::from_major(2_000),
            6,
            "former@example.com",
            harness.manual_product.id,
        )
        .with_status(harness.pending.id);
        ApplicationRepository::save(harness.store.as_ref(), orphan).await.unwrap();

        let rows = engine.find_by_status_name("pendiente_revision", 0, 10).await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].applicant_name.as_deref(), Some("Laura"));
        assert_eq!(rows[0].base_salary, Some(harness.applicant.base_salary));
        assert_eq!(rows[1].applicant_name, None);
        assert_eq!(rows[1].status_name, "PENDIENTE_REVISION");
    }

    #[tokio::test]
    async fn test_find_by_status_name_survives_identity_outage() {
        let harness = Harness::seeded().await;
        let engine = harness.engine();
        engine
            .create(request(&harness, &harness.manual_product, Money::from_major(5_000)))
            .await
            .unwrap();
        harness.identity.set_unavailable(true);

        let rows = engine.find_by_status_name("PENDIENTE_REVISION", 0, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].applicant_name.is_none());

        assert!(engine.find_by_status_name("APROBADO", 0, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_repository_outage_is_external_failure() {
        let harness = Harness::seeded().await;
        let engine = harness.engine();
        harness.store.set_unavailable(true);

        let err = engine.get_all().await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            LoanError::ExternalCommunicationFailure(ExternalFailure::Repository(_))
        ));
    }

    #[tokio::test]
    async fn test_validation_decision_applies_named_status() {
        let harness = Harness::seeded().await;
        let engine = harness.engine();
        let created = engine
            .create(request(&harness, &harness.automatic_product, Money::from_major(3_000)))
            .await
            .unwrap();
        engine.drain_background().await;

        let body = format!(r#"{{"loanId":"{}","status":"APROBADO"}}"#, created.id);
        let decision = ValidationDecision::from_json(&body).unwrap();
        let updated = engine.apply_validation_decision(&decision).await.unwrap().unwrap();

        assert_eq!(updated.status_id, harness.approved.id);
        assert!(engine.events().events().iter().any(|e| matches!(
            e,
            Event::DecisionApplied { status_name, .. } if status_name == "APROBADO"
        )));

        let blank = ValidationDecision::new(created.id, "");
        assert_eq!(engine.apply_validation_decision(&blank).await.unwrap(), None);

        let unknown = ValidationDecision::new(created.id, "EN_ESPERA");
        assert!(matches!(
            engine.apply_validation_decision(&unknown).await,
            Err(LoanError::StatusNotFound { .. })
        ));

        let missing = ValidationDecision::new(Uuid::new_v4(), "APROBADO");
        assert!(matches!(
            engine.apply_validation_decision(&missing).await,
            Err(LoanError::ApplicationNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_approved_loans_feed_later_debt_snapshots() {
        let harness = Harness::seeded().await;
        let engine = harness.engine();
        let first = engine
            .create(request(&harness, &harness.manual_product, Money::from_major(10_000)))
            .await
            .unwrap();
        engine
            .update_status_and_get_details(first.id, harness.approved.id)
            .await
            .unwrap();

        let second = engine
            .create(request(&harness, &harness.automatic_product, Money::from_major(3_000)))
            .await
            .unwrap();
        engine.drain_background().await;

        let sent = harness.channel.validation_requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].loan_id, second.id);
        assert_eq!(sent[0].active_monthly_payments, vec![Money::from_decimal(dec!(888.49))]);
        assert_eq!(sent[0].total_principal, Money::from_major(10_000));
    }

    #[tokio::test]
    async fn test_long_term_approved_loan_feeds_snapshot() {
        let harness = Harness::seeded().await;
        let engine = harness.engine();
        let decades = LoanApplication::new(
            Money::from_major(10_000),
            8_000,
            harness.applicant.email.clone(),
            harness.manual_product.id,
        )
        .with_status(harness.approved.id);
        ApplicationRepository::save(harness.store.as_ref(), decades).await.unwrap();
        let created = engine
            .create(request(&harness, &harness.automatic_product, Money::from_major(3_000)))
            .await
            .unwrap();
        engine.drain_background().await;

        let outcome = engine.update_status(created.id, harness.approved.id).await.unwrap();

        let RoutingOutcome::Automatic { request, .. } = outcome else {
            panic!("expected automatic outcome");
        };
        assert_eq!(request.active_monthly_payments, vec![Money::from_decimal(dec!(100.00))]);
        assert!(!engine
            .events()
            .events()
            .iter()
            .any(|e| matches!(e, Event::ValidationDispatchFailed { .. })));
    }

    #[tokio::test]
    async fn test_event_log_respects_configured_capacity() {
        let harness = Harness::seeded().await;
        let config = EngineConfig {
            event_log_capacity: 2,
            ..harness.config.clone()
        };
        let engine = LoanApplicationEngine::new(config, harness.ports()).unwrap();

        for _ in 0..3 {
            let created = engine
                .create(request(&harness, &harness.manual_product, Money::from_major(5_000)))
                .await
                .unwrap();
            engine
                .update_status_and_get_details(created.id, harness.approved.id)
                .await
                .unwrap();
        }

        assert_eq!(engine.events().capacity(), 2);
        assert_eq!(engine.events().len(), 2);
        assert!(matches!(engine.events().events()[1], Event::ApplicantNotified { .. }));
    }

    #[test]
    fn test_rejects_invalid_configuration() {
        let config = EngineConfig {
            status_creation_attempts: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            LoanApplicationEngine::new(config, crate::fixtures::empty_ports()),
            Err(LoanError::InvalidConfiguration { .. })
        ));
    }
}
