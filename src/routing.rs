//! Automatic vs. manual handling of a requested status change.
//!
//! Automatic products hand the decision to an external validator: the router
//! snapshots the applicant, the loan and the applicant's current debt into a
//! [`ValidationRequest`] and publishes it, leaving the application untouched.
//! Manual products apply the requested status immediately and notify the
//! applicant.

use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::decimal::Money;
use crate::errors::{LoanError, Result};
use crate::events::{Event, EventLog};
use crate::payments::{DebtAggregator, DebtSummary};
use crate::ports::{Ports, StatusNotification};
use crate::types::{
    ApplicationDetails, ApplicationId, LoanApplication, LoanProductType, ProductTypeId, Status,
    StatusId, User,
};

/// snapshot handed to the external validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
    pub loan_id: ApplicationId,
    pub applicant_name: String,
    pub email: String,
    pub amount: Money,
    pub term: u32,
    /// nominal annual percentage of the product
    pub interest_rate: Decimal,
    pub base_salary: Money,
    /// installment of every currently approved loan
    pub active_monthly_payments: Vec<Money>,
    pub total_principal: Money,
    /// target status asked for by the caller, absent when dispatched on creation
    pub requested_status_id: Option<StatusId>,
    pub product_type_id: ProductTypeId,
    pub automatic_validation: bool,
}

impl ValidationRequest {
    pub fn assemble(
        application: &LoanApplication,
        product: &LoanProductType,
        applicant: &User,
        debt: DebtSummary,
        requested_status_id: Option<StatusId>,
    ) -> Self {
        Self {
            loan_id: application.id,
            applicant_name: applicant.first_name.clone(),
            email: application.email.clone(),
            amount: application.amount,
            term: application.term,
            interest_rate: product.interest_rate,
            base_salary: applicant.base_salary,
            active_monthly_payments: debt.monthly_payments,
            total_principal: debt.total_principal,
            requested_status_id,
            product_type_id: product.id,
            automatic_validation: product.automatic_validation,
        }
    }
}

/// what happened to a status change request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingOutcome {
    /// handed to the external validator; the application keeps its status
    Automatic {
        details: ApplicationDetails,
        request: ValidationRequest,
    },
    /// status applied and the applicant notified
    Manual {
        details: ApplicationDetails,
        notification: StatusNotification,
    },
}

impl RoutingOutcome {
    pub fn details(&self) -> &ApplicationDetails {
        match self {
            RoutingOutcome::Automatic { details, .. } | RoutingOutcome::Manual { details, .. } => {
                details
            }
        }
    }

    pub fn into_details(self) -> ApplicationDetails {
        match self {
            RoutingOutcome::Automatic { details, .. } | RoutingOutcome::Manual { details, .. } => {
                details
            }
        }
    }

    pub fn is_automatic(&self) -> bool {
        matches!(self, RoutingOutcome::Automatic { .. })
    }
}

pub struct ValidationRouter {
    ports: Ports,
    debt: DebtAggregator,
    approved_status: String,
    events: EventLog,
}

impl ValidationRouter {
    pub fn new(ports: Ports, approved_status: impl Into<String>, events: EventLog) -> Self {
        let debt = DebtAggregator::new(
            Arc::clone(&ports.applications),
            Arc::clone(&ports.products),
            Arc::clone(&ports.statuses),
        );
        Self {
            ports,
            debt,
            approved_status: approved_status.into(),
            events,
        }
    }

    /// route a request to move `application` to `requested_status_id`
    pub async fn route(
        &self,
        application: LoanApplication,
        product: LoanProductType,
        requested_status_id: StatusId,
    ) -> Result<RoutingOutcome> {
        if product.automatic_validation {
            // resolved before publishing so a failed lookup sends nothing
            let status = self.status_by_id(application.status_id).await?;
            let request = self
                .submit_automatic(&application, &product, Some(requested_status_id))
                .await?;
            Ok(RoutingOutcome::Automatic {
                details: ApplicationDetails {
                    application,
                    status,
                    product,
                },
                request,
            })
        } else {
            self.apply_manual(application, product, requested_status_id).await
        }
    }

    /// build the validation snapshot for `application` and publish it
    pub async fn submit_automatic(
        &self,
        application: &LoanApplication,
        product: &LoanProductType,
        requested_status_id: Option<StatusId>,
    ) -> Result<ValidationRequest> {
        let applicant = self.applicant(&application.email).await?;
        let debt = self.debt.aggregate(&applicant, &self.approved_status).await?;
        let active_loans = debt.active_loans();

        let request =
            ValidationRequest::assemble(application, product, &applicant, debt, requested_status_id);
        self.ports.channel.submit_for_validation(&request).await?;

        info!(
            application_id = %application.id,
            active_loans,
            total_principal = %request.total_principal,
            "validation request submitted"
        );
        self.events.emit(Event::ValidationRequested {
            application_id: application.id,
            requested_status_id,
            active_loans,
            timestamp: Utc::now(),
        });

        Ok(request)
    }

    async fn apply_manual(
        &self,
        application: LoanApplication,
        product: LoanProductType,
        requested_status_id: StatusId,
    ) -> Result<RoutingOutcome> {
        // resolved before the write so an unknown target leaves the record untouched
        let status = self.status_by_id(requested_status_id).await?;

        let old_status_id = application.status_id;
        let saved = self
            .ports
            .applications
            .save(application.with_status(status.id))
            .await?;

        info!(
            application_id = %saved.id,
            old_status_id,
            new_status_id = status.id,
            "application status changed"
        );
        self.events.emit(Event::StatusChanged {
            application_id: saved.id,
            old_status_id,
            new_status_id: status.id,
            timestamp: Utc::now(),
        });

        let notification = StatusNotification {
            loan_id: saved.id,
            status: status.name.clone(),
            email: saved.email.clone(),
        };
        self.ports.channel.notify(&notification).await?;
        self.events.emit(Event::ApplicantNotified {
            application_id: saved.id,
            status_name: status.name.clone(),
            timestamp: Utc::now(),
        });

        Ok(RoutingOutcome::Manual {
            details: ApplicationDetails {
                application: saved,
                status,
                product,
            },
            notification,
        })
    }

    async fn applicant(&self, email: &str) -> Result<User> {
        let users = self
            .ports
            .identity
            .find_details_by_emails(&[email.to_string()])
            .await?;
        users
            .into_iter()
            .find(|user| user.email == email)
            .ok_or_else(|| {
                debug!(email, "identity service returned no matching applicant");
                LoanError::ApplicantNotFound {
                    email: email.to_string(),
                }
            })
    }

    async fn status_by_id(&self, id: StatusId) -> Result<Status> {
        self.ports
            .statuses
            .find_by_id(id)
            .await?
            .ok_or_else(|| LoanError::StatusNotFound {
                reference: format!("id {id}"),
            })
    }
}
