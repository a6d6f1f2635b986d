use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::decimal::Money;
use crate::errors::{LoanError, Result};
use crate::payments::amortization::monthly_payment;
use crate::ports::{ApplicationRepository, ProductTypeRepository, StatusRepository};
use crate::types::{LoanApplication, User};

/// an applicant's current obligations across approved loans
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DebtSummary {
    /// one installment per approved loan, order not significant
    pub monthly_payments: Vec<Money>,
    /// sum of the original principals, not of the installments
    pub total_principal: Money,
}

impl DebtSummary {
    pub fn active_loans(&self) -> usize {
        self.monthly_payments.len()
    }

    pub fn total_monthly_payment(&self) -> Money {
        self.monthly_payments.iter().copied().sum()
    }
}

/// computes debt burden from the applicant's loans in a given status
#[derive(Clone)]
pub struct DebtAggregator {
    applications: Arc<dyn ApplicationRepository>,
    products: Arc<dyn ProductTypeRepository>,
    statuses: Arc<dyn StatusRepository>,
}

impl DebtAggregator {
    pub fn new(
        applications: Arc<dyn ApplicationRepository>,
        products: Arc<dyn ProductTypeRepository>,
        statuses: Arc<dyn StatusRepository>,
    ) -> Self {
        Self {
            applications,
            products,
            statuses,
        }
    }

    /// aggregate every loan of `user` whose status is named `approved_status_name`
    ///
    /// A missing approved status means no active debt. Any loan whose product
    /// cannot be resolved fails the whole aggregation.
    pub async fn aggregate(&self, user: &User, approved_status_name: &str) -> Result<DebtSummary> {
        let Some(approved) = self.statuses.find_by_name(approved_status_name).await? else {
            debug!(status = approved_status_name, "approved status not configured, no active debt");
            return Ok(DebtSummary::default());
        };

        let loans = self
            .applications
            .find_by_applicant_and_status(&user.email, approved.id)
            .await?;

        // ids kept beside the handles so an aborted task still names its loan
        let tasks: Vec<_> = loans
            .into_iter()
            .map(|loan| {
                let products = Arc::clone(&self.products);
                (loan.id, tokio::spawn(async move { installment_for(products.as_ref(), loan).await }))
            })
            .collect();

        let mut summary = DebtSummary::default();
        for (application_id, task) in tasks {
            let (principal, payment) = task.await.map_err(|err| {
                warn!(%application_id, error = %err, "installment task aborted");
                LoanError::AggregationFailure {
                    application_id,
                    reason: format!("installment task aborted: {err}"),
                }
            })??;
            summary.monthly_payments.push(payment);
            summary.total_principal += principal;
        }

        debug!(
            email = %user.email,
            active_loans = summary.active_loans(),
            total_principal = %summary.total_principal,
            "debt aggregated"
        );

        Ok(summary)
    }
}

async fn installment_for(
    products: &dyn ProductTypeRepository,
    loan: LoanApplication,
) -> Result<(Money, Money)> {
    let product = match products.find_by_id(loan.product_type_id).await {
        Ok(Some(product)) => product,
        Ok(None) => {
            warn!(application_id = %loan.id, product_type_id = loan.product_type_id, "approved loan references unknown product");
            return Err(LoanError::AggregationFailure {
                application_id: loan.id,
                reason: format!("product type {} not found", loan.product_type_id),
            });
        }
        Err(err) => {
            warn!(application_id = %loan.id, error = %err, "product lookup failed during aggregation");
            return Err(LoanError::AggregationFailure {
                application_id: loan.id,
                reason: err.to_string(),
            });
        }
    };

    let payment = monthly_payment(loan.amount, product.monthly_rate(), i64::from(loan.term));
    Ok((loan.amount, payment))
}
