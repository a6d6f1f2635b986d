use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::{Money, Rate};

/// unique identifier for a loan application
pub type ApplicationId = Uuid;

/// serial identifier for a status record
pub type StatusId = i32;

/// serial identifier for a loan product type
pub type ProductTypeId = i32;

/// id carried by records not yet persisted; serial ids start at 1
pub const UNASSIGNED_ID: i32 = 0;

/// a credit request made by an applicant for one product type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanApplication {
    pub id: ApplicationId,
    pub amount: Money,
    /// number of monthly periods
    pub term: u32,
    pub email: String,
    pub status_id: StatusId,
    pub product_type_id: ProductTypeId,
}

impl LoanApplication {
    /// new application; status is assigned on creation by the engine
    pub fn new(amount: Money, term: u32, email: impl Into<String>, product_type_id: ProductTypeId) -> Self {
        Self {
            id: Uuid::new_v4(),
            amount,
            term,
            email: email.into(),
            status_id: UNASSIGNED_ID,
            product_type_id,
        }
    }

    pub fn with_status(self, status_id: StatusId) -> Self {
        Self { status_id, ..self }
    }

    pub fn with_product_type(self, product_type_id: ProductTypeId) -> Self {
        Self { product_type_id, ..self }
    }

    pub fn with_terms(self, amount: Money, term: u32) -> Self {
        Self { amount, term, ..self }
    }
}

/// configured loan category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanProductType {
    pub id: ProductTypeId,
    pub name: String,
    pub minimum_amount: Money,
    pub maximum_amount: Money,
    /// nominal annual percentage, e.g. `18.5`
    pub interest_rate: Decimal,
    /// route status changes through the external validator instead of a reviewer
    pub automatic_validation: bool,
}

impl LoanProductType {
    pub fn new(
        name: impl Into<String>,
        minimum_amount: Money,
        maximum_amount: Money,
        interest_rate: Decimal,
        automatic_validation: bool,
    ) -> Self {
        Self {
            id: UNASSIGNED_ID,
            name: name.into(),
            minimum_amount,
            maximum_amount,
            interest_rate,
            automatic_validation,
        }
    }

    pub fn with_id(self, id: ProductTypeId) -> Self {
        Self { id, ..self }
    }

    pub fn annual_rate(&self) -> Rate {
        Rate::from_annual_percentage(self.interest_rate)
    }

    /// periodic rate used for amortization (`annual / 100 / 12`)
    pub fn monthly_rate(&self) -> Rate {
        self.annual_rate().monthly_rate()
    }
}

/// named application status such as "PENDIENTE_REVISION" or "APROBADO"
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: StatusId,
    pub name: String,
    pub description: String,
}

impl Status {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: UNASSIGNED_ID,
            name: name.into(),
            description: description.into(),
        }
    }

    pub fn with_id(self, id: StatusId) -> Self {
        Self { id, ..self }
    }
}

/// applicant projection served by the identity system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub first_name: String,
    pub base_salary: Money,
}

/// row of the paginated listing by status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanSummary {
    pub application_id: ApplicationId,
    pub amount: Money,
    pub term: u32,
    pub email: String,
    pub applicant_name: Option<String>,
    pub base_salary: Option<Money>,
    pub product_type_id: ProductTypeId,
    pub product_name: String,
    pub interest_rate: Decimal,
    pub automatic_validation: bool,
    pub status_name: String,
    /// sum of the applicant's approved principals
    pub total_approved_debt: Money,
}

impl LoanSummary {
    /// decorate with the applicant's display name and declared salary
    pub fn with_applicant(self, user: &User) -> Self {
        Self {
            applicant_name: Some(user.first_name.clone()),
            base_salary: Some(user.base_salary),
            ..self
        }
    }
}

/// application together with its resolved status and product type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationDetails {
    pub application: LoanApplication,
    pub status: Status,
    pub product: LoanProductType,
}
