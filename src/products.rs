use std::sync::Arc;

use tracing::info;

use crate::decimal::Money;
use crate::errors::{LoanError, Result};
use crate::ports::ProductTypeRepository;
use crate::types::{LoanProductType, ProductTypeId};

/// check `requested` against the product's inclusive bounds
pub fn validate_amount(requested: Money, product: &LoanProductType) -> Result<()> {
    if requested < product.minimum_amount || requested > product.maximum_amount {
        return Err(LoanError::AmountOutOfRange {
            requested,
            minimum: product.minimum_amount,
            maximum: product.maximum_amount,
        });
    }
    Ok(())
}

/// reject product definitions that could never accept an application
pub fn validate_definition(product: &LoanProductType) -> Result<()> {
    if product.name.trim().is_empty() {
        return Err(LoanError::InvalidConfiguration {
            message: "product name must not be empty".to_string(),
        });
    }
    if product.minimum_amount > product.maximum_amount {
        return Err(LoanError::InvalidConfiguration {
            message: format!(
                "minimum amount {} exceeds maximum amount {}",
                product.minimum_amount, product.maximum_amount
            ),
        });
    }
    if product.interest_rate.is_sign_negative() && !product.interest_rate.is_zero() {
        return Err(LoanError::InvalidConfiguration {
            message: format!("interest rate {} must not be negative", product.interest_rate),
        });
    }
    Ok(())
}

/// maintenance of the loan product reference data
#[derive(Clone)]
pub struct ProductCatalog {
    products: Arc<dyn ProductTypeRepository>,
}

impl ProductCatalog {
    pub fn new(products: Arc<dyn ProductTypeRepository>) -> Self {
        Self { products }
    }

    pub async fn create(&self, product: LoanProductType) -> Result<LoanProductType> {
        validate_definition(&product)?;
        let saved = self.products.save(product).await?;
        info!(product_type_id = saved.id, name = %saved.name, "loan product created");
        Ok(saved)
    }

    pub async fn get(&self, id: ProductTypeId) -> Result<LoanProductType> {
        self.products
            .find_by_id(id)
            .await?
            .ok_or(LoanError::ProductNotFound { id })
    }

    pub async fn list(&self) -> Result<Vec<LoanProductType>> {
        Ok(self.products.find_all().await?)
    }

    /// replace an existing product definition
    pub async fn update(&self, product: LoanProductType) -> Result<LoanProductType> {
        validate_definition(&product)?;
        self.get(product.id).await?;
        Ok(self.products.save(product).await?)
    }

    pub async fn delete(&self, id: ProductTypeId) -> Result<()> {
        Ok(self.products.delete_by_id(id).await?)
    }
}
