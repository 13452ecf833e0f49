use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;
use crate::pricing;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

impl ProductId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

/// Percentage discount that applies until an expiry instant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Discount {
    pub percentage: Decimal,
    pub valid_until: DateTime<Utc>,
}

impl Discount {
    pub fn new(percentage: Decimal, valid_until: DateTime<Utc>) -> Result<Self, DomainError> {
        if percentage < Decimal::ZERO || percentage > Decimal::from(100) {
            return Err(DomainError::DiscountOutOfRange);
        }
        Ok(Self { percentage, valid_until })
    }

    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.percentage > Decimal::ZERO && self.valid_until > now
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub sku: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: Decimal,
    pub stock: u32,
    pub active: bool,
    pub discount: Option<Discount>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// List price with any currently valid discount applied, rounded to cents.
    pub fn effective_price(&self, now: DateTime<Utc>) -> Decimal {
        match &self.discount {
            Some(discount) if discount.is_valid_at(now) => {
                let factor = Decimal::ONE - discount.percentage / Decimal::from(100);
                pricing::round_cents(self.price * factor)
            }
            _ => self.price,
        }
    }

    pub fn is_in_stock(&self, quantity: u32) -> bool {
        self.active && self.stock >= quantity
    }
}

/// Discount change carried inside a [`ProductPatch`]. A zero percentage
/// clears the discount; any other percentage needs an expiry.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscountPatch {
    pub percentage: Decimal,
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

/// Catalog fields an admin may change. Absent fields stay as they are;
/// unknown fields are rejected when the patch is deserialized.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub price: Option<Decimal>,
    pub active: Option<bool>,
    pub discount: Option<DiscountPatch>,
}

impl ProductPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.price.is_none()
            && self.active.is_none()
            && self.discount.is_none()
    }

    pub fn apply(&self, product: &mut Product, now: DateTime<Utc>) -> Result<(), DomainError> {
        if let Some(name) = &self.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(DomainError::InvariantViolation(
                    "product name cannot be empty".to_string(),
                ));
            }
            product.name = name.to_string();
        }
        if let Some(description) = &self.description {
            product.description = description.clone();
        }
        if let Some(category) = &self.category {
            let category = category.trim();
            if category.is_empty() {
                return Err(DomainError::InvariantViolation(
                    "product category cannot be empty".to_string(),
                ));
            }
            product.category = category.to_string();
        }
        if let Some(price) = self.price {
            if price < Decimal::ZERO {
                return Err(DomainError::NegativePrice);
            }
            product.price = price;
        }
        if let Some(active) = self.active {
            product.active = active;
        }
        if let Some(discount) = &self.discount {
            product.discount = if discount.percentage == Decimal::ZERO {
                None
            } else {
                let valid_until = discount.valid_until.ok_or_else(|| {
                    DomainError::InvariantViolation(
                        "discount requires a valid_until expiry".to_string(),
                    )
                })?;
                Some(Discount::new(discount.percentage, valid_until)?)
            };
        }
        product.updated_at = now;
        Ok(())
    }
}
