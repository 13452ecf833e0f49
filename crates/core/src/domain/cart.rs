use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::product::ProductId;
use crate::domain::user::UserId;
use crate::errors::DomainError;
use crate::pricing::{self, LineAmount, PricingConfig, Totals};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CartId(pub String);

impl CartId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CartStatus {
    Active,
    Converted,
    Abandoned,
}

impl CartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Converted => "converted",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "converted" => Some(Self::Converted),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }
}

/// One line per product. The unit price is snapshotted when the line is
/// first added and never re-read from the catalog afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub added_at: DateTime<Utc>,
}

/// A user's cart. Mutators keep `totals` consistent with `items`; the
/// repository persists the cart row and its lines as one unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub owner: Option<UserId>,
    pub status: CartStatus,
    pub items: Vec<CartItem>,
    pub totals: Totals,
    pub created_at: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
}

impl Cart {
    pub fn new(owner: Option<UserId>, config: &PricingConfig, now: DateTime<Utc>) -> Self {
        Self {
            id: CartId::generate(),
            owner,
            status: CartStatus::Active,
            items: Vec::new(),
            totals: pricing::totals_of(&[], config),
            created_at: now,
            last_updated: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn line(&self, product_id: &ProductId) -> Option<&CartItem> {
        self.items.iter().find(|item| &item.product_id == product_id)
    }

    /// Quantity currently carried for a product, zero when it has no line.
    pub fn quantity_of(&self, product_id: &ProductId) -> u32 {
        self.line(product_id).map(|item| item.quantity).unwrap_or(0)
    }

    /// Adds `quantity` of a product. An existing line keeps its original
    /// price snapshot and grows by `quantity`; otherwise a new line is
    /// appended at `unit_price`.
    pub fn add_line(
        &mut self,
        product_id: ProductId,
        unit_price: Decimal,
        quantity: u32,
        config: &PricingConfig,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if quantity == 0 {
            return Err(DomainError::QuantityZero);
        }
        if unit_price < Decimal::ZERO {
            return Err(DomainError::NegativePrice);
        }

        match self.items.iter_mut().find(|item| item.product_id == product_id) {
            Some(item) => item.quantity += quantity,
            None => {
                self.items.push(CartItem { product_id, quantity, unit_price, added_at: now })
            }
        }
        self.recalculate(config, now);
        Ok(())
    }

    /// Sets a line to an absolute quantity. Zero is invalid input, not an
    /// implicit remove.
    pub fn set_line_quantity(
        &mut self,
        product_id: &ProductId,
        quantity: u32,
        config: &PricingConfig,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        if quantity == 0 {
            return Err(DomainError::QuantityZero);
        }

        let item = self
            .items
            .iter_mut()
            .find(|item| &item.product_id == product_id)
            .ok_or_else(|| DomainError::LineNotFound(product_id.0.clone()))?;
        item.quantity = quantity;
        self.recalculate(config, now);
        Ok(())
    }

    pub fn remove_line(
        &mut self,
        product_id: &ProductId,
        config: &PricingConfig,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let before = self.items.len();
        self.items.retain(|item| &item.product_id != product_id);
        if self.items.len() == before {
            return Err(DomainError::LineNotFound(product_id.0.clone()));
        }
        self.recalculate(config, now);
        Ok(())
    }

    pub fn clear(&mut self, config: &PricingConfig, now: DateTime<Utc>) {
        self.items.clear();
        self.recalculate(config, now);
    }

    /// Folds another cart's lines into this one: quantities add for products
    /// present in both (this cart's price snapshot wins), lines only in the
    /// source are carried over unchanged.
    pub fn merge_lines_from(&mut self, source: Cart, config: &PricingConfig, now: DateTime<Utc>) {
        for incoming in source.items {
            match self.items.iter_mut().find(|item| item.product_id == incoming.product_id) {
                Some(item) => item.quantity += incoming.quantity,
                None => self.items.push(incoming),
            }
        }
        self.recalculate(config, now);
    }

    fn recalculate(&mut self, config: &PricingConfig, now: DateTime<Utc>) {
        let amounts: Vec<LineAmount> = self
            .items
            .iter()
            .map(|item| LineAmount::new(item.unit_price, item.quantity))
            .collect();
        self.totals = pricing::totals_of(&amounts, config);
        self.last_updated = now;
    }
}
