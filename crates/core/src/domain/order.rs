use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::product::ProductId;
use crate::domain::user::UserId;
use crate::errors::DomainError;
use crate::pricing::Totals;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

impl OrderId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Shipped => "shipped",
            Self::Delivered => "delivered",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "shipped" => Some(Self::Shipped),
            "delivered" => Some(Self::Delivered),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard,
    Paypal,
    Stripe,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreditCard => "credit_card",
            Self::Paypal => "paypal",
            Self::Stripe => "stripe",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "credit_card" => Some(Self::CreditCard),
            "paypal" => Some(Self::Paypal),
            "stripe" => Some(Self::Stripe),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub zip_code: String,
}

/// Payment is tracked as status only; no gateway is wired up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
}

impl PaymentInfo {
    /// Payment record for a checkout settled by the built-in simulator:
    /// immediately completed under a synthetic transaction id.
    pub fn simulated(method: PaymentMethod) -> Self {
        Self {
            method,
            status: PaymentStatus::Completed,
            transaction_id: Some(format!("txn-{}", Uuid::new_v4().simple())),
        }
    }
}

/// Product name, unit price, and quantity as they were at checkout. Catalog
/// changes after that moment never reach back into the order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub totals: Totals,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub payment: PaymentInfo,
    pub notes: Option<String>,
    pub tracking_number: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (&self.status, next),
            (OrderStatus::Pending, OrderStatus::Processing)
                | (OrderStatus::Processing, OrderStatus::Shipped)
                | (OrderStatus::Shipped, OrderStatus::Delivered)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Processing, OrderStatus::Cancelled)
        )
    }

    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next.clone()) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidOrderTransition { from: self.status.clone(), to: next })
    }

    /// Cancellation closes once fulfilment starts shipping.
    pub fn is_cancellable(&self) -> bool {
        matches!(self.status, OrderStatus::Pending | OrderStatus::Processing)
    }

    /// Delivery estimate applied when an order ships without an explicit one.
    pub fn default_delivery_estimate(shipped_at: DateTime<Utc>) -> DateTime<Utc> {
        shipped_at + Duration::days(7)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use crate::domain::product::ProductId;
    use crate::domain::user::UserId;
    use crate::errors::DomainError;
    use crate::pricing::Totals;

    use super::{
        Address, Order, OrderId, OrderItem, OrderStatus, PaymentInfo, PaymentMethod, PaymentStatus,
    };

    fn address() -> Address {
        Address {
            street: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            state: "IL".to_string(),
            country: "US".to_string(),
            zip_code: "62701".to_string(),
        }
    }

    fn order(status: OrderStatus) -> Order {
        let now = Utc::now();
        Order {
            id: OrderId("o-1".to_string()),
            user_id: UserId("u-1".to_string()),
            status,
            items: vec![OrderItem {
                product_id: ProductId("p-1".to_string()),
                name: "Widget".to_string(),
                quantity: 2,
                unit_price: Decimal::new(2500, 2),
            }],
            totals: Totals {
                subtotal: Decimal::new(5000, 2),
                tax: Decimal::new(500, 2),
                shipping: Decimal::from(10),
                total: Decimal::new(6500, 2),
            },
            shipping_address: address(),
            billing_address: address(),
            payment: PaymentInfo {
                method: PaymentMethod::CreditCard,
                status: PaymentStatus::Pending,
                transaction_id: None,
            },
            notes: None,
            tracking_number: None,
            estimated_delivery: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn fulfilment_advances_one_step_at_a_time() {
        let mut order = order(OrderStatus::Pending);
        order.transition_to(OrderStatus::Processing).expect("pending -> processing");
        order.transition_to(OrderStatus::Shipped).expect("processing -> shipped");
        order.transition_to(OrderStatus::Delivered).expect("shipped -> delivered");
        assert_eq!(order.status, OrderStatus::Delivered);
    }

    #[test]
    fn pending_cannot_skip_to_shipped() {
        let mut order = order(OrderStatus::Pending);
        let error = order.transition_to(OrderStatus::Shipped).expect_err("skip should fail");
        assert!(matches!(error, DomainError::InvalidOrderTransition { .. }));
        assert_eq!(order.status, OrderStatus::Pending);
    }

    #[test]
    fn cancellation_is_open_until_shipment() {
        assert!(order(OrderStatus::Pending).can_transition_to(OrderStatus::Cancelled));
        assert!(order(OrderStatus::Processing).can_transition_to(OrderStatus::Cancelled));
        assert!(!order(OrderStatus::Shipped).can_transition_to(OrderStatus::Cancelled));
        assert!(!order(OrderStatus::Delivered).can_transition_to(OrderStatus::Cancelled));
    }

    #[test]
    fn terminal_states_accept_no_transitions() {
        for terminal in [OrderStatus::Delivered, OrderStatus::Cancelled] {
            for next in [
                OrderStatus::Pending,
                OrderStatus::Processing,
                OrderStatus::Shipped,
                OrderStatus::Delivered,
                OrderStatus::Cancelled,
            ] {
                assert!(
                    !order(terminal.clone()).can_transition_to(next.clone()),
                    "{terminal:?} -> {next:?} must be blocked"
                );
            }
        }
    }

    #[test]
    fn delivery_estimate_defaults_to_a_week_out() {
        let shipped_at = Utc::now();
        assert_eq!(
            Order::default_delivery_estimate(shipped_at),
            shipped_at + Duration::days(7)
        );
    }
}
