pub mod auth;
pub mod config;
pub mod domain;
pub mod errors;
pub mod pricing;

pub use domain::cart::{Cart, CartId, CartItem, CartStatus};
pub use domain::order::{
    Address, Order, OrderId, OrderItem, OrderStatus, PaymentInfo, PaymentMethod, PaymentStatus,
};
pub use domain::product::{Discount, DiscountPatch, Product, ProductId, ProductPatch};
pub use domain::user::{ProfilePatch, Role, User, UserId};
pub use errors::DomainError;
pub use pricing::{LineAmount, PricingConfig, Totals};
