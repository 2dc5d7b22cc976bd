//! Yanev Ski Shop storefront
//!
//! Headless storefront service for a Swiss ski-equipment retailer. The shop
//! backend owns products, orders and payments; this service owns the flows in
//! between and serves them as JSON to the browser.
//!
//! ## Features
//! - Catalog filtering and sorting
//! - Session carts with free-shipping pricing
//! - Checkout with card and TWINT payment handles
//! - Payment reconciliation after redirect-based payments
//! - Customer order tracking
//! - Admin product, order and finance operations

use thiserror::Error;

pub mod admin;
pub mod api;
pub mod auth;
pub mod cart_store;
pub mod catalog;
pub mod checkout;
pub mod config;
pub mod domain;
pub mod orders;
pub mod pricing;
pub mod publisher;
pub mod reconcile;
pub mod server;

pub use domain::value_objects::Chf;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("Backend returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Backend unreachable: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Malformed payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Email address not verified")]
    EmailNotVerified,

    #[error("Access denied")]
    AccessDenied,

    #[error("Cart is empty")]
    EmptyCart,

    #[error("Checkout is not in the {expected} step")]
    InvalidCheckoutState { expected: &'static str },

    #[error("Payment succeeded but order {order_id} could not be updated")]
    PaymentNotRecorded { order_id: String },

    #[error("Payment reconciliation cancelled")]
    ReconciliationCancelled,

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<validator::ValidationErrors> for StorefrontError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
