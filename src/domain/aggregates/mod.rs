//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;

pub use product::{Product, ProductType};
pub use order::{Order, OrderCustomer, OrderItem, OrderStatus, OrderedProduct, PaymentMethod, PaymentStatus, ShippingAddress};
pub use cart::{Cart, CartItem, NewCartItem};
