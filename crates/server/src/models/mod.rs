//! Domain models for the API.
//!
//! These are the row-level types the repositories in [`crate::db`] read and
//! write, plus the session-stored [`CurrentUser`].

pub mod address;
pub mod cart;
pub mod category;
pub mod contact;
pub mod order;
pub mod product;
pub mod user;

pub use address::Address;
pub use cart::{Cart, CartItem, subtotal};
pub use category::Category;
pub use contact::ContactMessage;
pub use order::{Order, OrderItem};
pub use product::{Product, ProductImage};
pub use user::{CurrentUser, User};

/// Keys used for values stored in the session.
pub mod session_keys {
    /// The authenticated user ([`super::CurrentUser`]).
    pub const CURRENT_USER: &str = "current_user";
}
