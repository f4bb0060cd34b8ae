//! Shared type definitions.

mod email;
mod id;
mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use status::{OrderStatus, PaymentStatus, UserRole};
