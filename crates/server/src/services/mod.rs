//! Business logic services.

pub mod auth;
pub mod email;
pub mod images;
