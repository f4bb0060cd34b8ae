//! Miorah Collections API server library.
//!
//! The binary in `main.rs` wires these modules into a running axum service;
//! they are exposed as a library so integration tests can drive routers and
//! middleware directly.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
