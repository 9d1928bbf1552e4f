//! Order lifecycle and inventory reservation engine.
//!
//! Turns carts into orders, reserves stock against them, applies loyalty
//! discounts, and reconciles at-least-once payment notifications so that
//! each one takes effect at most once. Everything runs on a relational
//! store through sea-orm; order rows are locked with `SELECT ... FOR UPDATE`
//! and stock counters only move through guarded single-statement updates.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod metrics;
pub mod migrator;
pub mod repositories;
pub mod services;

pub use errors::ServiceError;
pub use services::factory::ServiceFactory;
pub use services::orders::OrderService;
