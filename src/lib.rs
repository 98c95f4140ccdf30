//! Courier - A multi-channel notification dispatcher
//!
//! This library fans a single notification request out to email and push
//! providers, isolates each delivery's failure, and reports every outcome in
//! request order.

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod notification;
pub mod report;
pub mod server;
pub mod services;
pub mod task_manager;

// Re-export core types for convenience
pub use crate::core::*;
pub use crate::error::{DeliveryError, DispatchError};
