//! Core business logic for fieldline push notifications.

pub mod services;

pub use services::*;
