//! Route handlers

pub mod capture;
pub mod gesture;
pub mod health;
pub mod metrics;
