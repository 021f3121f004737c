//! Configuration and run result models.

pub mod config;
pub mod summary;
