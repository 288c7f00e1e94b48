//! Core building blocks: configuration, error taxonomy, and shared models.

pub mod config;
pub mod error;
pub mod models;
