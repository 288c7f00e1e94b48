//! Defines the custom error types for the mail-scout core.
//!
//! DNS misses and SMTP refusals are deliberately absent here: they are
//! encoded as profile flags and probe outcomes, not errors. Only
//! conditions that abort an operation surface as `AppError`.

use std::{io, net::AddrParseError};
use thiserror::Error;

/// The primary error type for the discovery and verification process.
#[derive(Error, Debug)]
pub enum AppError {
    /// Error occurring during configuration loading or validation.
    #[error("Configuration Error: {0}")]
    Config(String),

    /// Error related to file input/output operations.
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),

    /// Malformed or unexpected SMTP input or response.
    #[error("SMTP Protocol Error: {0}")]
    SmtpProtocol(String),

    /// Error specifically during the STARTTLS handshake.
    #[error("SMTP STARTTLS Error: {0}")]
    SmtpTls(String),

    /// Error parsing an IP address or socket address.
    #[error("Address Parsing Error: {0}")]
    AddrParse(#[from] AddrParseError),

    /// Error related to concurrency or task execution.
    #[error("Task Execution Error: {0}")]
    Task(String),

    /// Indicates insufficient input data to proceed (e.g., missing name parts).
    #[error("Insufficient Input Data: {0}")]
    InsufficientInput(String),
}

pub type Result<T> = std::result::Result<T, AppError>;
