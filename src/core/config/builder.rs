//! Builder-based construction and validation of the runtime [`Config`].

use super::file::ConfigFile;
use super::Config;
use crate::core::error::{AppError, Result};
use lettre::Address;
use std::net::IpAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Builds a validated [`Config`], optionally layering a TOML file over the
/// defaults before applying programmatic overrides.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Layers settings from a TOML file over the current values.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = ConfigFile::load(path)?;

        if let Some(secs) = file.dns.dns_timeout {
            self.config.dns_timeout = Duration::from_secs(secs);
        }
        if let Some(servers) = file.dns.dns_servers {
            self.config.dns_servers = servers;
        }
        if let Some(secs) = file.smtp.smtp_timeout {
            self.config.smtp_timeout = Duration::from_secs(secs);
        }
        if let Some(sender) = file.smtp.smtp_sender_email {
            self.config.smtp_sender_email = sender;
        }
        if let Some(hello) = file.smtp.smtp_hello_name {
            self.config.smtp_hello_name = hello;
        }
        if let Some(attempts) = file.smtp.max_verification_attempts {
            self.config.max_verification_attempts = attempts;
        }
        if let Some(min) = file.smtp.retry_backoff_min {
            self.config.retry_backoff.0 = min;
        }
        if let Some(max) = file.smtp.retry_backoff_max {
            self.config.retry_backoff.1 = max;
        }
        if let Some(blocked) = file.smtp.blocked_domains {
            self.config.smtp_blocked_domains = blocked;
        }
        if let Some(enabled) = file.verification.enable_catch_all_check {
            self.config.enable_catch_all_check = enabled;
        }
        if let Some(max_results) = file.verification.max_results {
            self.config.max_results = max_results;
        }
        if let Some(concurrency) = file.verification.max_concurrency {
            self.config.max_concurrency = concurrency;
        }
        if let Some(secs) = file.verification.batch_deadline {
            self.config.batch_deadline = Duration::from_secs(secs);
        }

        self.config.loaded_config_path = Some(path.display().to_string());
        Ok(self)
    }

    pub fn dns_servers(mut self, servers: Vec<String>) -> Self {
        self.config.dns_servers = servers;
        self
    }

    pub fn dns_timeout(mut self, timeout: Duration) -> Self {
        self.config.dns_timeout = timeout;
        self
    }

    pub fn smtp_timeout(mut self, timeout: Duration) -> Self {
        self.config.smtp_timeout = timeout;
        self
    }

    pub fn sender_email(mut self, sender: impl Into<String>) -> Self {
        self.config.smtp_sender_email = sender.into();
        self
    }

    pub fn hello_name(mut self, name: impl Into<String>) -> Self {
        self.config.smtp_hello_name = name.into();
        self
    }

    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.config.max_concurrency = limit;
        self
    }

    pub fn batch_deadline(mut self, deadline: Duration) -> Self {
        self.config.batch_deadline = deadline;
        self
    }

    pub fn max_results(mut self, max_results: usize) -> Self {
        self.config.max_results = max_results;
        self
    }

    pub fn enable_catch_all_check(mut self, enabled: bool) -> Self {
        self.config.enable_catch_all_check = enabled;
        self
    }

    /// Validates and returns the finished configuration.
    pub fn build(self) -> Result<Config> {
        validate(&self.config)?;
        Ok(self.config)
    }
}

fn validate(config: &Config) -> Result<()> {
    if Address::from_str(&config.smtp_sender_email).is_err() {
        return Err(AppError::Config(format!(
            "smtp_sender_email '{}' is not a valid address",
            config.smtp_sender_email
        )));
    }
    if config.smtp_hello_name.trim().is_empty() {
        return Err(AppError::Config(
            "smtp_hello_name must not be empty".to_string(),
        ));
    }
    if config.dns_servers.is_empty() {
        return Err(AppError::Config(
            "at least one DNS server is required".to_string(),
        ));
    }
    for server in &config.dns_servers {
        if IpAddr::from_str(server).is_err() {
            return Err(AppError::Config(format!(
                "dns server '{}' is not a valid IP address",
                server
            )));
        }
    }
    if config.max_concurrency == 0 {
        return Err(AppError::Config(
            "max_concurrency must be at least 1".to_string(),
        ));
    }
    if config.max_verification_attempts == 0 {
        return Err(AppError::Config(
            "max_verification_attempts must be at least 1".to_string(),
        ));
    }
    if config.max_results == 0 || config.max_results > 2 {
        return Err(AppError::Config(
            "max_results must be 1 or 2".to_string(),
        ));
    }
    if config.retry_backoff.0 < 0.0 || config.retry_backoff.1 < config.retry_backoff.0 {
        return Err(AppError::Config(format!(
            "retry_backoff bounds ({}, {}) are invalid",
            config.retry_backoff.0, config.retry_backoff.1
        )));
    }
    Ok(())
}
