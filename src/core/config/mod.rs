//! Defines the core runtime `Config` struct, its defaults, and related utilities.
//! Submodules handle file loading and builder-based construction.

pub(crate) mod builder;
pub(crate) mod file;

pub use builder::ConfigBuilder;
pub use file::ConfigFile;

use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;

static DEFAULT_EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
        .expect("Default email regex pattern failed to compile. This is a bug.")
});

/// Runtime configuration settings used by the mail-scout core logic.
#[derive(Clone)]
pub struct Config {
    pub dns_timeout: Duration,
    pub dns_servers: Vec<String>,

    pub smtp_timeout: Duration,
    /// Sender used in MAIL FROM. Must live on a controlled domain, never the
    /// target domain, to avoid being treated as spoofing.
    pub smtp_sender_email: String,
    /// Name announced in EHLO/HELO.
    pub smtp_hello_name: String,
    /// Total probe attempts for a greylisted recipient. 2 means exactly one
    /// bounded retry after the initial 450/451.
    pub max_verification_attempts: u32,
    /// Jitter bounds in seconds for the greylist retry backoff.
    pub retry_backoff: (f32, f32),
    /// Providers known to block RCPT probing; the SMTP dial is skipped for
    /// these and the result scored from DNS signals only.
    pub smtp_blocked_domains: Vec<String>,
    pub enable_catch_all_check: bool,

    /// Alternatives returned by the find operations (1-2).
    pub max_results: usize,
    pub max_concurrency: usize,
    /// Overall deadline for one bulk batch. Rows not finished in time are
    /// reported as `unknown` placeholders.
    pub batch_deadline: Duration,

    pub email_regex: Regex,

    pub loaded_config_path: Option<String>,
}

impl Config {
    fn build_default() -> Self {
        let dns_servers = vec![
            "8.8.8.8".to_string(),
            "8.8.4.4".to_string(),
            "1.1.1.1".to_string(),
            "1.0.0.1".to_string(),
        ];
        let blocked_domains = [
            "outlook.com",
            "hotmail.com",
            "live.com",
            "msn.com",
            "gmail.com",
            "googlemail.com",
            "yahoo.com",
            "yahoo.co.uk",
            "aol.com",
            "icloud.com",
            "me.com",
            "mac.com",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        Config {
            dns_timeout: Duration::from_secs(3),
            dns_servers,
            smtp_timeout: Duration::from_secs(8),
            smtp_sender_email: "verify-probe@example.com".to_string(),
            smtp_hello_name: "localhost".to_string(),
            max_verification_attempts: 2,
            retry_backoff: (1.0, 3.0),
            smtp_blocked_domains: blocked_domains,
            enable_catch_all_check: true,
            max_results: 2,
            max_concurrency: 10,
            batch_deadline: Duration::from_secs(300),
            email_regex: DEFAULT_EMAIL_REGEX.clone(),
            loaded_config_path: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::build_default()
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("dns_timeout", &self.dns_timeout)
            .field("dns_servers_count", &self.dns_servers.len())
            .field("smtp_timeout", &self.smtp_timeout)
            .field("smtp_sender_email", &self.smtp_sender_email)
            .field("smtp_hello_name", &self.smtp_hello_name)
            .field("max_verification_attempts", &self.max_verification_attempts)
            .field("retry_backoff", &self.retry_backoff)
            .field(
                "smtp_blocked_domains_count",
                &self.smtp_blocked_domains.len(),
            )
            .field("enable_catch_all_check", &self.enable_catch_all_check)
            .field("max_results", &self.max_results)
            .field("max_concurrency", &self.max_concurrency)
            .field("batch_deadline", &self.batch_deadline)
            .field("email_regex", &self.email_regex.as_str())
            .field("loaded_config_path", &self.loaded_config_path)
            .finish()
    }
}

/// Utility function to get a random backoff duration based on [`Config`].
///
/// Uses the `retry_backoff` jitter bounds from the provided configuration.
pub fn get_random_backoff_duration(config: &Config) -> Duration {
    use rand::Rng;
    let (min, max) = config.retry_backoff;
    if min >= max {
        return Duration::from_secs_f32(min.max(0.0));
    }
    let duration_secs = rand::thread_rng().gen_range(min..max);
    Duration::from_secs_f32(duration_secs)
}
