//! mail-scout core library: discovers and verifies email addresses using
//! name-pattern generation, DNS mail-authority lookups and non-delivering
//! SMTP probes.
//!
//! The engine never sends mail. Every SMTP session stops after RCPT TO and
//! is closed with QUIT, so verification leaves no message anywhere.
//!
//! ```no_run
//! use mail_scout_core::{Config, MailScout};
//!
//! # async fn run() -> mail_scout_core::Result<()> {
//! let scout = MailScout::new(Config::default())?;
//! let found = scout.find_email("Jane", "Doe", "example.com").await?;
//! for hit in found {
//!     println!("{} ({:.2})", hit.email, hit.confidence);
//! }
//! # Ok(())
//! # }
//! ```

mod batch;
pub mod core;
pub mod dns;
pub mod patterns;
pub mod scoring;
pub mod smtp;

pub use crate::core::config::{Config, ConfigBuilder, ConfigFile};
pub use crate::core::error::{AppError, Result};
pub use crate::core::models::{
    Candidate, DomainProfile, FindRow, FoundEmail, ProbeCode, ProbeOutcome, RowError, RowOutcome,
    VerificationResult, VerificationStatus, VerifyRow,
};
pub use crate::dns::{DnsAuthenticator, DomainAuthority};
pub use crate::smtp::{MailboxProber, SmtpProber};

use crate::batch::{DomainCache, Pipeline};
use std::sync::Arc;

/// The wired discovery and verification engine.
///
/// Cheap to clone; all components are shared behind `Arc`.
#[derive(Clone)]
pub struct MailScout {
    config: Arc<Config>,
    authority: Arc<dyn DomainAuthority>,
    prober: Arc<dyn MailboxProber>,
}

impl MailScout {
    /// Builds an engine with the production DNS resolver and SMTP prober.
    pub fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let authority: Arc<dyn DomainAuthority> =
            Arc::new(DnsAuthenticator::new(Arc::clone(&config))?);
        let prober: Arc<dyn MailboxProber> = Arc::new(SmtpProber::new(Arc::clone(&config))?);
        Ok(Self::with_components(config, authority, prober))
    }

    /// Builds an engine from caller-supplied components. This is the seam
    /// for wiring alternative resolvers or probers, including fakes.
    pub fn with_components(
        config: Arc<Config>,
        authority: Arc<dyn DomainAuthority>,
        prober: Arc<dyn MailboxProber>,
    ) -> Self {
        Self {
            config,
            authority,
            prober,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            Arc::clone(&self.config),
            Arc::clone(&self.authority),
            Arc::clone(&self.prober),
        )
    }

    /// Discovers the most likely addresses for a contact: generates
    /// candidate local parts from the name, verifies each against the
    /// domain, and returns the top results by confidence (generation order
    /// breaking ties). Fails with [`AppError::InsufficientInput`] when the
    /// name yields no usable candidates.
    pub async fn find_email(
        &self,
        first_name: &str,
        last_name: &str,
        domain: &str,
    ) -> Result<Vec<FoundEmail>> {
        let cache = DomainCache::new();
        self.pipeline()
            .find_candidates(&cache, first_name, last_name, domain)
            .await
    }

    /// Verifies a single address end to end: syntax, domain profile,
    /// SMTP probe, scoring. Network trouble yields an `unknown` result
    /// rather than an error.
    pub async fn verify_email(&self, address: &str) -> Result<VerificationResult> {
        let cache = DomainCache::new();
        Ok(self.pipeline().verify_address(&cache, address).await)
    }

    /// Discovers addresses for every row under bounded concurrency and the
    /// batch deadline. Output order matches input order; one row's failure
    /// never affects another's.
    pub async fn bulk_find(&self, rows: Vec<FindRow>) -> Vec<RowOutcome<FindRow, Vec<FoundEmail>>> {
        self.pipeline().run_bulk_find(rows).await
    }

    /// Verifies every row under bounded concurrency and the batch deadline.
    /// Domain-level DNS and catch-all work is shared across rows of the
    /// same domain. Output order matches input order.
    pub async fn bulk_verify(
        &self,
        rows: Vec<VerifyRow>,
    ) -> Vec<RowOutcome<VerifyRow, VerificationResult>> {
        self.pipeline().run_bulk_verify(rows).await
    }
}
