//! SMTP probing: the RCPT TO handshake state machine and catch-all
//! detection. No probe ever enters the DATA stage, so no message can be
//! delivered.

pub(crate) mod catch_all;
mod prober;

pub use prober::SmtpProber;

use crate::core::error::Result;
use crate::core::models::ProbeOutcome;
use async_trait::async_trait;

/// Seam for mailbox probing; implemented by the production SMTP prober and
/// by scripted fakes in tests.
#[async_trait]
pub trait MailboxProber: Send + Sync {
    /// Probes `local_part@domain` against `mx_hosts` in priority order
    /// until one host yields a decisive outcome or all are exhausted.
    async fn probe(&self, local_part: &str, domain: &str, mx_hosts: &[String])
        -> Result<ProbeOutcome>;
}
