//! Core data types shared across the discovery and verification pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One generated guess for a contact's address.
///
/// Produced by the pattern generator and consumed by scoring; the
/// `pattern_id` records which naming convention built the local part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub local_part: String,
    pub domain: String,
    pub pattern_id: &'static str,
}

impl Candidate {
    /// Full `local@domain` form of this candidate.
    pub fn address(&self) -> String {
        format!("{}@{}", self.local_part, self.domain)
    }
}

/// DNS-derived facts about a domain.
///
/// Built at most once per domain per batch and shared read-only across
/// every candidate and row referencing that domain.
#[derive(Debug, Clone)]
pub struct DomainProfile {
    pub domain: String,
    /// Mail hosts ordered ascending by MX priority. Contains the domain
    /// itself when the A/AAAA fallback was used.
    pub mx_hosts: Vec<String>,
    pub has_valid_mx: bool,
    pub spf: bool,
    pub dkim: bool,
    pub dmarc: bool,
    pub is_catch_all: bool,
    pub fetched_at: DateTime<Utc>,
}

impl DomainProfile {
    /// Profile for a domain with no MX and no A/AAAA records. Forces every
    /// candidate on the domain to `invalid` with confidence 0.
    pub fn unresolvable(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            mx_hosts: Vec::new(),
            has_valid_mx: false,
            spf: false,
            dkim: false,
            dmarc: false,
            is_catch_all: false,
            fetched_at: Utc::now(),
        }
    }

    /// True when any of SPF, DKIM or DMARC is published for the domain.
    pub fn has_auth_records(&self) -> bool {
        self.spf || self.dkim || self.dmarc
    }
}

/// Classification of a single SMTP probe attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeCode {
    /// RCPT TO answered 250: the server claims the mailbox exists.
    Accepted,
    /// Permanent 5xx rejection: the mailbox does not exist.
    Rejected,
    /// 450/451 transient rejection, typically greylisting.
    Greylisted,
    /// 421 service unavailable; the next MX host should be tried.
    TempUnavailable,
    /// No host produced a decisive answer (connect failures, timeouts).
    Unreachable,
}

/// Transient outcome of one SMTP probe. Never persisted.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub code: ProbeCode,
    /// The raw RCPT TO reply code, when one was received.
    pub raw_response_code: Option<u16>,
    /// The MX host that produced the decisive answer, if any.
    pub server_host: Option<String>,
    /// Short operator-facing detail about the outcome.
    pub detail: String,
}

impl ProbeOutcome {
    pub fn new(
        code: ProbeCode,
        raw_response_code: Option<u16>,
        server_host: Option<&str>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            code,
            raw_response_code,
            server_host: server_host.map(str::to_string),
            detail: detail.into(),
        }
    }

    pub fn unreachable(server_host: Option<&str>, detail: impl Into<String>) -> Self {
        Self::new(ProbeCode::Unreachable, None, server_host, detail)
    }
}

/// Terminal status reported for one address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Valid,
    Invalid,
    CatchAll,
    Unknown,
}

/// Terminal output of the verification pipeline for one address.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub address: String,
    pub status: VerificationStatus,
    /// Calibrated confidence in [0, 1], derived purely from the additive
    /// scoring weights.
    pub confidence: f64,
    /// Human-readable explanation naming the deciding signal.
    pub reason: String,
    pub catch_all: bool,
}

/// A discovered address with its score, returned by the find operations.
#[derive(Debug, Clone, Serialize)]
pub struct FoundEmail {
    pub email: String,
    pub status: VerificationStatus,
    pub confidence: f64,
}

/// Input row for bulk discovery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FindRow {
    pub first_name: String,
    pub last_name: String,
    pub domain: String,
}

/// Input row for bulk verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRow {
    pub email: String,
}

/// Row-level failure that did not abort the batch.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{reason}")]
pub struct RowError {
    pub reason: String,
}

/// Per-row outcome of a bulk operation, carrying the original row so the
/// caller can correlate results (e.g. for CSV re-emission).
#[derive(Debug, Clone, Serialize)]
pub struct RowOutcome<R, T> {
    pub row: R,
    pub result: std::result::Result<T, RowError>,
}
