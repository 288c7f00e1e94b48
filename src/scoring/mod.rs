//! Signal fusion: converts probe and DNS signals into a status and a
//! calibrated confidence.
//!
//! Confidence is additive over the weight table below, clamped to [0, 1],
//! and monotone non-decreasing in the number of positive signals. Definitive
//! negatives (no mail hosts, permanent RCPT rejection) report confidence 0:
//! the weights measure evidence that the mailbox exists, and both cases are
//! proof that it does not.

use crate::core::models::{DomainProfile, ProbeCode, ProbeOutcome, VerificationStatus};

/// Weight granted when RCPT TO was accepted for the target address.
pub const WEIGHT_SMTP_ACCEPTED: f64 = 0.60;
/// Weight granted when the domain is not a catch-all.
pub const WEIGHT_NOT_CATCH_ALL: f64 = 0.15;
/// Weight granted for a valid MX (or A/AAAA fallback) host.
pub const WEIGHT_VALID_MX: f64 = 0.10;
/// Weight granted when any of SPF, DKIM or DMARC is published.
pub const WEIGHT_AUTH_RECORDS: f64 = 0.15;

/// Pure scoring function combining the SMTP probe outcome with the domain
/// profile. Returns `(status, confidence, reason)`.
pub fn score(
    outcome: &ProbeOutcome,
    profile: &DomainProfile,
) -> (VerificationStatus, f64, String) {
    if !profile.has_valid_mx {
        return (
            VerificationStatus::Invalid,
            0.0,
            format!("domain {} has no MX or A record", profile.domain),
        );
    }

    let infrastructure = WEIGHT_VALID_MX
        + if profile.has_auth_records() {
            WEIGHT_AUTH_RECORDS
        } else {
            0.0
        };

    match outcome.code {
        ProbeCode::Accepted if profile.is_catch_all => {
            // The acceptance is uninformative on a catch-all domain, so the
            // "not catch-all" bonus is withheld.
            let confidence = (WEIGHT_SMTP_ACCEPTED + infrastructure).clamp(0.0, 1.0);
            (
                VerificationStatus::CatchAll,
                confidence,
                "domain accepts all recipients".to_string(),
            )
        }
        ProbeCode::Accepted => {
            let confidence =
                (WEIGHT_SMTP_ACCEPTED + WEIGHT_NOT_CATCH_ALL + infrastructure).clamp(0.0, 1.0);
            let reason = match &outcome.server_host {
                Some(host) => format!("RCPT TO accepted by {host}"),
                None => "RCPT TO accepted".to_string(),
            };
            (VerificationStatus::Valid, confidence, reason)
        }
        ProbeCode::Rejected => {
            let reason = match outcome.raw_response_code {
                Some(code) => format!("RCPT TO rejected with {code}"),
                None => "RCPT TO rejected".to_string(),
            };
            (VerificationStatus::Invalid, 0.0, reason)
        }
        ProbeCode::Greylisted | ProbeCode::TempUnavailable | ProbeCode::Unreachable => {
            // SMTP evidence is withheld; only the infrastructure weights
            // contribute.
            let confidence = infrastructure.clamp(0.0, 1.0);
            let reason = if outcome.detail.is_empty() {
                "mail servers gave no decisive answer".to_string()
            } else {
                outcome.detail.clone()
            };
            (VerificationStatus::Unknown, confidence, reason)
        }
    }
}
