//! Catch-all detection: one probe of a synthetic, statistically nonexistent
//! local part. Acceptance means the domain takes every recipient, which
//! makes per-address existence checks uninformative.

use crate::core::models::ProbeCode;
use crate::smtp::MailboxProber;
use rand::Rng;

/// Builds a randomized local part long enough to rule out a dictionary
/// collision with any real mailbox.
pub(crate) fn synthetic_local_part() -> String {
    let mut rng = rand::thread_rng();
    format!(
        "no-reply-does-not-exist-{}-{:08x}",
        rng.gen_range(10000..100000),
        rng.gen::<u32>()
    )
}

/// Probes the domain once with a synthetic recipient. Only an explicit
/// acceptance marks the domain as catch-all; every failure mode is treated
/// as "not known to be catch-all".
pub(crate) async fn detect_catch_all(
    prober: &dyn MailboxProber,
    domain: &str,
    mx_hosts: &[String],
) -> bool {
    let local_part = synthetic_local_part();
    match prober.probe(&local_part, domain, mx_hosts).await {
        Ok(outcome) if outcome.code == ProbeCode::Accepted => {
            tracing::warn!(target: "smtp_task",
                "Domain {} appears to be a catch-all (accepted synthetic recipient {})",
                domain, local_part);
            true
        }
        Ok(outcome) => {
            tracing::debug!(target: "smtp_task",
                "Catch-all check negative for {} ({:?})", domain, outcome.code);
            false
        }
        Err(e) => {
            tracing::warn!(target: "smtp_task",
                "Catch-all check for {} errored (ignoring): {}", domain, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_local_part_is_long_and_safe() {
        let local = synthetic_local_part();
        assert!(local.len() > 30);
        assert!(local.starts_with("no-reply-does-not-exist-"));
        assert!(local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }

    #[test]
    fn synthetic_local_parts_differ_between_calls() {
        assert_ne!(synthetic_local_part(), synthetic_local_part());
    }
}
