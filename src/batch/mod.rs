//! Bounded fan-out batch processing with per-domain single-flight caching.
//!
//! The domain cache is the only shared mutable state in a batch: a
//! batch-scoped map of write-once cells. Concurrent first access to an
//! uncached domain collapses into one resolution (DNS profile plus
//! catch-all probe) whose result every waiter shares; after the fill the
//! profile is read lock-free. Final results always preserve input row
//! order even though work completes out of order internally.

use crate::core::config::Config;
use crate::core::error::{AppError, Result};
use crate::core::models::{
    DomainProfile, FindRow, FoundEmail, ProbeOutcome, RowError, RowOutcome, VerificationResult,
    VerificationStatus, VerifyRow,
};
use crate::dns::DomainAuthority;
use crate::patterns::generate_candidates;
use crate::scoring;
use crate::smtp::{catch_all, MailboxProber};

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{OnceCell, Semaphore};
use tokio::time::Instant;

/// Batch-scoped cache of domain profiles with single-flight fill.
#[derive(Default)]
pub(crate) struct DomainCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<Arc<DomainProfile>>>>>,
}

impl DomainCache {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the shared profile for `domain`, resolving it (and running
    /// the catch-all probe) at most once per batch.
    pub(crate) async fn profile_for(
        &self,
        domain: &str,
        config: &Config,
        authority: &dyn DomainAuthority,
        prober: &dyn MailboxProber,
    ) -> Arc<DomainProfile> {
        let key = domain.to_ascii_lowercase();
        let cell = {
            let mut entries = self.entries.lock();
            entries.entry(key).or_default().clone()
        };
        cell.get_or_init(|| build_profile(domain, config, authority, prober))
            .await
            .clone()
    }
}

/// Resolves the DNS profile and, when the domain is reachable, runs the
/// one-per-domain catch-all probe. Resolution failures downgrade to an
/// unresolvable profile rather than propagating.
async fn build_profile(
    domain: &str,
    config: &Config,
    authority: &dyn DomainAuthority,
    prober: &dyn MailboxProber,
) -> Arc<DomainProfile> {
    let mut profile = match authority.resolve(domain).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!(target: "batch_task",
                "Domain resolution for {} failed ({}); treating as unresolvable", domain, e);
            DomainProfile::unresolvable(domain)
        }
    };

    if profile.has_valid_mx && config.enable_catch_all_check {
        profile.is_catch_all =
            catch_all::detect_catch_all(prober, &profile.domain, &profile.mx_hosts).await;
    }

    Arc::new(profile)
}

/// The wired pipeline components, shared by the public operations.
pub(crate) struct Pipeline {
    pub(crate) config: Arc<Config>,
    pub(crate) authority: Arc<dyn DomainAuthority>,
    pub(crate) prober: Arc<dyn MailboxProber>,
    /// Caps total concurrent network work. The bulk runners and the
    /// per-row candidate fan-out each use `buffer_unordered`; without a
    /// shared cap those limits would multiply.
    probe_permits: Arc<Semaphore>,
}

impl Pipeline {
    pub(crate) fn new(
        config: Arc<Config>,
        authority: Arc<dyn DomainAuthority>,
        prober: Arc<dyn MailboxProber>,
    ) -> Self {
        let probe_permits = Arc::new(Semaphore::new(config.max_concurrency));
        Self {
            config,
            authority,
            prober,
            probe_permits,
        }
    }

    /// Splits and syntax-checks an address. `None` means the address never
    /// reaches the network.
    fn split_address(&self, address: &str) -> Option<(String, String)> {
        let address = address.trim();
        if !self.config.email_regex.is_match(address) {
            return None;
        }
        let (local, domain) = address.rsplit_once('@')?;
        Some((local.to_string(), domain.to_ascii_lowercase()))
    }

    /// Runs the full verification pipeline for one address against the
    /// batch cache. Never fails: every failure mode folds into a status
    /// and reason.
    pub(crate) async fn verify_address(
        &self,
        cache: &DomainCache,
        address: &str,
    ) -> VerificationResult {
        let Some((local_part, domain)) = self.split_address(address) else {
            return VerificationResult {
                address: address.trim().to_string(),
                status: VerificationStatus::Invalid,
                confidence: 0.0,
                reason: "Invalid email syntax".to_string(),
                catch_all: false,
            };
        };

        // One permit covers this address's network work, including a
        // domain-cache fill when this task is the one performing it. The
        // semaphore is never closed, so acquisition cannot fail.
        let _permit = self.probe_permits.acquire().await.ok();

        let profile = self.cache_profile(cache, &domain).await;

        let outcome = if !profile.has_valid_mx {
            ProbeOutcome::unreachable(None, "domain has no mail hosts")
        } else {
            match self
                .prober
                .probe(&local_part, &domain, &profile.mx_hosts)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::warn!(target: "batch_task", "Probe for <{}> failed: {}", address, e);
                    ProbeOutcome::unreachable(None, format!("probe failed: {e}"))
                }
            }
        };

        let (status, confidence, reason) = scoring::score(&outcome, &profile);
        VerificationResult {
            address: format!("{local_part}@{domain}"),
            status,
            confidence,
            reason,
            catch_all: profile.is_catch_all,
        }
    }

    async fn cache_profile(&self, cache: &DomainCache, domain: &str) -> Arc<DomainProfile> {
        cache
            .profile_for(
                domain,
                &self.config,
                self.authority.as_ref(),
                self.prober.as_ref(),
            )
            .await
    }

    /// Discovery: scores every generated candidate and returns the best
    /// one or two, generation order breaking ties.
    pub(crate) async fn find_candidates(
        &self,
        cache: &DomainCache,
        first_name: &str,
        last_name: &str,
        domain: &str,
    ) -> Result<Vec<FoundEmail>> {
        let candidates = generate_candidates(first_name, last_name, domain);
        if candidates.is_empty() {
            return Err(AppError::InsufficientInput(format!(
                "no usable candidates for '{first_name} {last_name}' at '{domain}'"
            )));
        }

        tracing::debug!(target: "batch_task",
            "Scoring {} candidates for '{} {}' at {}",
            candidates.len(), first_name, last_name, domain);

        let mut scored: Vec<(usize, VerificationResult)> =
            stream::iter(candidates.into_iter().enumerate())
                .map(|(idx, candidate)| {
                    let pipeline = self;
                    async move {
                        let result = pipeline.verify_address(cache, &candidate.address()).await;
                        (idx, result)
                    }
                })
                .buffer_unordered(self.config.max_concurrency)
                .collect()
                .await;

        scored.sort_by(|a, b| {
            b.1.confidence
                .partial_cmp(&a.1.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });

        Ok(scored
            .into_iter()
            .take(self.config.max_results)
            .map(|(_, result)| FoundEmail {
                email: result.address,
                status: result.status,
                confidence: result.confidence,
            })
            .collect())
    }

    /// Verifies a batch of addresses under the shared cache, bounded
    /// concurrency, and the overall batch deadline.
    pub(crate) async fn run_bulk_verify(
        &self,
        rows: Vec<VerifyRow>,
    ) -> Vec<RowOutcome<VerifyRow, VerificationResult>> {
        let cache = DomainCache::new();
        let cache = &cache;
        let deadline = Instant::now() + self.config.batch_deadline;

        let mut outcomes: Vec<(usize, RowOutcome<VerifyRow, VerificationResult>)> =
            stream::iter(rows.into_iter().enumerate())
                .map(|(idx, row)| {
                    let pipeline = self;
                    async move {
                        let work = pipeline.verify_address(cache, &row.email);
                        let result =
                            match tokio::time::timeout_at(deadline, AssertUnwindSafe(work).catch_unwind())
                                .await
                            {
                                Ok(Ok(result)) => Ok(result),
                                Ok(Err(_)) => Err(RowError {
                                    reason: "internal error while processing row".to_string(),
                                }),
                                Err(_) => Ok(deadline_placeholder(&row.email)),
                            };
                        (idx, RowOutcome { row, result })
                    }
                })
                .buffer_unordered(self.config.max_concurrency)
                .collect()
                .await;

        outcomes.sort_by_key(|(idx, _)| *idx);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }

    /// Discovery over a batch of contacts; domain-level work is shared
    /// across rows through the common cache.
    pub(crate) async fn run_bulk_find(
        &self,
        rows: Vec<FindRow>,
    ) -> Vec<RowOutcome<FindRow, Vec<FoundEmail>>> {
        let cache = DomainCache::new();
        let cache = &cache;
        let deadline = Instant::now() + self.config.batch_deadline;

        let mut outcomes: Vec<(usize, RowOutcome<FindRow, Vec<FoundEmail>>)> =
            stream::iter(rows.into_iter().enumerate())
                .map(|(idx, row)| {
                    let pipeline = self;
                    async move {
                        let work = pipeline.find_candidates(
                            cache,
                            &row.first_name,
                            &row.last_name,
                            &row.domain,
                        );
                        let result =
                            match tokio::time::timeout_at(deadline, AssertUnwindSafe(work).catch_unwind())
                                .await
                            {
                                Ok(Ok(Ok(found))) => Ok(found),
                                Ok(Ok(Err(e))) => Err(RowError {
                                    reason: e.to_string(),
                                }),
                                Ok(Err(_)) => Err(RowError {
                                    reason: "internal error while processing row".to_string(),
                                }),
                                Err(_) => Err(RowError {
                                    reason: "batch deadline exceeded before this row completed"
                                        .to_string(),
                                }),
                            };
                        (idx, RowOutcome { row, result })
                    }
                })
                .buffer_unordered(self.config.max_concurrency)
                .collect()
                .await;

        outcomes.sort_by_key(|(idx, _)| *idx);
        outcomes.into_iter().map(|(_, outcome)| outcome).collect()
    }
}

fn deadline_placeholder(address: &str) -> VerificationResult {
    VerificationResult {
        address: address.trim().to_string(),
        status: VerificationStatus::Unknown,
        confidence: 0.0,
        reason: "batch deadline exceeded before this row completed".to_string(),
        catch_all: false,
    }
}
