//! Domain authentication lookups: MX (with A/AAAA fallback) plus SPF, DKIM
//! and DMARC presence.
//!
//! Every sub-lookup carries its own timeout; a timeout or NXDOMAIN is
//! recorded as an absent record, never propagated as a failure. The only
//! unresolvable state is a domain with neither MX nor A/AAAA records,
//! which yields a profile with `has_valid_mx = false`.

use crate::core::config::Config;
use crate::core::error::Result;
use crate::core::models::DomainProfile;

use async_trait::async_trait;
use chrono::Utc;
use std::net::IpAddr;
use std::sync::Arc;
use trust_dns_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use trust_dns_resolver::TokioAsyncResolver;

/// Common DKIM selector subdomains probed for TXT records.
///
/// DNS has no registry of selectors, so this is a heuristic set taken from
/// the providers most often seen in the wild; a miss here is weak negative
/// evidence only, never proof that DKIM is unconfigured.
pub const DKIM_SELECTORS: &[&str] = &["default", "google", "selector1", "selector2", "k1", "mail"];

/// Seam for resolving a [`DomainProfile`]; implemented by the production
/// DNS authenticator and by in-memory fakes in tests.
#[async_trait]
pub trait DomainAuthority: Send + Sync {
    /// Builds the authentication profile for `domain`. Must only fail for
    /// internal errors; DNS misses are encoded in the profile flags.
    async fn resolve(&self, domain: &str) -> Result<DomainProfile>;
}

/// Production [`DomainAuthority`] backed by `trust-dns-resolver`.
pub struct DnsAuthenticator {
    resolver: TokioAsyncResolver,
}

impl DnsAuthenticator {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let mut ips: Vec<IpAddr> = Vec::with_capacity(config.dns_servers.len());
        for server in &config.dns_servers {
            ips.push(server.parse()?);
        }
        let group = NameServerConfigGroup::from_ips_clear(&ips, 53, true);
        let resolver_config = ResolverConfig::from_parts(None, Vec::new(), group);
        let mut opts = ResolverOpts::default();
        opts.timeout = config.dns_timeout;
        opts.attempts = 1;

        Ok(Self {
            resolver: TokioAsyncResolver::tokio(resolver_config, opts),
        })
    }

    /// Returns the mail hosts for a domain, ascending by MX priority, with
    /// the A/AAAA fallback applied when no MX records exist.
    async fn lookup_mail_hosts(&self, domain: &str) -> Vec<String> {
        match self.resolver.mx_lookup(domain).await {
            Ok(lookup) => {
                let mut records: Vec<(u16, String)> = lookup
                    .iter()
                    .map(|mx| {
                        (
                            mx.preference(),
                            mx.exchange().to_utf8().trim_end_matches('.').to_string(),
                        )
                    })
                    .filter(|(_, host)| !host.is_empty())
                    .collect();
                records.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));
                records.dedup_by(|a, b| a.1 == b.1);
                let hosts: Vec<String> = records.into_iter().map(|(_, host)| host).collect();
                if !hosts.is_empty() {
                    tracing::debug!(target: "dns_task", "Found {} MX host(s) for {}", hosts.len(), domain);
                    return hosts;
                }
            }
            Err(e) => {
                tracing::debug!(target: "dns_task", "MX lookup failed for {}: {}. Trying A/AAAA fallback.", domain, e);
            }
        }

        match self.resolver.lookup_ip(domain).await {
            Ok(lookup) if lookup.iter().next().is_some() => {
                tracing::debug!(target: "dns_task",
                    "No MX records for {}; using the domain itself as mail host (A/AAAA fallback).", domain);
                vec![domain.to_string()]
            }
            Ok(_) => Vec::new(),
            Err(e) => {
                tracing::debug!(target: "dns_task", "A/AAAA fallback failed for {}: {}", domain, e);
                Vec::new()
            }
        }
    }

    /// True when any TXT record at `name` starts with `prefix`.
    async fn txt_record_present(&self, name: &str, prefix: &str) -> bool {
        match self.resolver.txt_lookup(name).await {
            Ok(lookup) => lookup.iter().any(|record| {
                let joined: String = record
                    .iter()
                    .map(|bytes| String::from_utf8_lossy(bytes))
                    .collect();
                joined.starts_with(prefix)
            }),
            Err(e) => {
                tracing::trace!(target: "dns_task", "TXT lookup miss for {}: {}", name, e);
                false
            }
        }
    }

    async fn has_spf(&self, domain: &str) -> bool {
        self.txt_record_present(domain, "v=spf1").await
    }

    async fn has_dmarc(&self, domain: &str) -> bool {
        self.txt_record_present(&format!("_dmarc.{domain}"), "v=DMARC1")
            .await
    }

    async fn has_dkim(&self, domain: &str) -> bool {
        for selector in DKIM_SELECTORS {
            let name = format!("{selector}._domainkey.{domain}");
            if let Ok(lookup) = self.resolver.txt_lookup(name).await {
                if lookup.iter().next().is_some() {
                    tracing::debug!(target: "dns_task", "DKIM selector '{}' found for {}", selector, domain);
                    return true;
                }
            }
        }
        false
    }
}

#[async_trait]
impl DomainAuthority for DnsAuthenticator {
    async fn resolve(&self, domain: &str) -> Result<DomainProfile> {
        let domain = domain.trim().trim_end_matches('.').to_ascii_lowercase();
        tracing::debug!(target: "dns_task", "Resolving domain profile for {}", domain);

        let mx_hosts = self.lookup_mail_hosts(&domain).await;
        if mx_hosts.is_empty() {
            tracing::info!(target: "dns_task", "Domain {} has neither MX nor A/AAAA records", domain);
            return Ok(DomainProfile::unresolvable(&domain));
        }

        let (spf, dkim, dmarc) = tokio::join!(
            self.has_spf(&domain),
            self.has_dkim(&domain),
            self.has_dmarc(&domain)
        );

        tracing::debug!(target: "dns_task",
            "Profile for {}: mx={} spf={} dkim={} dmarc={}",
            domain, mx_hosts.len(), spf, dkim, dmarc
        );

        Ok(DomainProfile {
            domain,
            mx_hosts,
            has_valid_mx: true,
            spf,
            dkim,
            dmarc,
            is_catch_all: false,
            fetched_at: Utc::now(),
        })
    }
}
