//! Custom domain ownership verification
//!
//! Two-phase DNS check per domain: a mandatory TXT challenge at
//! `_outray-challenge.<domain>` whose value must contain the domain's id
//! (the unguessable challenge token), and an advisory CNAME check against
//! the edge host. Only the TXT phase gates the pending -> active transition;
//! CNAME visibility cannot be guaranteed behind proxying or flattening, so
//! that check never blocks verification.

use crate::config::Config;
use crate::db::{Domain, DomainStatus};
use crate::error::ControlError;
use crate::registry::Registry;
use async_trait::async_trait;
use chrono::Utc;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::proto::rr::RecordType;
use hickory_resolver::TokioAsyncResolver;
use outray_common::{constants, guard, new_id};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// DNS lookups needed by the verification engine
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// TXT record values at `name`, one string per record
    async fn txt_records(&self, name: &str) -> anyhow::Result<Vec<String>>;

    /// CNAME targets at `name`, without the trailing dot
    async fn cname_records(&self, name: &str) -> anyhow::Result<Vec<String>>;
}

/// System resolver backed by hickory
pub struct HickoryDnsResolver {
    resolver: TokioAsyncResolver,
}

impl HickoryDnsResolver {
    pub fn new(timeout: Duration) -> Self {
        let (config, mut opts) = hickory_resolver::system_conf::read_system_conf()
            .unwrap_or_else(|_| (ResolverConfig::default(), ResolverOpts::default()));
        opts.timeout = timeout;
        Self {
            resolver: TokioAsyncResolver::tokio(config, opts),
        }
    }
}

#[async_trait]
impl DnsResolver for HickoryDnsResolver {
    async fn txt_records(&self, name: &str) -> anyhow::Result<Vec<String>> {
        let lookup = self.resolver.txt_lookup(name.to_string()).await?;
        Ok(lookup
            .iter()
            .map(|txt| {
                txt.iter()
                    .map(|part| String::from_utf8_lossy(part).into_owned())
                    .collect::<String>()
            })
            .collect())
    }

    async fn cname_records(&self, name: &str) -> anyhow::Result<Vec<String>> {
        let lookup = self
            .resolver
            .lookup(name.to_string(), RecordType::CNAME)
            .await?;
        Ok(lookup
            .iter()
            .filter_map(|rdata| rdata.as_cname())
            .map(|cname| cname.0.to_utf8().trim_end_matches('.').to_string())
            .collect())
    }
}

/// Runs the DNS ownership challenge for custom domains
pub struct DomainVerifier {
    registry: Arc<dyn Registry>,
    resolver: Arc<dyn DnsResolver>,
    config: Arc<Config>,
}

impl DomainVerifier {
    pub fn new(
        registry: Arc<dyn Registry>,
        resolver: Arc<dyn DnsResolver>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            registry,
            resolver,
            config,
        }
    }

    /// Add a custom domain in pending state for an organization.
    ///
    /// The hostname gets the same network-input discipline as any
    /// user-supplied target before it is stored and later resolved.
    pub async fn add(
        &self,
        domain_name: &str,
        organization_id: &str,
    ) -> Result<Domain, ControlError> {
        if domain_name.trim().is_empty() || organization_id.is_empty() {
            return Err(ControlError::Validation("Missing required fields".into()));
        }

        let name = domain_name
            .trim()
            .trim_end_matches('.')
            .to_ascii_lowercase();

        guard::validate_url(&format!("https://{}", name))
            .map_err(|violation| ControlError::Validation(violation.to_string()))?;
        if name.parse::<IpAddr>().is_ok() {
            return Err(ControlError::Validation(
                "Custom domain must be a hostname, not an IP address".into(),
            ));
        }
        if !name.contains('.') {
            return Err(ControlError::Validation(
                "Custom domain must be a fully qualified hostname".into(),
            ));
        }

        let now = Utc::now();
        let domain = Domain {
            id: new_id("domain"),
            domain: name,
            organization_id: organization_id.to_string(),
            status: DomainStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.registry.insert_domain(domain.clone()).await?;
        tracing::info!("Custom domain {} added for {}", domain.domain, organization_id);
        Ok(domain)
    }

    /// Run the ownership challenge for a domain.
    ///
    /// Retry-safe: failure leaves the domain pending with no side effects,
    /// and verifying an already-active domain is a no-op success.
    pub async fn verify(
        &self,
        domain_id: &str,
        requester_org_ids: &[String],
    ) -> Result<(), ControlError> {
        let domain = self
            .registry
            .find_domain(domain_id)
            .await?
            .ok_or(ControlError::NotFound("Domain"))?;

        if !requester_org_ids
            .iter()
            .any(|org| org == &domain.organization_id)
        {
            return Err(ControlError::Unauthorized);
        }

        if domain.status == DomainStatus::Active {
            return Ok(());
        }

        let record_name = constants::challenge_record_name(&domain.domain);

        // Phase 1: TXT challenge (mandatory). A timed-out or failed lookup
        // is the same as no matching record: fail, retryable.
        let txt_values = match tokio::time::timeout(
            self.config.dns_timeout,
            self.resolver.txt_records(&record_name),
        )
        .await
        {
            Ok(Ok(values)) => values,
            Ok(Err(e)) => {
                tracing::debug!("TXT lookup for {} failed: {:#}", record_name, e);
                Vec::new()
            }
            Err(_) => {
                tracing::debug!("TXT lookup for {} timed out", record_name);
                Vec::new()
            }
        };

        if !txt_values.iter().any(|value| value.contains(&domain.id)) {
            return Err(ControlError::Verification {
                record_name,
                expected_value: domain.id,
            });
        }

        // Phase 2: CNAME routing check (advisory). Lookup failure is
        // tolerated: the record may be concealed by a proxy or flattened.
        match tokio::time::timeout(
            self.config.dns_timeout,
            self.resolver.cname_records(&domain.domain),
        )
        .await
        {
            Ok(Ok(targets)) => {
                if !targets
                    .iter()
                    .any(|target| target.trim_end_matches('.') == self.config.edge_host)
                {
                    tracing::warn!(
                        "CNAME for {} does not point at {} (advisory, not blocking)",
                        domain.domain,
                        self.config.edge_host
                    );
                }
            }
            Ok(Err(_)) | Err(_) => {
                tracing::warn!(
                    "CNAME lookup for {} failed; relying on TXT for ownership proof",
                    domain.domain
                );
            }
        }

        self.registry
            .set_domain_status(&domain.id, DomainStatus::Active)
            .await?;
        tracing::info!("Custom domain {} verified", domain.domain);
        Ok(())
    }
}
