//! Registry store interface and implementations
//!
//! The registry is the only shared mutable resource in the control plane and
//! the sole arbiter of subdomain uniqueness. Components receive it as an
//! injected trait object so tests can substitute the in-memory
//! implementation for Postgres.

use crate::db::{self, Domain, DomainStatus, Subdomain, Tunnel};
use async_trait::async_trait;
#[cfg(test)]
use chrono::Utc;
#[cfg(test)]
use dashmap::DashMap;
use sqlx::PgPool;

/// Result of the atomic insert-if-absent allocation primitive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationOutcome {
    /// The tunnel and subdomain rows were persisted
    Created,
    /// Another allocation already holds the label; nothing was written
    Exists(Subdomain),
}

/// Durable key-value backing for tunnels, subdomains, and custom domains
#[async_trait]
pub trait Registry: Send + Sync {
    async fn find_subdomain(&self, label: &str) -> anyhow::Result<Option<Subdomain>>;

    async fn find_tunnel(&self, id: &str) -> anyhow::Result<Option<Tunnel>>;

    /// Atomically persist a tunnel and its subdomain allocation.
    ///
    /// Whichever concurrent allocation wins this insert determines the
    /// resulting tunnel; losers observe `Exists` with the winner's row and
    /// must re-resolve ownership, never assuming an external mutex.
    async fn allocate(
        &self,
        tunnel: Tunnel,
        subdomain: Subdomain,
    ) -> anyhow::Result<AllocationOutcome>;

    /// Refresh a tunnel's `last_seen_at`; returns false when the tunnel is
    /// unknown
    async fn touch_tunnel(&self, id: &str) -> anyhow::Result<bool>;

    async fn find_domain(&self, id: &str) -> anyhow::Result<Option<Domain>>;

    async fn insert_domain(&self, domain: Domain) -> anyhow::Result<()>;

    /// Update a domain's verification status, bumping its `updated_at`
    async fn set_domain_status(&self, id: &str, status: DomainStatus) -> anyhow::Result<bool>;
}

/// Postgres-backed registry
pub struct PgRegistry {
    pool: PgPool,
}

impl PgRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Registry for PgRegistry {
    async fn find_subdomain(&self, label: &str) -> anyhow::Result<Option<Subdomain>> {
        Ok(db::queries::find_subdomain(&self.pool, label).await?)
    }

    async fn find_tunnel(&self, id: &str) -> anyhow::Result<Option<Tunnel>> {
        Ok(db::queries::find_tunnel(&self.pool, id).await?)
    }

    async fn allocate(
        &self,
        tunnel: Tunnel,
        subdomain: Subdomain,
    ) -> anyhow::Result<AllocationOutcome> {
        let label = subdomain.subdomain.clone();
        if db::queries::insert_allocation(&self.pool, &tunnel, &subdomain).await? {
            return Ok(AllocationOutcome::Created);
        }

        // Constraint violation is the authoritative conflict signal; fetch
        // the winning row so the caller can re-resolve ownership.
        match db::queries::find_subdomain(&self.pool, &label).await? {
            Some(existing) => Ok(AllocationOutcome::Exists(existing)),
            None => anyhow::bail!("subdomain {} vanished after insert conflict", label),
        }
    }

    async fn touch_tunnel(&self, id: &str) -> anyhow::Result<bool> {
        Ok(db::queries::touch_tunnel(&self.pool, id).await?)
    }

    async fn find_domain(&self, id: &str) -> anyhow::Result<Option<Domain>> {
        Ok(db::queries::find_domain(&self.pool, id).await?)
    }

    async fn insert_domain(&self, domain: Domain) -> anyhow::Result<()> {
        Ok(db::queries::insert_domain(&self.pool, &domain).await?)
    }

    async fn set_domain_status(&self, id: &str, status: DomainStatus) -> anyhow::Result<bool> {
        Ok(db::queries::set_domain_status(&self.pool, id, status).await?)
    }
}

/// In-memory registry backing the component tests
#[cfg(test)]
#[derive(Default)]
pub struct MemoryRegistry {
    tunnels: DashMap<String, Tunnel>,
    /// Keyed by subdomain label
    subdomains: DashMap<String, Subdomain>,
    domains: DashMap<String, Domain>,
}

#[cfg(test)]
impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of persisted subdomain allocations
    pub fn subdomain_count(&self) -> usize {
        self.subdomains.len()
    }

    /// Number of persisted tunnels
    pub fn tunnel_count(&self) -> usize {
        self.tunnels.len()
    }
}

#[cfg(test)]
#[async_trait]
impl Registry for MemoryRegistry {
    async fn find_subdomain(&self, label: &str) -> anyhow::Result<Option<Subdomain>> {
        Ok(self.subdomains.get(label).map(|s| s.clone()))
    }

    async fn find_tunnel(&self, id: &str) -> anyhow::Result<Option<Tunnel>> {
        Ok(self.tunnels.get(id).map(|t| t.clone()))
    }

    async fn allocate(
        &self,
        tunnel: Tunnel,
        subdomain: Subdomain,
    ) -> anyhow::Result<AllocationOutcome> {
        // Mirror the Postgres transaction: stage the tunnel, then let the
        // subdomain map's entry API arbitrate the label.
        let tunnel_id = tunnel.id.clone();
        self.tunnels.insert(tunnel_id.clone(), tunnel);

        match self.subdomains.entry(subdomain.subdomain.clone()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                self.tunnels.remove(&tunnel_id);
                Ok(AllocationOutcome::Exists(existing.get().clone()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(subdomain);
                Ok(AllocationOutcome::Created)
            }
        }
    }

    async fn touch_tunnel(&self, id: &str) -> anyhow::Result<bool> {
        match self.tunnels.get_mut(id) {
            Some(mut tunnel) => {
                let now = Utc::now();
                tunnel.last_seen_at = now;
                tunnel.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_domain(&self, id: &str) -> anyhow::Result<Option<Domain>> {
        Ok(self.domains.get(id).map(|d| d.clone()))
    }

    async fn insert_domain(&self, domain: Domain) -> anyhow::Result<()> {
        self.domains.insert(domain.id.clone(), domain);
        Ok(())
    }

    async fn set_domain_status(&self, id: &str, status: DomainStatus) -> anyhow::Result<bool> {
        match self.domains.get_mut(id) {
            Some(mut domain) => {
                domain.status = status;
                domain.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
