//! Subdomain allocator
//!
//! Registers tunnels against subdomains under the registry's uniqueness
//! guarantee. Re-registration by the same owning organization is idempotent
//! so a reconnecting tunnel client can resume its subdomain.

use crate::config::Config;
use crate::db::{Subdomain, Tunnel};
use crate::error::ControlError;
use crate::registry::{AllocationOutcome, Registry};
use chrono::Utc;
use outray_common::new_id;
use std::sync::Arc;

/// Successful registration result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub tunnel_id: String,
    /// Public URL of the tunnel
    pub url: String,
}

/// Availability of a label, for the pre-flight check endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// Label is unallocated
    Available,
    /// Label is allocated to the caller's organization
    Owned,
    /// Label is allocated to a different owner
    Taken,
}

pub struct SubdomainAllocator {
    registry: Arc<dyn Registry>,
    config: Arc<Config>,
}

impl SubdomainAllocator {
    pub fn new(registry: Arc<dyn Registry>, config: Arc<Config>) -> Self {
        Self { registry, config }
    }

    /// Register a tunnel for `label`, owned by `user_id` / `organization_id`.
    ///
    /// No in-process locking: the registry's atomic insert is the only
    /// ordering primitive, and a benign race where both racers are the same
    /// genuine owner resolves to success.
    pub async fn register(
        &self,
        label: &str,
        user_id: &str,
        organization_id: &str,
    ) -> Result<Registration, ControlError> {
        if label.trim().is_empty() || user_id.is_empty() || organization_id.is_empty() {
            return Err(ControlError::Validation("Missing required fields".into()));
        }

        let label = normalize_label(label);
        if !is_valid_label(&label) {
            return Err(ControlError::Validation(format!(
                "Invalid subdomain \"{}\": use lowercase letters, digits, and hyphens (max 63 chars)",
                label
            )));
        }

        if let Some(existing) = self.registry.find_subdomain(&label).await? {
            return self.resolve_existing(existing, organization_id).await;
        }

        let now = Utc::now();
        let tunnel = Tunnel {
            id: new_id("tunnel"),
            url: self.config.full_url(&label),
            user_id: user_id.to_string(),
            organization_id: Some(organization_id.to_string()),
            name: None,
            last_seen_at: now,
            created_at: now,
            updated_at: now,
        };
        let subdomain = Subdomain {
            id: new_id("subdomain"),
            subdomain: label.clone(),
            tunnel_id: tunnel.id.clone(),
            created_at: now,
        };

        match self
            .registry
            .allocate(tunnel.clone(), subdomain)
            .await?
        {
            AllocationOutcome::Created => {
                tracing::info!("Allocated subdomain {} -> {}", label, tunnel.id);
                Ok(Registration {
                    tunnel_id: tunnel.id,
                    url: tunnel.url,
                })
            }
            // Lost the insert race; re-resolve ownership against the winner
            AllocationOutcome::Exists(existing) => {
                self.resolve_existing(existing, organization_id).await
            }
        }
    }

    /// Check whether a label can be registered by `organization_id`
    pub async fn check(
        &self,
        label: &str,
        organization_id: Option<&str>,
    ) -> Result<Availability, ControlError> {
        if label.trim().is_empty() {
            return Err(ControlError::Validation("Missing subdomain".into()));
        }
        let label = normalize_label(label);

        match self.registry.find_subdomain(&label).await? {
            None => Ok(Availability::Available),
            Some(existing) => {
                let tunnel = self.load_owner(&existing).await?;
                match (tunnel.organization_id.as_deref(), organization_id) {
                    (Some(owner), Some(caller)) if owner == caller => Ok(Availability::Owned),
                    _ => Ok(Availability::Taken),
                }
            }
        }
    }

    /// Refresh a tunnel's liveness timestamp (data-plane heartbeat)
    pub async fn touch(&self, tunnel_id: &str) -> Result<bool, ControlError> {
        Ok(self.registry.touch_tunnel(tunnel_id).await?)
    }

    /// Decide idempotent-success vs. conflict for an already-allocated label
    async fn resolve_existing(
        &self,
        existing: Subdomain,
        organization_id: &str,
    ) -> Result<Registration, ControlError> {
        let tunnel = self.load_owner(&existing).await?;
        if tunnel.organization_id.as_deref() == Some(organization_id) {
            Ok(Registration {
                tunnel_id: tunnel.id,
                url: tunnel.url,
            })
        } else {
            Err(ControlError::Conflict)
        }
    }

    async fn load_owner(&self, subdomain: &Subdomain) -> Result<Tunnel, ControlError> {
        self.registry
            .find_tunnel(&subdomain.tunnel_id)
            .await?
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "subdomain {} points at missing tunnel {}",
                    subdomain.subdomain,
                    subdomain.tunnel_id
                )
                .into()
            })
    }
}

/// Uniqueness is case-insensitive; labels are stored lowercase
fn normalize_label(label: &str) -> String {
    label.trim().to_ascii_lowercase()
}

/// DNS-label syntax, after normalization
fn is_valid_label(label: &str) -> bool {
    if label.is_empty() || label.len() > 63 {
        return false;
    }
    let mut chars = label.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    !label.ends_with('-')
        && label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
