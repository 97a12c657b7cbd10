//! Route handlers for the control-plane API

pub mod domains;
pub mod tunnel;

use crate::allocator::SubdomainAllocator;
use crate::config::Config;
use crate::control::{RedisPublisher, TunnelController};
use crate::registry::PgRegistry;
use crate::verification::{DomainVerifier, HickoryDnsResolver};
use axum::http::HeaderMap;
use fred::clients::Client as RedisClient;
use outray_common::constants;
use sqlx::PgPool;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub allocator: Arc<SubdomainAllocator>,
    pub verifier: Arc<DomainVerifier>,
    pub controller: Arc<TunnelController>,
    /// Held for health checks; components publish through their own handle
    pub publisher: Arc<RedisPublisher>,
}

impl AppState {
    pub fn new(config: Config, db: PgPool, redis: RedisClient) -> Self {
        let config = Arc::new(config);
        let registry = Arc::new(PgRegistry::new(db.clone()));
        let resolver = Arc::new(HickoryDnsResolver::new(config.dns_timeout));
        let publisher = Arc::new(RedisPublisher::new(redis));

        Self {
            allocator: Arc::new(SubdomainAllocator::new(registry.clone(), config.clone())),
            verifier: Arc::new(DomainVerifier::new(
                registry.clone(),
                resolver,
                config.clone(),
            )),
            controller: Arc::new(TunnelController::new(registry, publisher.clone())),
            publisher,
            db,
        }
    }
}

/// Authenticated user id, injected by the upstream auth layer
pub fn caller_user(headers: &HeaderMap) -> Option<String> {
    headers
        .get(constants::USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Organization memberships of the caller, injected by the upstream auth layer
pub fn caller_orgs(headers: &HeaderMap) -> Vec<String> {
    headers
        .get(constants::ORGANIZATIONS_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_caller_identity_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(caller_user(&headers), None);
        assert!(caller_orgs(&headers).is_empty());

        headers.insert(
            constants::USER_HEADER,
            HeaderValue::from_static(" user_1 "),
        );
        headers.insert(
            constants::ORGANIZATIONS_HEADER,
            HeaderValue::from_static("org_1, org_2,,org_3 "),
        );

        assert_eq!(caller_user(&headers), Some("user_1".to_string()));
        assert_eq!(caller_orgs(&headers), vec!["org_1", "org_2", "org_3"]);
    }
}
