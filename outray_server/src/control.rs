//! Control signal publishing
//!
//! Authorizes teardown requests and emits kill directives on the shared
//! control channel consumed by data-plane nodes. Fire-and-forget: success
//! means the publish call returned, not that any subscriber acted on it.

use crate::error::ControlError;
use crate::registry::Registry;
use async_trait::async_trait;
use fred::clients::Client;
use fred::interfaces::*;
use fred::types::config::Config as RedisConfig;
use outray_common::{constants, ControlSignal};
use std::sync::Arc;
use url::Url;

/// Initialize the Redis client backing the control channel
pub async fn init_client(redis_url: &str) -> anyhow::Result<Client> {
    let config = RedisConfig::from_url(redis_url)?;
    let client = Client::new(config, None, None, None);
    client.init().await?;
    Ok(client)
}

/// Emits control signals toward data-plane nodes
#[async_trait]
pub trait ControlPublisher: Send + Sync {
    async fn publish(&self, signal: &ControlSignal) -> anyhow::Result<()>;
}

/// Redis pub/sub publisher on the well-known control channel
pub struct RedisPublisher {
    client: Client,
}

impl RedisPublisher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Ping Redis to check the connection
    pub async fn ping(&self) -> anyhow::Result<()> {
        self.client.ping::<()>(None).await?;
        Ok(())
    }
}

#[async_trait]
impl ControlPublisher for RedisPublisher {
    async fn publish(&self, signal: &ControlSignal) -> anyhow::Result<()> {
        let payload = signal.encode();
        let receivers: i64 = self
            .client
            .publish(constants::CONTROL_CHANNEL, payload.clone())
            .await?;
        tracing::debug!(
            "Published \"{}\" on {} ({} subscribers)",
            payload,
            constants::CONTROL_CHANNEL,
            receivers
        );
        Ok(())
    }
}

/// Authorizes and emits tunnel teardown directives
pub struct TunnelController {
    registry: Arc<dyn Registry>,
    publisher: Arc<dyn ControlPublisher>,
}

impl TunnelController {
    pub fn new(registry: Arc<dyn Registry>, publisher: Arc<dyn ControlPublisher>) -> Self {
        Self {
            registry,
            publisher,
        }
    }

    /// Stop a live tunnel by broadcasting a kill directive.
    ///
    /// Organization ownership takes precedence for the access check; a
    /// user-owned tunnel may only be stopped by its owning user. Delivery is
    /// not acknowledged and the directive cannot be recalled.
    pub async fn stop(
        &self,
        tunnel_id: &str,
        requester_user_id: &str,
        requester_org_ids: &[String],
    ) -> Result<(), ControlError> {
        let tunnel = self
            .registry
            .find_tunnel(tunnel_id)
            .await?
            .ok_or(ControlError::NotFound("Tunnel"))?;

        match &tunnel.organization_id {
            Some(org) => {
                if !requester_org_ids.contains(org) {
                    return Err(ControlError::Unauthorized);
                }
            }
            None => {
                if tunnel.user_id != requester_user_id {
                    return Err(ControlError::Unauthorized);
                }
            }
        }

        let hostname = target_hostname(&tunnel.url);
        self.publisher
            .publish(&ControlSignal::Kill {
                hostname: hostname.clone(),
            })
            .await
            .map_err(ControlError::Transient)?;

        tracing::info!("Kill directive published for {}", hostname);
        Ok(())
    }
}

/// Best-effort hostname extraction from the stored tunnel URL.
///
/// On parse failure the raw stored string is used as the hostname; the
/// directive must still be emitted rather than failing the whole operation.
fn target_hostname(stored_url: &str) -> String {
    let candidate = if stored_url.starts_with("http") {
        stored_url.to_string()
    } else {
        format!("https://{}", stored_url)
    };

    Url::parse(&candidate)
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()))
        .unwrap_or_else(|| stored_url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Tunnel;
    use crate::registry::MemoryRegistry;
    use chrono::Utc;
    use outray_common::new_id;
    use std::sync::Mutex;

    /// Captures published payloads instead of touching Redis
    #[derive(Default)]
    struct RecordingPublisher {
        messages: Mutex<Vec<String>>,
    }

    impl RecordingPublisher {
        fn messages(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ControlPublisher for RecordingPublisher {
        async fn publish(&self, signal: &ControlSignal) -> anyhow::Result<()> {
            self.messages.lock().unwrap().push(signal.encode());
            Ok(())
        }
    }

    struct FailingPublisher;

    #[async_trait]
    impl ControlPublisher for FailingPublisher {
        async fn publish(&self, _signal: &ControlSignal) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }
    }

    async fn seeded_tunnel(
        registry: &Arc<MemoryRegistry>,
        url: &str,
        user_id: &str,
        organization_id: Option<&str>,
    ) -> Tunnel {
        let now = Utc::now();
        let tunnel = Tunnel {
            id: new_id("tunnel"),
            url: url.to_string(),
            user_id: user_id.to_string(),
            organization_id: organization_id.map(|s| s.to_string()),
            name: None,
            last_seen_at: now,
            created_at: now,
            updated_at: now,
        };
        let subdomain = crate::db::Subdomain {
            id: new_id("subdomain"),
            subdomain: new_id("label"),
            tunnel_id: tunnel.id.clone(),
            created_at: now,
        };
        registry
            .allocate(tunnel.clone(), subdomain)
            .await
            .unwrap();
        tunnel
    }

    fn orgs(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_stop_emits_exact_kill_payload() {
        let registry = Arc::new(MemoryRegistry::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let controller = TunnelController::new(registry.clone(), publisher.clone());

        let tunnel =
            seeded_tunnel(&registry, "https://acme.outray.app", "user_1", Some("org_1")).await;

        controller
            .stop(&tunnel.id, "user_1", &orgs(&["org_1"]))
            .await
            .unwrap();
        assert_eq!(publisher.messages(), vec!["kill:acme.outray.app"]);
    }

    #[tokio::test]
    async fn test_stop_by_non_member_emits_nothing() {
        let registry = Arc::new(MemoryRegistry::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let controller = TunnelController::new(registry.clone(), publisher.clone());

        let tunnel =
            seeded_tunnel(&registry, "https://acme.outray.app", "user_1", Some("org_1")).await;

        let err = controller
            .stop(&tunnel.id, "user_2", &orgs(&["org_2"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Unauthorized));
        assert!(publisher.messages().is_empty());
    }

    #[tokio::test]
    async fn test_user_owned_tunnel_requires_owning_user() {
        let registry = Arc::new(MemoryRegistry::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let controller = TunnelController::new(registry.clone(), publisher.clone());

        let tunnel = seeded_tunnel(&registry, "https://solo.outray.app", "user_1", None).await;

        let err = controller
            .stop(&tunnel.id, "user_2", &orgs(&["org_1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Unauthorized));

        controller.stop(&tunnel.id, "user_1", &[]).await.unwrap();
        assert_eq!(publisher.messages(), vec!["kill:solo.outray.app"]);
    }

    #[tokio::test]
    async fn test_unknown_tunnel_is_not_found() {
        let registry = Arc::new(MemoryRegistry::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let controller = TunnelController::new(registry, publisher);

        let err = controller
            .stop("tunnel_missing", "user_1", &orgs(&["org_1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::NotFound("Tunnel")));
    }

    #[tokio::test]
    async fn test_unparseable_url_falls_back_to_raw_hostname() {
        let registry = Arc::new(MemoryRegistry::new());
        let publisher = Arc::new(RecordingPublisher::default());
        let controller = TunnelController::new(registry.clone(), publisher.clone());

        // Bare hostname gets a scheme prepended before parsing
        let bare = seeded_tunnel(&registry, "acme.outray.app", "user_1", Some("org_1")).await;
        controller
            .stop(&bare.id, "user_1", &orgs(&["org_1"]))
            .await
            .unwrap();

        // Garbage that cannot parse at all is emitted verbatim
        let garbage = seeded_tunnel(&registry, "not a url", "user_1", Some("org_1")).await;
        controller
            .stop(&garbage.id, "user_1", &orgs(&["org_1"]))
            .await
            .unwrap();

        assert_eq!(
            publisher.messages(),
            vec!["kill:acme.outray.app", "kill:not a url"]
        );
    }

    #[tokio::test]
    async fn test_publish_failure_surfaces_as_transient() {
        let registry = Arc::new(MemoryRegistry::new());
        let controller = TunnelController::new(registry.clone(), Arc::new(FailingPublisher));

        let tunnel =
            seeded_tunnel(&registry, "https://acme.outray.app", "user_1", Some("org_1")).await;

        let err = controller
            .stop(&tunnel.id, "user_1", &orgs(&["org_1"]))
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Transient(_)));
    }
}
