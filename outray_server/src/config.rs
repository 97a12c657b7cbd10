//! Server configuration loaded from environment variables

use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,

    /// Port for the control-plane HTTP API
    pub port: u16,

    /// Base domain under which tunnel subdomains live (e.g., "outray.app")
    pub base_domain: String,

    /// Edge hostname custom domains are expected to CNAME to
    /// (e.g., "edge.outray.app")
    pub edge_host: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string (control channel)
    pub redis_url: String,

    /// Upper bound for a single DNS lookup during domain verification
    pub dns_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_domain = env::var("BASE_DOMAIN").unwrap_or_else(|_| "outray.app".to_string());
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            edge_host: env::var("EDGE_HOST").unwrap_or_else(|_| format!("edge.{}", base_domain)),
            base_domain,
            database_url: env::var("DATABASE_URL")
                .map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            dns_timeout: Duration::from_secs(
                env::var("DNS_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidDnsTimeout)?,
            ),
        })
    }

    /// Get the full public tunnel URL for a subdomain
    pub fn full_url(&self, subdomain: &str) -> String {
        format!("https://{}.{}", subdomain, self.base_domain)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid DNS timeout")]
    InvalidDnsTimeout,
}

#[cfg(test)]
impl Config {
    /// Fixed configuration for unit tests
    pub fn for_tests() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            base_domain: "outray.app".to_string(),
            edge_host: "edge.outray.app".to_string(),
            database_url: String::new(),
            redis_url: String::new(),
            dns_timeout: Duration::from_secs(1),
        }
    }
}
