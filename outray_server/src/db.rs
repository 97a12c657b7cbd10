//! Database connection and registry models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgPoolOptions, PgPool};

/// Initialize the database connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Tunnel model - a live or recently-live exposed endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Tunnel {
    pub id: String,
    /// Public URL (e.g., "https://acme.outray.app")
    pub url: String,
    pub user_id: String,
    /// Owning organization; takes precedence over user ownership for access
    /// checks when present
    pub organization_id: Option<String>,
    /// Optional human label
    pub name: Option<String>,
    /// Refreshed by liveness signals from the data-plane
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Subdomain model - a unique label reserving a namespace under the base
/// domain, mapped to exactly one tunnel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Subdomain {
    pub id: String,
    /// Unique label, stored lowercase (uniqueness is case-insensitive)
    pub subdomain: String,
    pub tunnel_id: String,
    pub created_at: DateTime<Utc>,
}

/// Custom domain model - a caller-owned hostname bound to an organization.
/// The row id doubles as the DNS challenge token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Domain {
    pub id: String,
    pub domain: String,
    pub organization_id: String,
    /// Stored as TEXT in the `domains` table
    #[sqlx(try_from = "String")]
    pub status: DomainStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Verification status of a custom domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainStatus {
    Pending,
    Active,
    Failed,
}

impl DomainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainStatus::Pending => "pending",
            DomainStatus::Active => "active",
            DomainStatus::Failed => "failed",
        }
    }
}

impl TryFrom<String> for DomainStatus {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "pending" => Ok(DomainStatus::Pending),
            "active" => Ok(DomainStatus::Active),
            "failed" => Ok(DomainStatus::Failed),
            other => Err(format!("unknown domain status: {}", other)),
        }
    }
}

/// Database queries
pub mod queries {
    use super::*;

    /// Find a subdomain allocation by its label
    pub async fn find_subdomain(
        pool: &PgPool,
        label: &str,
    ) -> Result<Option<Subdomain>, sqlx::Error> {
        sqlx::query_as::<_, Subdomain>(
            "SELECT id, subdomain, tunnel_id, created_at FROM subdomains WHERE subdomain = $1",
        )
        .bind(label)
        .fetch_optional(pool)
        .await
    }

    /// Find a tunnel by id
    pub async fn find_tunnel(pool: &PgPool, id: &str) -> Result<Option<Tunnel>, sqlx::Error> {
        sqlx::query_as::<_, Tunnel>(
            r#"SELECT id, url, user_id, organization_id, name, last_seen_at, created_at, updated_at
               FROM tunnels WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Insert a tunnel and its subdomain allocation in one transaction.
    ///
    /// The unique constraint on `subdomains.subdomain` is the sole arbiter of
    /// label uniqueness: if another allocation holds the label, nothing is
    /// written and `false` is returned so the caller can re-resolve ownership.
    pub async fn insert_allocation(
        pool: &PgPool,
        tunnel: &Tunnel,
        subdomain: &Subdomain,
    ) -> Result<bool, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tunnels (id, url, user_id, organization_id, name, last_seen_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&tunnel.id)
        .bind(&tunnel.url)
        .bind(&tunnel.user_id)
        .bind(&tunnel.organization_id)
        .bind(&tunnel.name)
        .bind(tunnel.last_seen_at)
        .bind(tunnel.created_at)
        .bind(tunnel.updated_at)
        .execute(&mut *tx)
        .await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO subdomains (id, subdomain, tunnel_id, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (subdomain) DO NOTHING
            "#,
        )
        .bind(&subdomain.id)
        .bind(&subdomain.subdomain)
        .bind(&subdomain.tunnel_id)
        .bind(subdomain.created_at)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            > 0;

        if inserted {
            tx.commit().await?;
        } else {
            // Lost the race for the label; roll the tunnel row back too
            tx.rollback().await?;
        }

        Ok(inserted)
    }

    /// Refresh a tunnel's liveness timestamp
    pub async fn touch_tunnel(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE tunnels SET last_seen_at = NOW(), updated_at = NOW() WHERE id = $1")
                .bind(id)
                .execute(pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find a custom domain by id
    pub async fn find_domain(pool: &PgPool, id: &str) -> Result<Option<Domain>, sqlx::Error> {
        sqlx::query_as::<_, Domain>(
            r#"SELECT id, domain, organization_id, status, created_at, updated_at
               FROM domains WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// Add a custom domain in pending state
    pub async fn insert_domain(pool: &PgPool, domain: &Domain) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO domains (id, domain, organization_id, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&domain.id)
        .bind(&domain.domain)
        .bind(&domain.organization_id)
        .bind(domain.status.as_str())
        .bind(domain.created_at)
        .bind(domain.updated_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Update a custom domain's verification status
    pub async fn set_domain_status(
        pool: &PgPool,
        id: &str,
        status: DomainStatus,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE domains SET status = $1, updated_at = NOW() WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
