//! The store boundary: four operations every client needs, and the one
//! concrete implementation against Postgres.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::error::{Error, Result};
use crate::ring::Status;
use crate::rfc8601;

/// A row of the shared lease table, as read back by [`Repository::get_and_refresh_leases`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRecord {
    pub name: String,
    pub client_id: String,
    pub value: i64,
    pub status: Status,
    pub ttl: DateTime<Utc>,
}

impl LeaseRecord {
    pub fn into_ring_info(self) -> crate::ring::Info {
        crate::ring::Info {
            name: self.name,
            client_id: self.client_id,
            value: self.value,
            status: self.status,
        }
    }
}

/// The shared store, abstracted over the four operations the coordination
/// algorithm needs. The one implementation in this crate targets Postgres;
/// object-safety via `async-trait` lets a `Client` hold a `dyn Repository`.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn insert_lease(
        &self,
        client_id: &str,
        lease_name: &str,
        value: i64,
        ttl: Duration,
        status: Status,
    ) -> Result<()>;

    async fn get_and_refresh_leases(
        &self,
        names: &[String],
        client_id: &str,
        ttl: Duration,
    ) -> Result<Vec<LeaseRecord>>;

    async fn set_lease_status(
        &self,
        client_id: &str,
        lease_name: &str,
        value: i64,
        status: Status,
    ) -> Result<()>;

    async fn delete_leases(&self, client_id: &str) -> Result<()>;
}

pub(crate) fn validate_identifier(kind: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && value.chars().next().is_some_and(|c| !c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{kind} {value:?} is not a valid SQL identifier"
        )))
    }
}

/// Postgres-backed [`Repository`]. SQL text is rendered once, at
/// construction, from `schema`/`prefix` into the table name — there is no
/// general template engine here, just the fixed skeletons below.
#[derive(Debug, Clone)]
pub struct PostgresRepository {
    pool: PgPool,
    table: String,
}

impl PostgresRepository {
    /// `schema` and `prefix` become the table `"<schema>"."<prefix>_leases"`.
    /// Both must look like plain SQL identifiers: this crate interpolates
    /// them directly into query text, so it refuses anything else up front
    /// rather than building an injectable query later.
    pub fn new(pool: PgPool, schema: &str, prefix: &str) -> Result<Self> {
        validate_identifier("schema", schema)?;
        validate_identifier("table prefix", prefix)?;
        Ok(Self {
            pool,
            table: format!("\"{schema}\".\"{prefix}_leases\""),
        })
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn insert_lease(
        &self,
        client_id: &str,
        lease_name: &str,
        value: i64,
        ttl: Duration,
        status: Status,
    ) -> Result<()> {
        let query = format!(
            "INSERT INTO {table} (name, client_id, value, status, ttl) \
             VALUES ($1, $2, $3, $4, now() + $5::interval) \
             ON CONFLICT (name, client_id, value) \
             DO UPDATE SET status = EXCLUDED.status, ttl = EXCLUDED.ttl",
            table = self.table
        );
        sqlx::query(&query)
            .bind(lease_name)
            .bind(client_id)
            .bind(value)
            .bind(status.as_str())
            .bind(rfc8601::format(ttl))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_and_refresh_leases(
        &self,
        names: &[String],
        client_id: &str,
        ttl: Duration,
    ) -> Result<Vec<LeaseRecord>> {
        let mut tx = self.pool.begin().await?;

        let refresh = format!(
            "UPDATE {table} SET ttl = now() + $1::interval \
             WHERE client_id = $2 AND name = ANY($3)",
            table = self.table
        );
        sqlx::query(&refresh)
            .bind(rfc8601::format(ttl))
            .bind(client_id)
            .bind(names)
            .execute(&mut *tx)
            .await?;

        let select = format!(
            "SELECT name, client_id, value, status, ttl FROM {table} \
             WHERE name = ANY($1) AND ttl > now()",
            table = self.table
        );
        let rows = sqlx::query(&select)
            .bind(names)
            .fetch_all(&mut *tx)
            .await?;

        tx.commit().await?;

        rows.into_iter()
            .map(|row| {
                let status_text: String = row.try_get("status")?;
                let status = status_text.parse::<Status>().map_err(|e: String| {
                    sqlx::Error::Decode(Box::new(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        e,
                    )))
                })?;
                Ok(LeaseRecord {
                    name: row.try_get("name")?,
                    client_id: row.try_get("client_id")?,
                    value: row.try_get("value")?,
                    status,
                    ttl: row.try_get("ttl")?,
                })
            })
            .collect::<std::result::Result<Vec<_>, sqlx::Error>>()
            .map_err(Error::from)
    }

    async fn set_lease_status(
        &self,
        client_id: &str,
        lease_name: &str,
        value: i64,
        status: Status,
    ) -> Result<()> {
        let query = format!(
            "UPDATE {table} SET status = $1 \
             WHERE client_id = $2 AND name = $3 AND value = $4",
            table = self.table
        );
        // A no-op when the row is already gone is expected, not an error.
        sqlx::query(&query)
            .bind(status.as_str())
            .bind(client_id)
            .bind(lease_name)
            .bind(value)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_leases(&self, client_id: &str) -> Result<()> {
        let query = format!("DELETE FROM {table} WHERE client_id = $1", table = self.table);
        sqlx::query(&query).bind(client_id).execute(&self.pool).await?;
        Ok(())
    }
}
