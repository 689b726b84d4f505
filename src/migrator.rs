//! Ordered, idempotent schema migrations, run once per process under a
//! Postgres advisory lock before any client starts heartbeating.
//!
//! There is no general migration framework here on purpose: the crate ships
//! its own tiny engine over a handful of embedded DDL files, the way the
//! original vendors one rather than depending on an external migration tool.

use sha2::{Digest, Sha512};
use sqlx::PgPool;

use crate::error::{Error, Result};
use crate::hash;

struct Migration {
    version: u32,
    file_name: &'static str,
    ddl: &'static str,
}

/// Every DDL file this crate ships, in declaration order. Each name begins
/// with a three-digit, gap-free sequence number starting at 1.
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    file_name: "001_create_leases_table.sql",
    ddl: include_str!("../migrations/001_create_leases_table.sql"),
}];

fn parse_file_version(name: &str) -> Result<u32> {
    if name.len() < 4 {
        return Err(Error::Config(format!(
            "migration file name too short: {name}"
        )));
    }
    name[0..3]
        .parse::<u32>()
        .map_err(|e| Error::Config(format!("file name must start with digits {name:?}: {e}")))
}

fn validated_migrations() -> Result<&'static [Migration]> {
    for (i, migration) in MIGRATIONS.iter().enumerate() {
        let parsed = parse_file_version(migration.file_name)?;
        if parsed != migration.version {
            return Err(Error::Config(format!(
                "migration {} declares version {} but its file name says {}",
                migration.file_name, migration.version, parsed
            )));
        }
        if migration.version != (i + 1) as u32 {
            return Err(Error::Config(format!(
                "migration {} not numbered in sequence: {}",
                i + 1,
                migration.file_name
            )));
        }
    }
    Ok(MIGRATIONS)
}

/// Runs every migration newer than the schema's recorded version, holding a
/// Postgres advisory lock keyed by `hash(schema)` for the duration.
pub async fn migrate(pool: &PgPool, schema: &str, prefix: &str) -> Result<()> {
    let migrations = validated_migrations()?;
    let lock_key = i64::from(hash::hash(schema));

    sqlx::query("SELECT pg_advisory_lock($1)")
        .bind(lock_key)
        .execute(pool)
        .await
        .map_err(|e| Error::Migration(format!("lock failed: {e}")))?;

    let result = run_migrations(pool, schema, prefix, migrations).await;

    if let Err(e) = sqlx::query("SELECT pg_advisory_unlock($1)")
        .bind(lock_key)
        .execute(pool)
        .await
    {
        tracing::error!("failed to release migration lock for schema {schema:?}: {e}");
    }

    result
}

async fn run_migrations(
    pool: &PgPool,
    schema: &str,
    prefix: &str,
    migrations: &[Migration],
) -> Result<()> {
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS \"{schema}\""))
        .execute(pool)
        .await
        .map_err(|e| Error::Migration(format!("create schema failed: {e}")))?;

    let migrations_table = format!("\"{schema}\".\"{prefix}_migrations\"");
    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {migrations_table} (\
           version INTEGER PRIMARY KEY, \
           file_name TEXT NOT NULL, \
           sha TEXT NOT NULL, \
           applied_at TIMESTAMPTZ NOT NULL DEFAULT now())"
    ))
    .execute(pool)
    .await
    .map_err(|e| Error::Migration(format!("create migration table failed: {e}")))?;

    let current_version: Option<i32> =
        sqlx::query_scalar(&format!("SELECT MAX(version) FROM {migrations_table}"))
            .fetch_one(pool)
            .await
            .map_err(|e| Error::Migration(format!("reading current version failed: {e}")))?;
    let mut current_version = current_version.unwrap_or(0) as u32;

    for migration in migrations {
        if migration.version <= current_version {
            continue;
        }

        let ddl = migration
            .ddl
            .replace("{schema}", schema)
            .replace("{prefix}", prefix);

        sqlx::query(&ddl).execute(pool).await.map_err(|e| {
            Error::Migration(format!(
                "applying {} failed: {e}",
                migration.file_name
            ))
        })?;

        let sha = format!("{:x}", Sha512::digest(migration.ddl.as_bytes()));
        sqlx::query(&format!(
            "INSERT INTO {migrations_table} (version, file_name, sha) VALUES ($1, $2, $3)"
        ))
        .bind(migration.version as i32)
        .bind(migration.file_name)
        .bind(sha)
        .execute(pool)
        .await
        .map_err(|e| Error::Migration(format!("recording migration version failed: {e}")))?;

        current_version = migration.version;
    }

    Ok(())
}
