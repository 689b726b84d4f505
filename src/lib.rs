#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Distributed, cooperative partition assignment over a shared SQL database.
//!
//! A named resource (a "lease") is partitioned into `[0, size)` integer
//! slots across every client that has opened it. Clients never talk to each
//! other directly: they all poll and write the same table and converge on a
//! disjoint partition by following the same deterministic rules, run
//! independently by every client. There is no broker, no consensus round,
//! no leader.
//!
//! ```no_run
//! # async fn run(pool: sqlx::PgPool) -> dbleases::Result<()> {
//! let client = dbleases::Client::new(pool, "worker-1", dbleases::ClientOptions::default()).await?;
//! let lease = client.lease("jobs", 16).await;
//! println!("owned slots: {:?}", lease.values());
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod hash;
mod lease;
pub mod logger;
mod migrator;
mod options;
mod present;
mod repository;
mod rfc8601;
mod ring;

pub use client::Client;
pub use error::{Error, Result};
pub use lease::Lease;
pub use options::{ClientOptions, ClientOptionsBuilder};
pub use repository::{LeaseRecord, PostgresRepository, Repository};
pub use ring::Status;
