//! Owns the set of opened leases and the single heartbeat task that keeps
//! them alive: refresh TTLs, analyze the shared ring, publish decisions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::{Notify, OnceCell, RwLock as AsyncRwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::error::{Error, Result};
use crate::lease::Lease;
use crate::logger::log_error;
use crate::migrator;
use crate::options::ClientOptions;
use crate::repository::{PostgresRepository, Repository};
use crate::ring::{self, Status};

struct Inner {
    id: String,
    repo: Arc<dyn Repository>,
    options: ClientOptions,
    leases: AsyncRwLock<HashMap<String, Arc<Lease>>>,
    closed: AtomicBool,
    heartbeat_start: OnceCell<()>,
    stop: Notify,
    heartbeat_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

/// A process's handle onto the shared coordination store. Cheap to clone;
/// clones share the same heartbeat task and lease set.
#[derive(Clone)]
pub struct Client(Arc<Inner>);

impl Client {
    /// Runs pending migrations (under the configured timeout) and starts a
    /// client. The heartbeat itself only starts on the first [`Client::lease`]
    /// call.
    pub async fn new(
        pool: PgPool,
        client_id: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self> {
        crate::repository::validate_identifier("schema", &options.schema)?;
        crate::repository::validate_identifier("table prefix", &options.prefix)?;

        timeout(
            options.migration_timeout,
            migrator::migrate(&pool, &options.schema, &options.prefix),
        )
        .await
        .map_err(|_| Error::Migration("timed out acquiring the migration lock".to_string()))??;

        let repo: Arc<dyn Repository> =
            Arc::new(PostgresRepository::new(pool, &options.schema, &options.prefix)?);

        Ok(Client(Arc::new(Inner {
            id: client_id.into(),
            repo,
            options,
            leases: AsyncRwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
            heartbeat_start: OnceCell::new(),
            stop: Notify::new(),
            heartbeat_handle: tokio::sync::Mutex::new(None),
        })))
    }

    /// Registers (on first call) or returns the existing handle for `name`.
    /// `size` is only honored on the first call; later calls ignore it.
    pub async fn lease(&self, name: &str, size: i64) -> Arc<Lease> {
        if let Some(existing) = self.0.leases.read().await.get(name) {
            return Arc::clone(existing);
        }

        let lease = {
            let mut leases = self.0.leases.write().await;
            if let Some(existing) = leases.get(name) {
                return Arc::clone(existing);
            }

            let lease = Arc::new(Lease::new(
                self.0.id.clone(),
                name.to_string(),
                size,
                Arc::clone(&self.0.options.logger),
            ));
            leases.insert(name.to_string(), Arc::clone(&lease));
            lease
        };

        self.register_lease(&lease).await;
        self.start_heartbeat_once().await;

        lease
    }

    /// Inserts the lease's seed row as `PENDING`, awaited the same way the
    /// original synchronously registers before starting the heartbeat.
    /// Failure here is logged, not propagated: the next heartbeat tick
    /// implicitly retries through the normal balance/approval machinery.
    async fn register_lease(&self, lease: &Arc<Lease>) {
        let inner = &self.0;
        let name = lease.name();
        let seed = lease.ring_seed();

        let result = timeout(
            inner.options.heartbeat_timeout,
            inner
                .repo
                .insert_lease(&inner.id, name, seed, inner.options.ttl, Status::Pending),
        )
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log_error!(
                inner.options.logger,
                "failed to register lease {name:?} for client {:?}: {e}",
                inner.id
            ),
            Err(_) => log_error!(
                inner.options.logger,
                "timed out registering lease {name:?} for client {:?}",
                inner.id
            ),
        }
    }

    async fn start_heartbeat_once(&self) {
        let inner = Arc::clone(&self.0);
        self.0
            .heartbeat_start
            .get_or_init(|| async move {
                let handle = tokio::spawn(run_heartbeat(Arc::clone(&inner)));
                *inner.heartbeat_handle.lock().await = Some(handle);
            })
            .await;
    }

    /// Idempotent. Stops the heartbeat, clears every lease's published
    /// values, and removes this client's rows from the store.
    pub async fn close(&self) -> Result<()> {
        if self.0.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let handle = self.0.heartbeat_handle.lock().await.take();
        if let Some(handle) = handle {
            self.0.stop.notify_one();
            let _ = handle.await;
        }

        Ok(())
    }
}

async fn run_heartbeat(inner: Arc<Inner>) {
    let mut ticker = tokio::time::interval(inner.options.heartbeat);
    loop {
        tokio::select! {
            _ = inner.stop.notified() => break,
            _ = ticker.tick() => heartbeat_tick(&inner).await,
        }
    }
    cleanup(&inner).await;
}

async fn heartbeat_tick(inner: &Arc<Inner>) {
    let leases = inner.leases.read().await;
    let names: Vec<String> = leases.keys().cloned().collect();
    if names.is_empty() {
        return;
    }

    let records = match timeout(
        inner.options.heartbeat_timeout,
        inner
            .repo
            .get_and_refresh_leases(&names, &inner.id, inner.options.ttl),
    )
    .await
    {
        Ok(Ok(records)) => records,
        Ok(Err(e)) => {
            log_error!(
                inner.options.logger,
                "heartbeat failed for client {:?}: {e}",
                inner.id
            );
            return;
        }
        Err(_) => {
            log_error!(
                inner.options.logger,
                "heartbeat timed out for client {:?}",
                inner.id
            );
            return;
        }
    };

    let mut by_name: HashMap<String, Vec<ring::Info>> = HashMap::new();
    for record in records {
        by_name
            .entry(record.name.clone())
            .or_default()
            .push(record.into_ring_info());
    }

    for (name, infos) in by_name {
        let Some(lease) = leases.get(&name) else {
            log_error!(
                inner.options.logger,
                "analyze returned unknown lease {name:?} for client {:?}",
                inner.id
            );
            continue;
        };

        let report = ring::analyze(&infos, &inner.id, lease.size());
        lease.set_values(report.values);
        approve_leases(inner, report.approvals).await;
        register_balance(inner, report.balance).await;
    }
}

async fn approve_leases(inner: &Arc<Inner>, approvals: Vec<ring::Info>) {
    for approval in approvals {
        let result = timeout(
            inner.options.heartbeat_timeout,
            inner.repo.set_lease_status(
                &approval.client_id,
                &approval.name,
                approval.value,
                Status::Leased,
            ),
        )
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log_error!(
                inner.options.logger,
                "failed approving pending lease {:?} for client {:?}: {e}",
                approval.name,
                approval.client_id
            ),
            Err(_) => log_error!(
                inner.options.logger,
                "timed out approving lease {:?} for client {:?}",
                approval.name,
                approval.client_id
            ),
        }
    }
}

async fn register_balance(inner: &Arc<Inner>, balance: Option<ring::Request>) {
    let Some(request) = balance else { return };

    let result = timeout(
        inner.options.heartbeat_timeout,
        inner.repo.insert_lease(
            &request.client_id,
            &request.lease_name,
            request.value,
            inner.options.ttl,
            request.status,
        ),
    )
    .await;

    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log_error!(
            inner.options.logger,
            "failed to register balance request for lease {:?}: {e}",
            request.lease_name
        ),
        Err(_) => log_error!(
            inner.options.logger,
            "timed out registering balance request for lease {:?}",
            request.lease_name
        ),
    }
}

async fn cleanup(inner: &Arc<Inner>) {
    {
        let leases = inner.leases.write().await;
        for lease in leases.values() {
            lease.set_values(Vec::new());
        }
    }

    let result = timeout(inner.options.heartbeat_timeout, inner.repo.delete_leases(&inner.id)).await;
    match result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log_error!(
            inner.options.logger,
            "failed to delete leases for client {:?}: {e}",
            inner.id
        ),
        Err(_) => log_error!(
            inner.options.logger,
            "timed out deleting leases for client {:?}",
            inner.id
        ),
    }
}
