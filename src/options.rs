//! Construction-time configuration, validated before a [`crate::Client`]
//! ever touches the database.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::logger::{Logger, NoopLogger, TracingLogger};

/// Validated client configuration. Build one with [`ClientOptionsBuilder`].
#[derive(Clone)]
pub struct ClientOptions {
    pub(crate) ttl: Duration,
    pub(crate) heartbeat: Duration,
    pub(crate) migration_timeout: Duration,
    pub(crate) heartbeat_timeout: Duration,
    pub(crate) schema: String,
    pub(crate) prefix: String,
    pub(crate) logger: Arc<dyn Logger>,
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("ttl", &self.ttl)
            .field("heartbeat", &self.heartbeat)
            .field("migration_timeout", &self.migration_timeout)
            .field("heartbeat_timeout", &self.heartbeat_timeout)
            .field("schema", &self.schema)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptionsBuilder::default()
            .build()
            .expect("default options are always valid")
    }
}

/// Builds a [`ClientOptions`], validating `ttl`/`heartbeat` at `build()`.
pub struct ClientOptionsBuilder {
    ttl: Duration,
    heartbeat: Duration,
    migration_timeout: Duration,
    heartbeat_timeout: Duration,
    schema: String,
    prefix: String,
    logger: Arc<dyn Logger>,
}

impl Default for ClientOptionsBuilder {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(6),
            heartbeat: Duration::from_secs(5),
            migration_timeout: Duration::from_secs(5),
            heartbeat_timeout: Duration::from_secs(1),
            schema: "public".to_string(),
            prefix: "db_leases".to_string(),
            logger: Arc::new(TracingLogger),
        }
    }
}

impl ClientOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn migration_timeout(mut self, timeout: Duration) -> Self {
        self.migration_timeout = timeout;
        self
    }

    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn postgres(mut self, schema: impl Into<String>, table_prefix: impl Into<String>) -> Self {
        self.schema = schema.into();
        self.prefix = table_prefix.into();
        self
    }

    pub fn logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn logging_disabled(mut self) -> Self {
        self.logger = Arc::new(NoopLogger);
        self
    }

    pub fn build(self) -> Result<ClientOptions> {
        if self.heartbeat >= self.ttl {
            return Err(Error::Config(format!(
                "heartbeat too slow compared to ttl: {:?} >= {:?}",
                self.heartbeat, self.ttl
            )));
        }

        if self.ttl < Duration::from_secs(1) {
            return Err(Error::Config(format!(
                "ttl must be at least 1 second: {:?}",
                self.ttl
            )));
        }

        Ok(ClientOptions {
            ttl: self.ttl,
            heartbeat: self.heartbeat,
            migration_timeout: self.migration_timeout,
            heartbeat_timeout: self.heartbeat_timeout,
            schema: self.schema,
            prefix: self.prefix,
            logger: self.logger,
        })
    }
}
