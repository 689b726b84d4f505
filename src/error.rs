use thiserror::Error;

/// Errors surfaced to a caller.
///
/// Only [`crate::client::Client::new`] returns these: runtime heartbeat
/// failures are logged through [`crate::logger::Logger`] and never make it
/// into a `Result` a caller has to handle.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid client options: {0}")]
    Config(String),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
