use crate::check::DriftReport;
use thiserror::Error;
use vestnik_db_schema::ModelError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("statement rejected: {0}")]
    Rejected(String),

    #[error("invalid schema model: {0}")]
    Model(#[from] ModelError),

    #[error("schema drift detected: {0}")]
    DriftDetected(DriftReport),
}

impl Error {
    /// True if the database could not be reached, as opposed to a statement
    /// being rejected or a row failing to decode. Callers retry these.
    pub fn is_connectivity(&self) -> bool {
        match self {
            Error::Postgres(e) => is_unreachable(e),
            Error::Pool(deadpool_postgres::PoolError::Backend(e)) => is_unreachable(e),
            Error::Pool(_) => true,
            _ => false,
        }
    }
}

/// A closed connection, or a failure whose cause is an I/O error (refused
/// connections, resets, broken pipes).
fn is_unreachable(e: &tokio_postgres::Error) -> bool {
    e.is_closed()
        || std::error::Error::source(e).is_some_and(|source| source.is::<std::io::Error>())
}
