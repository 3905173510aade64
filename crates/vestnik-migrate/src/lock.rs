//! The coordination lock serializing concurrent `init` runs.

use crate::error::MigrateError;
use crate::session::DdlSession;
use std::time::Duration;
use tokio::time::Instant;

/// Name of the lock held for the duration of an `init` run.
pub const INIT_LOCK_NAME: &str = "vestnik.schema.init";

/// Default bound on waiting for another `init` to finish.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Derive the 64-bit advisory lock key for `name`.
pub fn lock_key(name: &str) -> i64 {
    let hash = blake3::hash(name.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&hash.as_bytes()[..8]);
    i64::from_be_bytes(bytes)
}

/// A named, database-scoped advisory lock.
#[derive(Debug, Clone, Copy)]
pub struct CoordinationLock {
    name: &'static str,
    key: i64,
}

impl CoordinationLock {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            key: lock_key(name),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn key(&self) -> i64 {
        self.key
    }

    /// Poll for the lock until `timeout` elapses.
    pub async fn acquire<S: DdlSession>(
        &self,
        session: &S,
        timeout: Duration,
    ) -> Result<(), MigrateError> {
        let start = Instant::now();
        loop {
            if session.try_lock(self.key).await? {
                tracing::debug!(lock = self.name, "acquired coordination lock");
                return Ok(());
            }
            let waited = start.elapsed();
            if waited >= timeout {
                return Err(MigrateError::LockTimeout {
                    lock: self.name,
                    waited,
                });
            }
            tracing::debug!(lock = self.name, ?waited, "lock busy, waiting");
            tokio::time::sleep(POLL_INTERVAL.min(timeout - waited)).await;
        }
    }

    pub async fn release<S: DdlSession>(&self, session: &S) -> Result<(), MigrateError> {
        if !session.unlock(self.key).await? {
            tracing::warn!(lock = self.name, "coordination lock was not held at release");
        }
        Ok(())
    }
}
