//! Connection settings for the CLI.
//!
//! Values come from flags, falling back to the environment (and `.env`).

use std::time::Duration;
use thiserror::Error;
use vestnik_migrate::{DEFAULT_DDL_LOCK_TIMEOUT, DEFAULT_LOCK_TIMEOUT};

/// Settings needed to talk to the database.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    pub lock_timeout: Duration,
    pub ddl_lock_timeout: Duration,
}

impl Settings {
    /// Settings for `database_url` with the default timeouts.
    pub fn new(database_url: Option<String>) -> Result<Self, ConfigError> {
        let raw = database_url
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::MissingDatabaseUrl)?;
        let database_url = normalize_database_url(raw.trim());
        database_url
            .parse::<tokio_postgres::Config>()
            .map_err(|e| ConfigError::InvalidDatabaseUrl(e.to_string()))?;
        Ok(Self {
            database_url,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            ddl_lock_timeout: DEFAULT_DDL_LOCK_TIMEOUT,
        })
    }

    /// Override the timeouts used by `init`.
    ///
    /// Postgres reads a `lock_timeout` of zero as "wait forever", so a zero
    /// DDL lock timeout is rejected.
    pub fn with_timeouts(
        mut self,
        lock_timeout_sec: u64,
        ddl_lock_timeout_sec: u64,
    ) -> Result<Self, ConfigError> {
        if ddl_lock_timeout_sec == 0 {
            return Err(ConfigError::ZeroDdlLockTimeout);
        }
        self.lock_timeout = Duration::from_secs(lock_timeout_sec);
        self.ddl_lock_timeout = Duration::from_secs(ddl_lock_timeout_sec);
        Ok(self)
    }

    /// The database URL with its password masked, for logs.
    pub fn display_url(&self) -> String {
        mask_password(&self.database_url)
    }
}

/// Load `.env` from the current directory or a parent, if there is one.
pub fn load_dotenv() -> Result<(), ConfigError> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(e) if e.not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Strip a driver suffix such as `postgresql+asyncpg://` down to `postgresql://`.
pub fn normalize_database_url(url: &str) -> String {
    if let Some(start) = url.find("://") {
        let scheme = &url[..start];
        if let Some(plus) = scheme.find('+') {
            return format!("{}{}", &scheme[..plus], &url[start..]);
        }
    }
    url.to_string()
}

/// Mask password in database URL for display
pub fn mask_password(url: &str) -> String {
    // Simple masking: replace password between :// and the last @
    if let Some(start) = url.find("://") {
        if let Some(at) = url.rfind('@') {
            if at > start {
                let prefix = &url[..start + 3];
                let suffix = &url[at..];
                if let Some(colon) = url[start + 3..at].find(':') {
                    let user = &url[start + 3..start + 3 + colon];
                    return format!("{}{}:***{}", prefix, user, suffix);
                }
            }
        }
    }
    url.to_string()
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("DATABASE_URL is not set (pass --database-url or set it in the environment)")]
    MissingDatabaseUrl,

    #[error("invalid database URL: {0}")]
    InvalidDatabaseUrl(String),

    #[error("the DDL lock timeout must be at least one second")]
    ZeroDdlLockTimeout,

    #[error("failed to load .env: {0}")]
    Dotenv(#[from] dotenvy::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_driver_suffix() {
        assert_eq!(
            normalize_database_url("postgresql+asyncpg://vestnik:vestnik@db:5432/vestnik"),
            "postgresql://vestnik:vestnik@db:5432/vestnik"
        );
        assert_eq!(
            normalize_database_url("postgres://u@localhost/db"),
            "postgres://u@localhost/db"
        );
        assert_eq!(normalize_database_url("host=localhost"), "host=localhost");
    }

    #[test]
    fn test_mask_password() {
        assert_eq!(
            mask_password("postgresql://vestnik:s3cret@db:5432/vestnik"),
            "postgresql://vestnik:***@db:5432/vestnik"
        );
        assert_eq!(
            mask_password("postgresql://vestnik:p@ss@db/vestnik"),
            "postgresql://vestnik:***@db/vestnik"
        );
        assert_eq!(
            mask_password("postgresql://vestnik@db/vestnik"),
            "postgresql://vestnik@db/vestnik"
        );
    }

    #[test]
    fn test_settings() {
        let settings = Settings::new(Some(
            "postgresql+asyncpg://vestnik:pw@db:5432/vestnik".to_string(),
        ))
        .unwrap();
        assert_eq!(settings.database_url, "postgresql://vestnik:pw@db:5432/vestnik");
        assert_eq!(settings.display_url(), "postgresql://vestnik:***@db:5432/vestnik");
        assert_eq!(settings.lock_timeout, Duration::from_secs(30));
        assert_eq!(settings.ddl_lock_timeout, Duration::from_secs(10));

        let settings = settings.with_timeouts(5, 2).unwrap();
        assert_eq!(settings.lock_timeout, Duration::from_secs(5));
        assert_eq!(settings.ddl_lock_timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_zero_ddl_lock_timeout_is_rejected() {
        let settings = Settings::new(Some("postgresql://u@localhost/db".to_string())).unwrap();
        assert!(matches!(
            settings.clone().with_timeouts(30, 0),
            Err(ConfigError::ZeroDdlLockTimeout)
        ));
        // a zero coordination lock timeout means a single attempt
        assert!(settings.with_timeouts(0, 10).is_ok());
    }

    #[test]
    fn test_missing_url() {
        assert!(matches!(
            Settings::new(None),
            Err(ConfigError::MissingDatabaseUrl)
        ));
        assert!(matches!(
            Settings::new(Some("  ".to_string())),
            Err(ConfigError::MissingDatabaseUrl)
        ));
    }

    #[test]
    fn test_unreadable_dotenv() {
        let err: ConfigError = dotenvy::Error::LineParse("EXPORT=\"unterminated".to_string(), 7).into();
        assert!(matches!(err, ConfigError::Dotenv(_)));
        assert!(err.to_string().starts_with("failed to load .env: "), "{err}");
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            Settings::new(Some("postgresql://u@localhost:notaport/db".to_string())),
            Err(ConfigError::InvalidDatabaseUrl(_))
        ));
    }
}
