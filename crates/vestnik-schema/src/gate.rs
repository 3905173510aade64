//! The auto-DDL gate.
//!
//! Runtime services never create schema: they hold no reference to the
//! migrator at all, since it lives in a crate they do not depend on. The
//! [`Gate`] only answers whether the deprecated implicit-creation path may run,
//! and lets deploy tooling assert that the flag is off.

use std::sync::OnceLock;

/// Environment variable controlling implicit schema creation at runtime.
pub const SCHEMA_AUTO_ENV: &str = "VESTNIK_SCHEMA_AUTO";

/// Whether automatic schema creation is permitted. Defaults to off.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaAutoFlag(bool);

impl SchemaAutoFlag {
    pub const OFF: Self = Self(false);
    pub const ON: Self = Self(true);

    /// Parse a raw environment value. Unset or unrecognized means off.
    pub fn from_value(raw: Option<&str>) -> Self {
        let on = raw.is_some_and(|v| {
            matches!(
                v.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "y" | "on"
            )
        });
        Self(on)
    }

    /// The process-wide flag, read from the environment once.
    pub fn from_env() -> Self {
        static FLAG: OnceLock<SchemaAutoFlag> = OnceLock::new();
        *FLAG.get_or_init(|| {
            let raw = std::env::var(SCHEMA_AUTO_ENV).ok();
            SchemaAutoFlag::from_value(raw.as_deref())
        })
    }

    pub fn is_set(self) -> bool {
        self.0
    }
}

/// Answers whether implicit schema DDL is allowed in this process.
#[derive(Debug, Clone, Copy)]
pub struct Gate {
    flag: SchemaAutoFlag,
}

impl Gate {
    pub fn new(flag: SchemaAutoFlag) -> Self {
        Self { flag }
    }

    pub fn from_env() -> Self {
        Self::new(SchemaAutoFlag::from_env())
    }

    pub fn is_auto_ddl_allowed(&self) -> bool {
        self.flag.is_set()
    }
}
