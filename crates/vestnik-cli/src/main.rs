use clap::{Parser, Subcommand};
use std::process::ExitCode;
use thiserror::Error;
use tokio_postgres::{Client, NoTls};
use tracing_subscriber::EnvFilter;
use vestnik_migrate::{MigrateError, MigrateOptions, Migrator, PgSession};
use vestnik_schema::{
    CheckReport, Gate, ModelError, PgIntrospector, SCHEMA_AUTO_ENV, SchemaModel,
};

mod config;
mod report;

use config::{ConfigError, Settings};

const EXIT_DRIFT_OR_FAILURE: u8 = 1;
const EXIT_LOCK_TIMEOUT: u8 = 2;
const EXIT_UNAVAILABLE: u8 = 3;

/// Administrative schema tool for vestnik.
///
/// The only process allowed to create or alter the vestnik schema.
#[derive(Parser, Debug)]
#[command(name = "vestnik-schema", version)]
struct Cli {
    /// Database connection URL
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create missing tables, columns and indexes (additive, idempotent)
    Init {
        /// Print the plan without taking the lock or changing anything
        #[arg(long)]
        dry_run: bool,

        /// Seconds to wait for a concurrent init to finish
        #[arg(long, env = "VESTNIK_SCHEMA_LOCK_TIMEOUT_SEC", default_value_t = 30)]
        lock_timeout: u64,

        /// Seconds a single DDL statement may wait for table locks
        #[arg(long, env = "VESTNIK_SCHEMA_DDL_LOCK_TIMEOUT_SEC", default_value_t = 10)]
        ddl_lock_timeout: u64,
    },
    /// Report drift between the database and the model (read-only)
    Check {
        /// Print the drift report as JSON
        #[arg(long)]
        json: bool,

        /// Also fail when only indexes are missing
        #[arg(long)]
        strict: bool,
    },
    /// Fail if implicit schema creation is enabled in this environment
    Gate,
    /// Print the schema model
    Model,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid schema model: {0}")]
    Model(#[from] ModelError),

    #[error("could not connect to the database: {0}")]
    Connect(#[source] tokio_postgres::Error),

    #[error(transparent)]
    Schema(#[from] vestnik_schema::Error),

    #[error(transparent)]
    Migrate(#[from] MigrateError),

    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
}

impl CliError {
    fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.exit_status())
    }

    fn exit_status(&self) -> u8 {
        match self {
            CliError::Config(_) | CliError::Model(_) | CliError::Connect(_) => EXIT_UNAVAILABLE,
            CliError::Schema(e) if e.is_connectivity() => EXIT_UNAVAILABLE,
            CliError::Migrate(MigrateError::LockTimeout { .. }) => EXIT_LOCK_TIMEOUT,
            CliError::Migrate(MigrateError::Schema(e)) if e.is_connectivity() => EXIT_UNAVAILABLE,
            CliError::Schema(_) | CliError::Migrate(_) | CliError::Json(_) => EXIT_DRIFT_OR_FAILURE,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env must be loaded before clap reads environment fallbacks
    let dotenv = config::load_dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if let Err(e) = dotenv {
        tracing::warn!(error = %e, "ignoring unreadable .env");
    }

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{}", e);
            e.exit_code()
        }
    }
}

fn init_tracing(verbose: bool) {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vestnik=info"));
    if verbose {
        if let Ok(directive) = "vestnik=debug".parse() {
            filter = filter.add_directive(directive);
        }
    }
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();
}

async fn run(cli: Cli) -> Result<ExitCode, CliError> {
    let model = vestnik_schema::vestnik_model()?;

    match cli.command {
        Commands::Gate => Ok(gate()),
        Commands::Model => {
            print!("{}", report::render_model(&model));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Check { json, strict } => {
            let settings = Settings::new(cli.database_url)?;
            let client = connect(&settings).await?;
            check(&model, &client, json, strict).await
        }
        Commands::Init {
            dry_run,
            lock_timeout,
            ddl_lock_timeout,
        } => {
            let settings =
                Settings::new(cli.database_url)?.with_timeouts(lock_timeout, ddl_lock_timeout)?;
            let client = connect(&settings).await?;
            init(&model, &client, &settings, dry_run).await
        }
    }
}

async fn connect(settings: &Settings) -> Result<Client, CliError> {
    tracing::debug!(database = %settings.display_url(), "connecting");
    let (client, connection) = tokio_postgres::connect(&settings.database_url, NoTls)
        .await
        .map_err(CliError::Connect)?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!(error = %e, "connection error");
        }
    });
    Ok(client)
}

fn gate() -> ExitCode {
    if Gate::from_env().is_auto_ddl_allowed() {
        println!("gate: {} is on, runtime services may issue DDL", SCHEMA_AUTO_ENV);
        ExitCode::from(EXIT_DRIFT_OR_FAILURE)
    } else {
        println!("gate: {} is off", SCHEMA_AUTO_ENV);
        ExitCode::SUCCESS
    }
}

async fn check(
    model: &SchemaModel,
    client: &Client,
    json: bool,
    strict: bool,
) -> Result<ExitCode, CliError> {
    let introspector = PgIntrospector::new(client);
    let report = vestnik_schema::check(model, &introspector).await?;

    if json {
        println!("{}", serde_json::to_string(&report.drift())?);
    } else {
        print!("{}", report::render_check(&report, strict));
    }

    if check_passed(&report, strict) {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_DRIFT_OR_FAILURE))
    }
}

/// Missing columns always fail a check; missing indexes only with `--strict`.
fn check_passed(report: &CheckReport, strict: bool) -> bool {
    report.is_ok() && (!strict || report.is_ready())
}

async fn init(
    model: &SchemaModel,
    client: &Client,
    settings: &Settings,
    dry_run: bool,
) -> Result<ExitCode, CliError> {
    if Gate::from_env().is_auto_ddl_allowed() {
        tracing::warn!(
            "{} is on; it must be off wherever runtime services are deployed",
            SCHEMA_AUTO_ENV
        );
    }

    let session = PgSession::new(client).with_ddl_lock_timeout(settings.ddl_lock_timeout);
    let options = MigrateOptions {
        lock_timeout: settings.lock_timeout,
        ..MigrateOptions::default()
    };
    let migrator = Migrator::new(model, &session, options);

    if dry_run {
        let plans = migrator.plan().await?;
        print!("{}", report::render_plan(&plans));
        return Ok(ExitCode::SUCCESS);
    }

    tracing::info!(
        database = %settings.display_url(),
        model_version = model.version(),
        "running init"
    );
    match migrator.init().await {
        Ok(outcome) => {
            print!("{}", report::render_init(&outcome));
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            print!("{}", report::render_init_error(&e));
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use vestnik_schema::{DdlObject, TableState, TableStatus};

    fn pool_closed() -> vestnik_schema::Error {
        vestnik_schema::Error::Pool(deadpool_postgres::PoolError::Closed)
    }

    #[test]
    fn test_exit_statuses() {
        let lock_timeout = CliError::Migrate(MigrateError::LockTimeout {
            lock: vestnik_migrate::INIT_LOCK_NAME,
            waited: Duration::from_secs(30),
        });
        assert_eq!(lock_timeout.exit_status(), EXIT_LOCK_TIMEOUT);

        let failed = CliError::Migrate(MigrateError::MigrationFailed {
            table: "subscriptions",
            object: DdlObject::Column("ends_at".to_string()),
            source: vestnik_schema::Error::Rejected("permission denied".to_string()),
        });
        assert_eq!(failed.exit_status(), EXIT_DRIFT_OR_FAILURE);

        let taken = CliError::Migrate(MigrateError::IndexNameTaken {
            table: "subscriptions",
            index: "ix_subscriptions_ends_at",
            owner: "subscriptions_archive".to_string(),
        });
        assert_eq!(taken.exit_status(), EXIT_DRIFT_OR_FAILURE);

        let missing_url = CliError::Config(ConfigError::MissingDatabaseUrl);
        assert_eq!(missing_url.exit_status(), EXIT_UNAVAILABLE);

        assert_eq!(CliError::Schema(pool_closed()).exit_status(), EXIT_UNAVAILABLE);
        assert_eq!(
            CliError::Migrate(MigrateError::Schema(pool_closed())).exit_status(),
            EXIT_UNAVAILABLE
        );

        let drift = CliError::Schema(vestnik_schema::Error::Rejected("nope".to_string()));
        assert_eq!(drift.exit_status(), EXIT_DRIFT_OR_FAILURE);
    }

    #[test]
    fn test_check_passed() {
        let status = |state, cols: &[&'static str], idx: &[&'static str]| TableStatus {
            table: "subscriptions",
            state,
            missing_columns: cols.to_vec(),
            missing_indexes: idx.to_vec(),
        };
        let report = |status| CheckReport {
            model_version: 4,
            tables: vec![status],
        };

        let ready = report(status(TableState::Ready, &[], &[]));
        assert!(check_passed(&ready, false));
        assert!(check_passed(&ready, true));

        let index_drift = report(status(
            TableState::ExistsColumnsComplete,
            &[],
            &["ix_subscriptions_ends_at"],
        ));
        assert!(check_passed(&index_drift, false));
        assert!(!check_passed(&index_drift, true));

        let column_drift = report(status(
            TableState::ExistsNoRequiredColumns,
            &["ends_at"],
            &["ix_subscriptions_ends_at"],
        ));
        assert!(!check_passed(&column_drift, false));
        assert!(!check_passed(&column_drift, true));
    }
}
