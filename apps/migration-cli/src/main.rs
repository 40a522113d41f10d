use clap::{Parser, ValueEnum};
use db_infra::infra::db::migration_counters;
use db_infra::{
    orchestrate_migration_with_cancel, CancellationToken, ConnSpec, DbKind, RuntimeEnv,
};
use migration::MigrationCommand;
use tracing_subscriber::EnvFilter;

#[derive(Clone, ValueEnum)]
enum Env {
    Prod,
    Test,
}

#[derive(Clone, ValueEnum)]
enum Db {
    Postgres,
    Mysql,
    SqliteFile,
}

#[derive(Parser)]
#[command(name = "migration")]
#[command(about = "Counter database migration tool")]
struct Args {
    /// Migration command: up | down | fresh | reset | refresh | status
    command: String,

    /// Runtime environment
    #[arg(short, long, value_enum, default_value = "test")]
    env: Env,

    /// Database type
    #[arg(
        short,
        long,
        value_enum,
        default_value = "postgres",
        help = "Database type: postgres, mysql, sqlite-file"
    )]
    db: Db,
}

fn explain_unsupported_db() {
    eprintln!("❌ Unsupported database type provided.");
    eprintln!();
    eprintln!("Note: SQLite in-memory databases are not supported for CLI operations.");
    eprintln!("Reason: each CLI run would migrate a fresh database that vanishes on exit.");
    eprintln!();
    eprintln!("Supported database types:");
    eprintln!("  • postgres    - PostgreSQL database");
    eprintln!("  • mysql       - MySQL or MariaDB database");
    eprintln!("  • sqlite-file - SQLite file database");
    eprintln!();
    eprintln!("Example: migration --db sqlite-file status");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout)
        .without_time()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("migration=info,db_infra=info,sqlx=warn")),
        )
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let msg = e.to_string();
            if msg.contains("invalid value") && msg.contains("--db") {
                explain_unsupported_db();
                std::process::exit(1);
            }
            // For other errors, use clap's default error handling
            e.exit();
        }
    };

    let command = match args.command.parse::<MigrationCommand>() {
        Ok(command) => command,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };

    let env = match args.env {
        Env::Prod => RuntimeEnv::Prod,
        Env::Test => RuntimeEnv::Test,
    };

    let db_kind = match args.db {
        Db::Postgres => DbKind::Postgres,
        Db::Mysql => DbKind::MySql,
        Db::SqliteFile => DbKind::SqliteFile,
    };

    let spec = match ConnSpec::from_env(env, db_kind) {
        Ok(spec) => spec,
        Err(e) => {
            eprintln!("Migration failed: {e}");
            std::process::exit(1);
        }
    };

    // Ctrl-C abandons lock waiting or the running migration; the lock is still released.
    let cancellation_token = CancellationToken::new();
    let on_interrupt = cancellation_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, cancelling migration...");
            on_interrupt.cancel();
        }
    });

    let result = orchestrate_migration_with_cancel(&spec, command, cancellation_token).await;
    migration_counters::log_snapshot("migration-cli");

    if let Err(e) = result {
        eprintln!("Migration failed: {e}");
        std::process::exit(1);
    }
}
