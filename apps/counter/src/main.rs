use clap::{Parser, Subcommand, ValueEnum};
use counter::presentation::{render_rows, render_snapshot, render_value, OutputFormat};
use counter::{with_store, CounterError};
use db_infra::{ConnSpec, DbKind, RuntimeEnv};

mod telemetry;

#[derive(Clone, Copy, ValueEnum)]
enum Env {
    Prod,
    Test,
}

#[derive(Clone, Copy, ValueEnum)]
enum Db {
    Postgres,
    Mysql,
    SqliteFile,
    SqliteMemory,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Html,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Ensure the schema, append one value, print the snapshot
    Run,
    /// Append one value and print it
    Next,
    /// Print the last value and the row count
    Snapshot {
        /// Read both values inside one transaction
        #[arg(long)]
        consistent: bool,
    },
    /// Print every row in id order
    Rows,
}

#[derive(Parser)]
#[command(name = "counter")]
#[command(about = "Durable counter: append the next value and report the table state")]
struct Args {
    /// Runtime environment
    #[arg(short, long, value_enum, default_value = "test")]
    env: Env,

    /// Database type
    #[arg(short, long, value_enum, default_value = "postgres")]
    db: Db,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: Format,

    #[command(subcommand)]
    command: Option<Command>,
}

async fn execute(
    spec: ConnSpec,
    command: Command,
    format: OutputFormat,
) -> Result<String, CounterError> {
    with_store(spec, |store| {
        Box::pin(async move {
            // A fresh in-memory database never has the table yet.
            if store.spec().db_kind() == DbKind::SqliteMemory && !matches!(command, Command::Run) {
                store.ensure_schema().await?;
            }

            match command {
                Command::Run => {
                    store.ensure_schema().await?;
                    store.next_value().await?;
                    let snapshot = store.snapshot().await?;
                    Ok(render_snapshot(&snapshot, format))
                }
                Command::Next => {
                    let value = store.next_value().await?;
                    Ok(render_value(value, format))
                }
                Command::Snapshot { consistent } => {
                    let snapshot = if consistent {
                        store.consistent_snapshot().await?
                    } else {
                        store.snapshot().await?
                    };
                    Ok(render_snapshot(&snapshot, format))
                }
                Command::Rows => {
                    let rows = store.rows().await?;
                    Ok(render_rows(&rows, format))
                }
            }
        })
    })
    .await
}

#[tokio::main]
async fn main() {
    telemetry::init_tracing();

    let args = Args::parse();

    let env = match args.env {
        Env::Prod => RuntimeEnv::Prod,
        Env::Test => RuntimeEnv::Test,
    };

    let db_kind = match args.db {
        Db::Postgres => DbKind::Postgres,
        Db::Mysql => DbKind::MySql,
        Db::SqliteFile => DbKind::SqliteFile,
        Db::SqliteMemory => DbKind::SqliteMemory,
    };

    let format = match args.format {
        Format::Text => OutputFormat::Text,
        Format::Html => OutputFormat::Html,
        Format::Json => OutputFormat::Json,
    };

    let spec = match db_kind {
        DbKind::SqliteMemory if env == RuntimeEnv::Test => Ok(ConnSpec::sqlite_memory()),
        _ => ConnSpec::from_env(env, db_kind),
    };

    let result = match spec {
        Ok(spec) => execute(spec, args.command.unwrap_or(Command::Run), format).await,
        Err(e) => Err(CounterError::from(e)),
    };

    match result {
        Ok(output) => {
            if !output.is_empty() {
                println!("{output}");
            }
        }
        Err(e) => {
            eprintln!("Database error: {e}");
            std::process::exit(1);
        }
    }
}
