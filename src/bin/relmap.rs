//! relmap: database maintenance CLI
//!
//! # Usage
//!
//! ```bash
//! # Print the audit-log DDL for an engine
//! relmap ddl --dialect postgres
//!
//! # Check the configured connection
//! relmap status
//!
//! # Create the audit-log table and procedures
//! relmap --url mysql://root@localhost/app bootstrap
//!
//! # Latest audit-log entries of one table
//! relmap log --table User --limit 5
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use relmap::bootstrap;
use relmap::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relmap")]
#[command(version)]
#[command(about = "Schema and connection tooling for relmap", long_about = None)]
#[command(after_help = "EXAMPLES:
    relmap ddl --dialect mysql
    relmap --url postgres://app@localhost/app tables
    relmap bootstrap --dry-run
    relmap log --format json")]
struct Cli {
    /// Database connection URL (overrides relmap.toml)
    #[arg(long, env = "RELMAP_DATABASE_URL", global = true)]
    url: Option<String>,

    /// Log every statement
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the audit-log DDL without connecting
    Ddl {
        #[arg(short, long, default_value = "postgres")]
        dialect: Dialect,
    },
    /// Connect and print the server description
    Status,
    /// List the tables of the configured database
    Tables {
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Create the audit-log table and its procedures
    Bootstrap {
        /// Print the statements instead of running them
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the most recently modified audit-log entries
    Log {
        /// Only entries of this table
        #[arg(short, long)]
        table: Option<String>,
        #[arg(short, long, default_value_t = 20)]
        limit: u64,
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(&cli) {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "relmap=debug" } else { "relmap=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Ddl { dialect } => print_ddl(*dialect),
        Commands::Status => {
            let mut conn = connect(cli)?;
            let status = conn.status()?;
            println!("{} {}", "✓".green(), status);
            conn.close()?;
            Ok(())
        }
        Commands::Tables { format } => {
            let mut conn = connect(cli)?;
            let mut tables = conn.list_tables()?;
            tables.sort();
            match format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&tables)?),
                OutputFormat::Text if tables.is_empty() => println!("{}", "(no tables)".dimmed()),
                OutputFormat::Text => {
                    for table in &tables {
                        println!("{}", table);
                    }
                }
            }
            Ok(())
        }
        Commands::Bootstrap { dry_run } => {
            if *dry_run {
                let config = load_config(cli)?;
                return print_ddl(config.kind);
            }
            let mut conn = connect(cli)?;
            run_bootstrap(&mut conn)
        }
        Commands::Log { table, limit, format } => {
            let mut conn = connect(cli)?;
            print_log(&mut conn, table.as_deref(), *limit, *format)
        }
    }
}

fn load_config(cli: &Cli) -> Result<ConnectionConfig> {
    let config = match &cli.url {
        Some(url) => ConnectionConfig::from_url(url)?,
        None => ConnectionConfig::load()?,
    };
    Ok(config.log_queries(cli.verbose))
}

fn connect(cli: &Cli) -> Result<Connection> {
    let config = load_config(cli)?;
    Connection::open(&config)
        .with_context(|| format!("connecting to {} at {}", config.kind, config.host))
}

fn print_ddl(dialect: Dialect) -> Result<()> {
    for line in ddl_lines(dialect)? {
        println!("{}", line);
    }
    Ok(())
}

/// Audit-log statements, each terminated by exactly one `;`.
fn ddl_lines(dialect: Dialect) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    for query in bootstrap::entity_log_queries() {
        let stmt = query.compile(dialect)?;
        for sql in stmt.setup.iter().chain([&stmt.sql]) {
            lines.push(format!("{};", sql.trim_end().trim_end_matches(';')));
        }
    }
    Ok(lines)
}

fn run_bootstrap(conn: &mut Connection) -> Result<()> {
    if conn.table_exists(bootstrap::ENTITY_LOG_TABLE)? {
        println!(
            "{} {} already exists",
            "•".yellow(),
            bootstrap::ENTITY_LOG_TABLE.cyan()
        );
        return Ok(());
    }

    conn.start_transaction()?;
    for query in bootstrap::entity_log_queries() {
        let kind = query.kind();
        if let Err(e) = conn.execute(query) {
            conn.rollback().context("rolling back after a failed bootstrap")?;
            return Err(e).with_context(|| format!("bootstrap failed on {}", kind));
        }
    }
    conn.commit()?;
    println!(
        "{} created {} and its procedures",
        "✓".green(),
        bootstrap::ENTITY_LOG_TABLE.cyan()
    );
    Ok(())
}

fn print_log(conn: &mut Connection, table: Option<&str>, limit: u64, format: OutputFormat) -> Result<()> {
    let mut select = Select::new(["table_name", "entity_id", "last_modified", "lifetime"])
        .from(bootstrap::ENTITY_LOG_TABLE);
    if let Some(table) = table {
        select = select.where_eq("table_name", table);
    }
    let rows = conn.fetch_all(select.order_by("last_modified").descending().limit(limit))?;

    match format {
        OutputFormat::Json => {
            let rows: Vec<serde_json::Value> = rows.iter().map(Row::to_json).collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        OutputFormat::Text if rows.is_empty() => println!("{}", "(no entries)".dimmed()),
        OutputFormat::Text => {
            for row in &rows {
                let text = |name: &str| row.get(name).and_then(|v| v.to_text()).unwrap_or_default();
                println!(
                    "{} #{} {} {}",
                    text("table_name").cyan(),
                    text("entity_id"),
                    text("last_modified").dimmed(),
                    format!("({} days)", text("lifetime")).dimmed()
                );
            }
        }
    }
    Ok(())
}
