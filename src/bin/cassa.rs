//! cassa: recipe tooling for wide-column stores
//!
//! # Usage
//!
//! ```bash
//! # Print the CREATE statements behind a schema file
//! cassa schema tables.toml --if-not-exists
//!
//! # Where does a timestamp land with hourly buckets?
//! cassa bucket 2024-01-01T00:50:00Z --size 1h
//!
//! # Break a statement into its parts
//! cassa explain "SELECT id FROM app.t WHERE k = ? LIMIT 5"
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::*;
use tracing_subscriber::EnvFilter;

use cassa::parser::{Cql, Term};
use cassa::prelude::*;

#[derive(Parser)]
#[command(name = "cassa")]
#[command(version)]
#[command(about = "Denormalization recipes for wide-column stores", long_about = None)]
#[command(after_help = "EXAMPLES:
    cassa schema tables.toml
    cassa schema tables.toml --if-not-exists --check
    cassa bucket 2024-01-01T00:50:00Z --size 1h")]
struct Cli {
    /// Config file (defaults to <config dir>/cassa/config.toml)
    #[arg(long, global = true, env = "CASSA_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the physical tables of every recipe in a schema file
    Schema {
        file: PathBuf,

        /// Guard every statement with IF NOT EXISTS
        #[arg(long)]
        if_not_exists: bool,

        /// Also run the statements against an in-memory store
        #[arg(long)]
        check: bool,
    },
    /// Show the bucket of a timestamp and its neighbours
    Bucket {
        /// RFC 3339 timestamp
        time: String,

        /// Bucket size, e.g. 1h, 30m, 1d
        #[arg(short, long)]
        size: String,
    },
    /// Parse a CQL statement and explain it
    Explain { cql: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("cassa=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    if let Err(e) = run(&cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Schema {
            file,
            if_not_exists,
            check,
        } => print_schema(cli, file, *if_not_exists, *check).await,
        Commands::Bucket { time, size } => show_bucket(time, size),
        Commands::Explain { cql } => explain(cql),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    match &cli.config {
        Some(path) => Config::load(path).with_context(|| format!("reading {}", path.display())),
        None => match Config::default_path().filter(|p| p.exists()) {
            Some(path) => Config::load(&path).with_context(|| format!("reading {}", path.display())),
            None => Ok(Config::default()),
        },
    }
}

async fn print_schema(cli: &Cli, file: &Path, if_not_exists: bool, check: bool) -> anyhow::Result<()> {
    let config = load_config(cli)?;
    let schema = SchemaFile::load(file).with_context(|| format!("loading {}", file.display()))?;
    let name = schema.keyspace.clone().unwrap_or_else(|| config.keyspace.clone());

    let ks = KeySpace::new(name, Arc::new(MemoryStore::new()))
        .debug(config.debug)
        .with_defaults(config.defaults.to_options());
    let tables = schema.build(&ks)?;

    for table in &tables {
        println!("{} {}", "--".dimmed(), table.name().cyan().bold());
        let cql = if if_not_exists {
            table.create_if_not_exist_statement()?
        } else {
            table.create_statement()?
        };
        for line in cql.lines() {
            println!("{};", line);
        }
        println!();
    }

    if check {
        for table in &tables {
            if if_not_exists {
                table.create_if_not_exist().await?;
            } else {
                table.create().await?;
            }
        }
        let created = ks.tables().await?;
        println!(
            "{} {} physical table(s) created in keyspace {}",
            "✓".green(),
            created.len(),
            ks.name().cyan()
        );
    }
    Ok(())
}

fn show_bucket(time: &str, size: &str) -> anyhow::Result<()> {
    let t: DateTime<Utc> = DateTime::parse_from_rfc3339(time)
        .with_context(|| format!("'{}' is not an RFC 3339 timestamp", time))?
        .with_timezone(&Utc);
    let bucketer: FixedBucketer = size.parse()?;
    let bucket = bucketer.bucket(t);

    println!("{} {}", "Bucketer:".dimmed(), bucketer.name().yellow());
    println!("{} {}", "Previous:".dimmed(), bucketer.prev(t).to_rfc3339());
    println!("{} {}", "Bucket:".green().bold(), bucket.to_rfc3339().white().bold());
    println!("{} {}", "Next:".dimmed(), bucketer.next(t).to_rfc3339());
    Ok(())
}

fn term(t: &Term) -> String {
    match t {
        Term::Param => "?".yellow().to_string(),
        Term::Literal(v) => v.to_string(),
    }
}

fn explain(cql: &str) -> anyhow::Result<()> {
    let parsed = cassa::parser::parse_statement(cql)?;
    println!("{}", "Parsed statement:".green().bold());
    match parsed {
        Cql::Select {
            columns,
            target,
            conditions,
            limit,
            allow_filtering,
        } => {
            println!("  {} SELECT", "Verb:".cyan());
            println!("  {} {}", "Table:".cyan(), target.table.white());
            match columns {
                Some(cols) => println!("  {} {}", "Columns:".cyan(), cols.join(", ")),
                None => println!("  {} *", "Columns:".cyan()),
            }
            for c in &conditions {
                let terms: Vec<String> = c.terms.iter().map(term).collect();
                if c.rest.is_empty() {
                    println!("  {} {} {} {}", "Where:".cyan(), c.field, c.op.symbol(), terms.join(", "));
                } else {
                    println!(
                        "  {} ({}, {}) {} ({})",
                        "Where:".cyan(),
                        c.field,
                        c.rest.join(", "),
                        c.op.symbol(),
                        terms.join(", ")
                    );
                }
            }
            if let Some(n) = limit {
                println!("  {} {}", "Limit:".cyan(), n);
            }
            if allow_filtering {
                println!("  {} yes", "Filtering:".cyan());
            }
        }
        Cql::Insert { target, columns, using, .. } => {
            println!("  {} INSERT", "Verb:".cyan());
            println!("  {} {}", "Table:".cyan(), target.table.white());
            println!("  {} {}", "Columns:".cyan(), columns.join(", "));
            if let Some(ttl) = using.ttl {
                println!("  {} {}s", "TTL:".cyan(), ttl);
            }
        }
        Cql::Update {
            target,
            assignments,
            conditions,
            ..
        } => {
            println!("  {} UPDATE", "Verb:".cyan());
            println!("  {} {}", "Table:".cyan(), target.table.white());
            let fields: Vec<&str> = assignments.iter().map(|(f, _)| f.as_str()).collect();
            println!("  {} {}", "Sets:".cyan(), fields.join(", "));
            println!("  {} {} relation(s)", "Where:".cyan(), conditions.len());
        }
        Cql::Delete { target, conditions, .. } => {
            println!("  {} DELETE", "Verb:".cyan());
            println!("  {} {}", "Table:".cyan(), target.table.white());
            println!("  {} {} relation(s)", "Where:".cyan(), conditions.len());
        }
        Cql::CreateTable {
            target,
            columns,
            partition,
            clustering,
            ..
        } => {
            println!("  {} CREATE TABLE", "Verb:".cyan());
            println!("  {} {}", "Table:".cyan(), target.table.white());
            println!("  {} {}", "Columns:".cyan(), columns.len());
            println!("  {} {}", "Partition:".cyan(), partition.join(", "));
            println!("  {} {}", "Clustering:".cyan(), clustering.join(", "));
        }
        Cql::DropTable { target, .. } => {
            println!("  {} DROP TABLE", "Verb:".cyan());
            println!("  {} {}", "Table:".cyan(), target.table.white());
        }
    }
    Ok(())
}
