// Loft Ledger - command line
// Database setup, users, CSV import and quick lookups without the server

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use loft_ledger::config::{init_tracing, load_config};
use loft_ledger::entities::{pigeon, user};
use loft_ledger::{import_csv, open_database};
use rusqlite::Connection;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "loft")]
#[command(about = "Record keeping for pigeon breeders")]
#[command(version)]
struct Cli {
    /// TOML config file
    #[arg(short, long, default_value = "loft.toml", env = "LOFT_CONFIG")]
    config: PathBuf,

    /// Database file (overrides the config)
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database and its tables
    Init,

    /// Register a user
    AddUser {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
    },

    /// Import pigeons from a CSV file
    Import {
        /// Owner of the imported pigeons
        #[arg(short, long)]
        user: i64,
        file: PathBuf,
    },

    /// Print a pigeon's pedigree as JSON
    Pedigree {
        #[arg(short, long)]
        user: i64,
        pigeon_id: i64,
    },

    /// Look a ring number up among a user's pigeons
    CheckRing {
        #[arg(short, long)]
        user: i64,
        ring_number: String,
        /// Pigeon being edited
        #[arg(long)]
        exclude: Option<i64>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(Some(cli.config.as_path()))
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    init_tracing(&config);

    let db_path = cli.db.clone().unwrap_or_else(|| PathBuf::from(&config.database.path));
    let conn = open_database(&db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;

    match cli.command {
        Command::Init => {
            println!("✓ Database ready: {}", db_path.display());
        }
        Command::AddUser { name, email } => {
            let created = user::create_user(&conn, &name, &email)?;
            println!("✓ User #{} created ({})", created.id, created.email);
        }
        Command::Import { user, file } => {
            require_user(&conn, user)?;
            let report = import_csv(&conn, user, &file)
                .with_context(|| format!("Failed to import {}", file.display()))?;
            println!("📂 {}", file.display());
            println!("✓ Inserted:   {}", report.inserted);
            println!("✓ Duplicates: {}", report.duplicates);
            println!("✗ Rejected:   {}", report.rejected.len());
            for row in &report.rejected {
                for (field, message) in &row.errors {
                    println!("   line {}: {} - {}", row.line, field, message);
                }
            }
        }
        Command::Pedigree { user, pigeon_id } => {
            require_user(&conn, user)?;
            print_json(&pigeon::pedigree(&conn, user, pigeon_id)?)?;
        }
        Command::CheckRing {
            user,
            ring_number,
            exclude,
        } => {
            require_user(&conn, user)?;
            print_json(&pigeon::check_ring_number(&conn, user, &ring_number, exclude)?)?;
        }
    }

    Ok(())
}

fn require_user(conn: &Connection, id: i64) -> Result<()> {
    if user::get_user(conn, id)?.is_none() {
        bail!("No user with id {}", id);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
