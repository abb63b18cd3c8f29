use sqlx::Row;
use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use uuid::Uuid;

use warden::authz::{compile_with_report, Action, PermissionStore, SqlitePermissionStore, Subject};

#[derive(Parser, Debug)]
#[command(author, version, about = "warden admin tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply pending migrations
    MigrateRun,
    /// Show migration status against the current database
    MigrateStatus,
    /// Compile a user's ability and print its rules, skipped records and an optional check
    Explain {
        #[arg(long)]
        user: Uuid,
        #[arg(long, requires = "subject")]
        action: Option<Action>,
        #[arg(long, requires = "action")]
        subject: Option<Subject>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::MigrateRun => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            migrator.run(&pool).await?;
            println!("Migrations applied");
        }
        Commands::MigrateStatus => {
            let pool = get_pool().await?;
            let migrator = get_migrator().await?;
            print_status(&pool, &migrator).await?;
        }
        Commands::Explain { user, action, subject } => {
            let pool = get_pool().await?;
            explain(&pool, user, action.zip(subject)).await?;
        }
    }

    Ok(())
}

async fn explain(pool: &SqlitePool, user_id: Uuid, check: Option<(Action, Subject)>) -> anyhow::Result<()> {
    let store = SqlitePermissionStore::new(pool.clone());
    let principal = store
        .find_principal(user_id)
        .await?
        .with_context(|| format!("user {user_id} not found"))?;

    let permissions = store
        .load_role(&principal)
        .await?
        .map(|role| role.permissions)
        .unwrap_or_default();

    let (ability, skipped) = compile_with_report(&permissions, &principal);

    let mut report = json!({
        "user_id": principal.id,
        "role": principal.role,
        "rules": ability.rules(),
        "skipped": skipped,
    });

    if let Some((action, subject)) = check {
        report["check"] = json!({
            "action": action,
            "subject": subject,
            "allowed": ability.can(action, subject, None),
            "fields": ability.fields_for(action, subject),
            "relevant_rules": ability.relevant_rules_for(action, subject),
        });
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL not set")?;
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to database")
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let has_table = sqlx::query("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
        .fetch_optional(pool)
        .await?
        .is_some();

    let applied_versions: HashSet<i64> = if has_table {
        let rows = sqlx::query("SELECT version FROM _sqlx_migrations WHERE success = 1")
            .fetch_all(pool)
            .await?;
        rows.iter().filter_map(|row| row.try_get::<i64, _>("version").ok()).collect()
    } else {
        HashSet::new()
    };

    println!("{:<8} {:<20} {}", "Status", "Version", "Name");
    for migration in migrator.iter() {
        let status = if applied_versions.contains(&migration.version) { "applied" } else { "pending" };
        let desc = migration.description.trim();
        println!("{:<8} {:<20} {}", status, migration.version, if desc.is_empty() { "unknown" } else { desc });
    }

    Ok(())
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // Prefer ./migrations when run from the repo root, else the crate-local folder.
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", display))
}
