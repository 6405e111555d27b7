use sqlx::Row;
use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use sqlx::SqlitePool;
use uuid::Uuid;

use soluly::authz::{builtin_templates, Action, Resource, SqliteRoleStore};
use soluly::config::AppConfig;
use soluly::jwt::JwtConfig;

#[derive(Parser, Debug)]
#[command(author, version, about = "soluly admin tool", long_about = None)]
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
    /// Create the built-in system roles for an organization
    SeedRoles {
        #[arg(long)]
        organization: Uuid,
    },
    /// Print the built-in role templates
    Templates,
    /// Mint a bearer token for an auth user id (local testing)
    MintToken {
        #[arg(long)]
        user: Uuid,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        let crate_env = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(crate_env);
    }

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
        Commands::SeedRoles { organization } => {
            let pool = get_pool().await?;
            let store = SqliteRoleStore::new(pool);
            let created = store.seed_system_roles(organization).await?;
            if created.is_empty() {
                println!("Organization {} already has system roles", organization);
            }
            for role in created {
                println!("Created system role {} ({})", role.name, role.id);
            }
        }
        Commands::Templates => print_templates(),
        Commands::MintToken { user } => {
            let jwt = JwtConfig::from_env()?;
            println!("{}", jwt.encode(user)?);
        }
    }

    Ok(())
}

async fn get_pool() -> anyhow::Result<SqlitePool> {
    let config = AppConfig::from_env()?;
    soluly::db::connect(&config.database_url).await
}

async fn print_status(pool: &SqlitePool, migrator: &sqlx::migrate::Migrator) -> anyhow::Result<()> {
    let has_table: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' AND name='_sqlx_migrations'")
            .fetch_optional(pool)
            .await?;
    let applied_versions: HashSet<i64> = if has_table.is_some() {
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
        let name = if desc.is_empty() { "unknown" } else { desc };
        println!("{:<8} {:<20} {}", status, migration.version, name);
    }

    Ok(())
}

fn print_templates() {
    for template in builtin_templates() {
        let scope = match template.project_scope.allowed_ids() {
            None => "all projects".to_string(),
            Some(ids) => format!("{} project(s)", ids.len()),
        };
        println!("{:<12} {:<12} {}", template.key, template.name, scope);
        for resource in Resource::ALL {
            let grants: Vec<String> = resource
                .actions()
                .iter()
                .map(|&action: &Action| format!("{}={}", action, template.permissions.get(resource, action).to_json()))
                .collect();
            println!("    {:<11} {}", resource, grants.join(" "));
        }
    }
}

async fn get_migrator() -> anyhow::Result<sqlx::migrate::Migrator> {
    // ./migrations when run from the repo root, else the crate-local folder.
    let local = Path::new("./migrations");
    let migrator_path = if local.exists() {
        local.to_path_buf()
    } else {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("migrations")
    };

    let migrator_path_display = migrator_path.display().to_string();
    sqlx::migrate::Migrator::new(migrator_path)
        .await
        .with_context(|| format!("failed to load migrations from {}", migrator_path_display))
}
