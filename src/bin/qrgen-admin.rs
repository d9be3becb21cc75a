use anyhow::Result;
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use qrgen::config::DatabaseConfig;
use qrgen::models::QrRecordWithViews;
use qrgen::storage;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qrgen-admin")]
#[command(about = "QR record management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the active QR codes of one owner
    List {
        /// Owner identifier (sub claim from JWT)
        owner_id: String,
    },
    /// List active QR codes across all owners
    ListAll {
        #[arg(long, default_value_t = 50)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    /// Soft-delete a QR code by owner and static image URL
    Delete {
        owner_id: String,
        image_uri: String,
    },
    /// Show the view count and recent accesses of a tracking code
    Stats {
        tracking_code: String,
        /// Number of recent accesses to print
        #[arg(long, default_value_t = 10)]
        recent: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let database = DatabaseConfig::from_env()?;
    let storage = storage::connect(&database).await?;

    match cli.command {
        Commands::List { owner_id } => {
            let records = storage.list_active(&owner_id).await?;
            print_records(&records);
        }
        Commands::ListAll { limit, offset } => {
            let records = storage.list_all_active(limit, offset).await?;
            print_records(&records);
        }
        Commands::Delete {
            owner_id,
            image_uri,
        } => {
            if storage.soft_delete(&owner_id, &image_uri).await? {
                println!("✓ Deleted QR code '{}' of owner '{}'", image_uri, owner_id);
            } else {
                println!(
                    "⚠ No active QR code '{}' found for owner '{}'",
                    image_uri, owner_id
                );
            }
        }
        Commands::Stats {
            tracking_code,
            recent,
        } => {
            let views = storage.view_count(&tracking_code).await?;
            match storage.get_active_by_code(&tracking_code).await? {
                Some(record) => println!(
                    "{} -> {} (owner '{}')",
                    tracking_code, record.destination_url, record.owner_id
                ),
                None => println!("{} (not active)", tracking_code),
            }
            println!("Views: {}", views);

            let entries = storage.access_log(&tracking_code, recent).await?;
            if !entries.is_empty() {
                println!("Recent accesses:");
                for entry in entries {
                    println!("  {}", format_millis(entry.accessed_at));
                }
            }
        }
    }

    Ok(())
}

fn print_records(records: &[QrRecordWithViews]) {
    if records.is_empty() {
        println!("No active QR codes found.");
        return;
    }

    println!(
        "{:<16} {:<24} {:>7} {:<20} {}",
        "Code", "Owner", "Views", "Created", "Destination"
    );
    println!("{}", "-".repeat(100));
    for row in records {
        let record = &row.record;
        println!(
            "{:<16} {:<24} {:>7} {:<20} {}",
            record.tracking_code.as_deref().unwrap_or("-"),
            record.owner_id,
            row.view_count,
            format_millis(record.created_at),
            record.destination_url
        );
    }
}

fn format_millis(millis: i64) -> String {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| millis.to_string())
}
