//! # Local Store Inspector
//!
//! Prints what the offline layer currently holds on this device.
//!
//! ## Usage
//! ```bash
//! # Inspect the default store location
//! cargo run -p praktikum-store --bin praktikum-inspect
//!
//! # Inspect a specific file
//! cargo run -p praktikum-store --bin praktikum-inspect -- --db ./praktikum.db
//!
//! # Verbose logging
//! RUST_LOG=praktikum=debug,sqlx=info cargo run -p praktikum-store --bin praktikum-inspect
//! ```
//!
//! ## Output
//! - Migration status
//! - Document count per collection
//! - Number of cache entries (`cache_*` metadata slots)
//! - Whether offline credentials / session exist and when they expire

use std::env;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use praktikum_core::{
    OfflineCredentialRecord, OfflineSessionRecord, CREDENTIALS_METADATA_KEY, SESSION_METADATA_KEY,
};
use praktikum_store::migrations::migration_status;
use praktikum_store::{Database, DbConfig, LocalStore};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,praktikum=info,sqlx=warn"));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("id", "praktikum", "offline")
        .map(|dirs| dirs.data_dir().join("praktikum.db"))
        .unwrap_or_else(|| PathBuf::from("./praktikum.db"))
}

fn format_ms(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| ms.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args: Vec<String> = env::args().collect();
    let mut db_path = default_db_path();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = PathBuf::from(&args[i + 1]);
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Praktikum Local Store Inspector");
                println!();
                println!("Usage: praktikum-inspect [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>    Database file path (default: platform data dir)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    if !db_path.exists() {
        println!("No local store at {}", db_path.display());
        return Ok(());
    }

    // Read-only inspection: never migrate someone else's store.
    let db = Database::new(DbConfig::new(&db_path).run_migrations(false)).await?;
    let now = Utc::now().timestamp_millis();

    println!("Local store: {}", db_path.display());
    println!("================================");

    let (total, applied) = migration_status(db.pool()).await?;
    println!("Migrations: {applied}/{total} applied");
    if applied < total {
        println!("  Store is behind; open it from the app to migrate.");
        return Ok(());
    }

    println!();
    println!("Collections:");
    let counts = db.documents().counts().await?;
    if counts.is_empty() {
        println!("  (empty)");
    }
    for (collection, count) in counts {
        println!("  {collection:<20} {count}");
    }

    println!();
    let cache_keys = db.metadata_keys("cache_").await?;
    println!("Cache entries: {}", cache_keys.len());

    println!();
    match db.get_metadata(CREDENTIALS_METADATA_KEY).await? {
        Some(raw) => match serde_json::from_value::<OfflineCredentialRecord>(raw) {
            Ok(record) => println!(
                "Offline credentials: {} (expires {}{})",
                record.email,
                format_ms(record.expires_at),
                if record.is_expired(now) { ", EXPIRED" } else { "" }
            ),
            Err(e) => println!("Offline credentials: unreadable ({e})"),
        },
        None => println!("Offline credentials: none"),
    }

    match db.get_metadata(SESSION_METADATA_KEY).await? {
        Some(raw) => match serde_json::from_value::<OfflineSessionRecord>(raw) {
            Ok(record) => println!(
                "Offline session: user {} (expires {}{})",
                record.id,
                format_ms(record.expires_at),
                if record.is_expired(now) { ", EXPIRED" } else { "" }
            ),
            Err(e) => println!("Offline session: unreadable ({e})"),
        },
        None => println!("Offline session: none"),
    }

    db.close().await;
    Ok(())
}
