//! Server command implementation

use std::path::Path;

use anyhow::{Context, Result};

use cashbacker_core::{AppConfig, Database};
use cashbacker_server::{AppState, ServerConfig, API_KEYS_ENV};

use super::{account_directory, transaction_source};

pub async fn cmd_serve(
    db: Database,
    config: &AppConfig,
    host: &str,
    port: u16,
    no_auth: bool,
    csv: Option<&Path>,
) -> Result<()> {
    println!("🚀 Starting cashbacker web server...");
    println!("   Database: {}", db.path());
    println!("   Listening: http://{}:{}", host, port);

    let server_config = ServerConfig {
        require_auth: !no_auth,
        ..Default::default()
    }
    .with_env_api_keys();

    if no_auth {
        println!();
        println!("   ⚠️  Authentication DISABLED - do not expose to network!");
    } else {
        println!(
            "   🔑 API keys: {} configured ({})",
            server_config.api_keys.len(),
            API_KEYS_ENV
        );
    }
    println!();
    println!("   Press Ctrl+C to stop");

    // Idempotent
    db.seed_categories(&config.categories.catalog)
        .context("Failed to seed categories")?;

    let source = transaction_source(config, csv)?;
    let directory = account_directory(config);
    let state = AppState::from_config(db, config, source, directory, server_config)?;

    cashbacker_server::serve(state, host, port).await?;

    Ok(())
}
