//! Sync command

use std::path::Path;

use anyhow::Result;

use cashbacker_core::{AccountSyncOutcome, AppConfig, Database, SyncResult};

use super::build_engine;

pub async fn cmd_sync(
    db: &Database,
    config: &AppConfig,
    account_id: Option<i64>,
    user_id: Option<i64>,
    csv: Option<&Path>,
) -> Result<()> {
    let engine = build_engine(db, config, csv)?;
    let pipeline = engine.sync_pipeline();

    if let Some(account_id) = account_id {
        let result = pipeline.sync(account_id).await?;
        print_result(&result);
        return Ok(());
    }

    let outcomes = match user_id {
        Some(user_id) => pipeline.sync_user(user_id).await?,
        None => pipeline.sync_all().await?,
    };
    if outcomes.is_empty() {
        println!("No accounts to sync.");
        return Ok(());
    }
    for outcome in &outcomes {
        print_outcome(outcome);
    }

    let failed = outcomes.iter().filter(|o| !o.is_ok()).count();
    if failed > 0 {
        println!();
        println!("⚠️  {} of {} account(s) failed; retry later", failed, outcomes.len());
    }
    Ok(())
}

fn print_result(result: &SyncResult) {
    if result.throttled {
        println!(
            "⏳ Account {} synced recently; skipped (cool-down)",
            result.account_id
        );
        return;
    }
    println!(
        "✅ Account {}: {} new, {} already stored",
        result.account_id, result.transactions_added, result.duplicates_skipped
    );
}

fn print_outcome(outcome: &AccountSyncOutcome) {
    match (&outcome.result, &outcome.error) {
        (Some(result), _) => print_result(result),
        (None, Some(error)) => println!(
            "❌ Account {} ({}): {}",
            outcome.account_id, outcome.account_number, error
        ),
        (None, None) => {}
    }
}
