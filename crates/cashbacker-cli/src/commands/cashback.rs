//! Cashback commands: propose, choose, show and reset

use std::path::Path;

use anyhow::{bail, Context, Result};
use cashbacker_core::{AppConfig, CashbackOffer, Database, MonthCashbacks, Proposal};

use super::{build_allocator, build_engine, resolve_month};

/// Parse a `category:percent` pair
pub fn parse_pick(pick: &str) -> Result<CashbackOffer> {
    let Some((category, value)) = pick.rsplit_once(':') else {
        bail!("Expected category:percent, got '{}'", pick);
    };
    let category = category.trim();
    if category.is_empty() {
        bail!("Missing category in '{}'", pick);
    }
    let value: i64 = value
        .trim()
        .parse()
        .with_context(|| format!("Invalid percent in '{}'", pick))?;
    Ok(CashbackOffer::new(category, value))
}

pub async fn cmd_cashback_propose(
    db: &Database,
    config: &AppConfig,
    account_id: i64,
    month: Option<&str>,
    no_sync: bool,
    csv: Option<&Path>,
) -> Result<()> {
    let month = resolve_month(month)?;

    let proposal = if no_sync {
        build_allocator(db, config).propose(account_id, month).await?
    } else {
        let engine = build_engine(db, config, csv)?;
        let result = engine.sync_and_propose(account_id, month).await?;
        if !result.sync.throttled {
            println!(
                "   Synced {} new transaction(s)",
                result.sync.transactions_added
            );
        }
        result.proposal
    };

    if proposal.created {
        db.log_audit(
            "cli",
            "propose",
            Some("cashback"),
            Some(account_id),
            Some(&format!("month={}, categories={}", month, proposal.cashbacks.len())),
        )?;
    }
    print_proposal(&proposal);
    Ok(())
}

fn print_proposal(proposal: &Proposal) {
    println!();
    println!(
        "💳 Cashback for {} ({}) - {}",
        proposal.account_number,
        proposal.bank,
        proposal.month.format("%Y-%m")
    );
    println!("   ─────────────────────────────────────────────────────────────");
    if proposal.cashbacks.is_empty() {
        println!("   Not enough spending history to propose categories yet.");
        return;
    }
    for offer in &proposal.cashbacks {
        println!("   {:<15} {:>3}%", offer.product_type, offer.value);
    }
    println!();
    if !proposal.created {
        println!("   (existing proposal)");
    }
    println!(
        "   Choose with: cashbacker cashback choose {} --month {} --pick {}:{}",
        proposal.account_id,
        proposal.month.format("%Y-%m"),
        proposal.cashbacks[0].product_type,
        proposal.cashbacks[0].value
    );
}

pub fn cmd_cashback_choose(
    db: &Database,
    config: &AppConfig,
    account_id: i64,
    month: &str,
    picks: &[String],
) -> Result<()> {
    let month = resolve_month(Some(month))?;
    let selections = picks
        .iter()
        .map(|p| parse_pick(p))
        .collect::<Result<Vec<_>>>()?;

    let result = build_allocator(db, config).choose(account_id, month, &selections)?;

    db.log_audit(
        "cli",
        "choose",
        Some("cashback"),
        Some(account_id),
        Some(&format!("month={}, chosen={}", month, picks.join(","))),
    )?;

    println!("✅ Cashback chosen");
    print_month(&result);
    Ok(())
}

pub fn cmd_cashback_show(
    db: &Database,
    config: &AppConfig,
    account_id: i64,
    month: Option<&str>,
) -> Result<()> {
    let month = resolve_month(month)?;
    let result = build_allocator(db, config).month_cashbacks(account_id, month)?;
    print_month(&result);
    Ok(())
}

fn print_month(month: &MonthCashbacks) {
    println!();
    println!(
        "💳 Account {} - {} ({})",
        month.account_id,
        month.month.format("%Y-%m"),
        month.state
    );
    println!("   ─────────────────────────────────────────────────────────────");
    for row in &month.cashbacks {
        let mark = if row.committed { "✔" } else { " " };
        println!("   {} {:<15} {:>3}%", mark, row.product_type, row.value);
    }
}

pub fn cmd_cashback_reset(
    db: &Database,
    config: &AppConfig,
    account_id: i64,
    yes: bool,
) -> Result<()> {
    if !yes {
        bail!("This deletes every cashback of account {}; pass --yes to confirm", account_id);
    }
    let deleted = build_allocator(db, config).reset(account_id)?;
    db.log_audit(
        "cli",
        "reset",
        Some("cashback"),
        Some(account_id),
        Some(&format!("deleted={}", deleted)),
    )?;
    println!("✅ Deleted {} cashback row(s)", deleted);
    Ok(())
}
