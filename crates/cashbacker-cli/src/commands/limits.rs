//! Spending limit and category catalog commands

use anyhow::{bail, Result};
use cashbacker_core::Database;

use super::resolve_month;

pub fn cmd_limits_set(db: &Database, user_id: i64, category: &str, value: i64) -> Result<()> {
    let id = db.set_category_limit(user_id, category, value)?;
    db.log_audit(
        "cli",
        "set",
        Some("category_limit"),
        Some(id),
        Some(&format!("user_id={}, category={}, value={}", user_id, category, value)),
    )?;
    println!("✅ Limit for '{}' set to {}", category.trim().to_lowercase(), value);
    Ok(())
}

pub fn cmd_limits_list(db: &Database, user_id: i64) -> Result<()> {
    let limits = db.list_category_limits(user_id)?;
    if limits.is_empty() {
        println!("No limits set for user {}.", user_id);
        return Ok(());
    }
    for limit in limits {
        println!("   {:<15} {:>10}", limit.category, limit.value);
    }
    Ok(())
}

pub fn cmd_limits_remove(db: &Database, user_id: i64, category: &str) -> Result<()> {
    if !db.delete_category_limit(user_id, category)? {
        bail!("No limit for category '{}'", category);
    }
    db.log_audit(
        "cli",
        "delete",
        Some("category_limit"),
        None,
        Some(&format!("user_id={}, category={}", user_id, category)),
    )?;
    println!("✅ Limit for '{}' removed", category);
    Ok(())
}

pub fn cmd_limits_report(db: &Database, user_id: i64, month: Option<&str>) -> Result<()> {
    let month = resolve_month(month)?;
    let report = db.limit_report(user_id, month)?;
    if report.is_empty() {
        println!("No limits set for user {}.", user_id);
        return Ok(());
    }

    println!();
    println!("📊 Spending vs limits ({})", month.format("%Y-%m"));
    println!("   ─────────────────────────────────────────────────────────────");
    for status in report {
        let marker = if status.is_exceeded() { "⚠️ " } else { "  " };
        println!(
            "   {}{:<15} spent {:>8} of {:>8} │ remaining {:>8}",
            marker, status.category, status.spent, status.limit, status.remaining
        );
    }
    Ok(())
}

pub fn cmd_categories(db: &Database) -> Result<()> {
    let categories = db.list_categories()?;
    if categories.is_empty() {
        println!("No categories. Seed the catalog with: cashbacker init");
        return Ok(());
    }
    for category in categories {
        println!("   {}", category.product_type);
    }
    Ok(())
}
