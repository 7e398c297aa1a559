//! Transaction command implementations

use anyhow::{bail, Result};
use cashbacker_core::{Database, Transaction};

use super::{resolve_month, truncate};

pub fn cmd_transactions(
    db: &Database,
    account_id: Option<i64>,
    user_id: Option<i64>,
    month: Option<&str>,
    limit: i64,
) -> Result<()> {
    match (account_id, user_id) {
        (Some(account_id), _) => {
            db.require_account(account_id)?;
            let transactions = db.list_account_transactions(account_id, limit.max(1))?;
            if transactions.is_empty() {
                println!("No transactions found. Pull some with:");
                println!("  cashbacker sync --account {}", account_id);
                return Ok(());
            }
            println!();
            println!("📝 Recent Transactions (account {})", account_id);
            println!("   ─────────────────────────────────────────────────────────────");
            print_transactions(&transactions);
        }
        (None, Some(user_id)) => {
            let month = resolve_month(month)?;
            let accounts = db.user_transactions_for_month(user_id, month)?;
            for account in accounts {
                println!();
                println!(
                    "📝 {} ({}) - {}",
                    account.account_number,
                    account.bank,
                    month.format("%Y-%m")
                );
                println!("   ─────────────────────────────────────────────────────────────");
                if account.transactions.is_empty() {
                    println!("   (none)");
                }
                print_transactions(&account.transactions);
            }
        }
        (None, None) => bail!("Pass --account or --user"),
    }
    Ok(())
}

fn print_transactions(transactions: &[Transaction]) {
    for tx in transactions {
        let amount_str = if tx.amount < 0 {
            format!("\x1b[31m{:>8}\x1b[0m", tx.amount) // Red for spending
        } else {
            format!("\x1b[32m{:>+8}\x1b[0m", tx.amount)
        };
        println!(
            "   {} │ {} │ {:<12} │ {}",
            tx.time.format("%Y-%m-%d %H:%M"),
            amount_str,
            tx.category.as_deref().unwrap_or("-"),
            truncate(&tx.description, 40)
        );
    }
}
