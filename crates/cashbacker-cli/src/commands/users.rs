//! User and account commands

use anyhow::Result;

use cashbacker_core::{AccountOnboarding, AppConfig, Database, NewUser};

use super::{account_directory, build_allocator, resolve_month};

pub async fn cmd_register(
    db: &Database,
    config: &AppConfig,
    external_id: &str,
    first_name: &str,
    surname: &str,
    month: Option<&str>,
) -> Result<()> {
    let month = resolve_month(month)?;
    let directory = account_directory(config);
    if directory.is_none() {
        println!("   💡 No bank API configured; creating the user without accounts");
        println!("      Add accounts with: cashbacker add-account --user <id> <number> --bank <bank>");
    }

    let onboarding = AccountOnboarding::new(db.clone(), directory, config.sync.timeout());
    let registered = onboarding
        .register(
            &NewUser {
                external_id: external_id.to_string(),
                first_name: first_name.to_string(),
                surname: surname.to_string(),
            },
            month,
        )
        .await?;

    db.log_audit(
        "cli",
        "register",
        Some("user"),
        Some(registered.user_id),
        Some(&format!("external_id={}", external_id)),
    )?;

    println!("✅ User {} registered (id {})", external_id, registered.user_id);
    for account in &registered.accounts {
        println!("   [{}] {} ({})", account.id, account.number, account.bank);
    }

    Ok(())
}

pub fn cmd_add_account(
    db: &Database,
    config: &AppConfig,
    user_id: i64,
    number: &str,
    bank: &str,
    cards: &[String],
) -> Result<()> {
    let onboarding = AccountOnboarding::new(db.clone(), None, config.sync.timeout());
    let cards: Vec<&str> = cards.iter().map(String::as_str).collect();
    let account = onboarding.add_account(user_id, number, bank, &cards)?;

    db.log_audit(
        "cli",
        "create",
        Some("account"),
        Some(account.id),
        Some(&format!("user_id={}, bank={}", user_id, account.bank)),
    )?;

    println!(
        "✅ Account {} added (id {}, {} card(s))",
        account.number,
        account.id,
        cards.len()
    );
    Ok(())
}

pub fn cmd_accounts(
    db: &Database,
    config: &AppConfig,
    user_id: Option<i64>,
    month: Option<&str>,
) -> Result<()> {
    let Some(user_id) = user_id else {
        let accounts = db.list_accounts()?;
        if accounts.is_empty() {
            println!("No accounts yet. Register a user with:");
            println!("  cashbacker register <external-id>");
            return Ok(());
        }
        println!();
        println!("🏦 Accounts");
        println!("   ─────────────────────────────────────────────────────────────");
        for account in accounts {
            let synced = account
                .last_tx_time
                .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "never".to_string());
            println!(
                "   [{:>3}] {} │ {:<15} │ user {} │ latest tx {}",
                account.id, account.number, account.bank, account.user_id, synced
            );
        }
        return Ok(());
    };

    let month = resolve_month(month)?;
    let overview = build_allocator(db, config).overview(user_id, month)?;

    println!();
    println!("🏦 Accounts of user {} ({})", user_id, month.format("%Y-%m"));
    println!("   ─────────────────────────────────────────────────────────────");
    for account in overview {
        let cashbacks = if account.cashbacks.is_empty() {
            "-".to_string()
        } else {
            account
                .cashbacks
                .iter()
                .map(|c| format!("{} {}%", c.product_type, c.value))
                .collect::<Vec<_>>()
                .join(", ")
        };
        println!(
            "   [{:>3}] {} │ {:<15} │ cards {} │ {}{}",
            account.account_id,
            account.account_number,
            account.bank,
            account.cards.join(" "),
            cashbacks,
            if account.can_choose_cashback { "" } else { " (no choice)" }
        );
    }
    Ok(())
}
