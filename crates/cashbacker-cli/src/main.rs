//! Cashbacker CLI - transaction sync and monthly cashback allocation
//!
//! Usage:
//!   cashbacker init                          Initialize database
//!   cashbacker register USER_ID              Register a user via the bank API
//!   cashbacker sync --account 1              Pull new transactions
//!   cashbacker cashback propose 1            Propose cashback for this month
//!   cashbacker serve --port 3000             Start web server

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    if let Commands::Init = cli.command {
        return commands::cmd_init(&cli.db, &config, cli.no_encrypt);
    }
    let db = commands::open_db(&cli.db, cli.no_encrypt)?;

    match cli.command {
        Commands::Init => Ok(()),
        Commands::Register {
            external_id,
            first_name,
            surname,
            month,
        } => {
            commands::cmd_register(
                &db,
                &config,
                &external_id,
                &first_name,
                &surname,
                month.as_deref(),
            )
            .await
        }
        Commands::AddAccount {
            user,
            number,
            bank,
            cards,
        } => commands::cmd_add_account(&db, &config, user, &number, &bank, &cards),
        Commands::Accounts { user, month } => {
            commands::cmd_accounts(&db, &config, user, month.as_deref())
        }
        Commands::Sync { account, user, csv } => {
            commands::cmd_sync(&db, &config, account, user, csv.as_deref()).await
        }
        Commands::Cashback { action } => match action {
            CashbackAction::Propose {
                account,
                month,
                no_sync,
                csv,
            } => {
                commands::cmd_cashback_propose(
                    &db,
                    &config,
                    account,
                    month.as_deref(),
                    no_sync,
                    csv.as_deref(),
                )
                .await
            }
            CashbackAction::Choose {
                account,
                month,
                picks,
            } => commands::cmd_cashback_choose(&db, &config, account, &month, &picks),
            CashbackAction::Show { account, month } => {
                commands::cmd_cashback_show(&db, &config, account, month.as_deref())
            }
            CashbackAction::Reset { account, yes } => {
                commands::cmd_cashback_reset(&db, &config, account, yes)
            }
        },
        Commands::Transactions {
            account,
            user,
            month,
            limit,
        } => commands::cmd_transactions(&db, account, user, month.as_deref(), limit),
        Commands::Limits { action } => match action {
            LimitsAction::Set {
                user,
                category,
                value,
            } => commands::cmd_limits_set(&db, user, &category, value),
            LimitsAction::List { user } => commands::cmd_limits_list(&db, user),
            LimitsAction::Remove { user, category } => {
                commands::cmd_limits_remove(&db, user, &category)
            }
            LimitsAction::Report { user, month } => {
                commands::cmd_limits_report(&db, user, month.as_deref())
            }
        },
        Commands::Categories => commands::cmd_categories(&db),
        Commands::Serve {
            port,
            host,
            no_auth,
            csv,
        } => commands::cmd_serve(db, &config, &host, port, no_auth, csv.as_deref()).await,
    }
}
