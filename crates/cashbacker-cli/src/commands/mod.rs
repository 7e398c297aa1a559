//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Shared utilities (open_db, config, collaborators) and init
//! - `users` - Register users, add accounts, account overview
//! - `sync` - Transaction sync
//! - `cashback` - Propose, choose, show and reset monthly cashback
//! - `transactions` - Stored transaction listings
//! - `limits` - Spending limits and the category catalog
//! - `serve` - Web server command

pub mod cashback;
pub mod core;
pub mod limits;
pub mod serve;
pub mod sync;
pub mod transactions;
pub mod users;

// Re-export command functions for main.rs
pub use cashback::*;
pub use core::*;
pub use limits::*;
pub use serve::*;
pub use sync::*;
pub use transactions::*;
pub use users::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
