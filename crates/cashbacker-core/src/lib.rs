//! Cashbacker Core Library
//!
//! Shared functionality for the cashbacker service:
//! - Encrypted SQLite storage and migrations
//! - Incremental, idempotent transaction sync with a cool-down throttle
//! - Monthly cashback allocation (propose, then choose once)
//! - Collaborator traits for the bank network, categorizer and recommender
//! - Configuration with embedded defaults and env overrides

pub mod cashback;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod external;
pub mod models;
pub mod month;
pub mod onboarding;
pub mod recommender;
pub mod sync;

/// Test utilities including a mock bank HTTP server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use cashback::CashbackAllocator;
pub use config::{AppConfig, CashbackConfig, CategorizerBackend, SyncConfig};
pub use db::{AuditEntry, Database, ProposalInsert, StoreResult, SyncClaim};
pub use engine::{CashbackEngine, SyncAndPropose};
pub use error::{Error, Result};
pub use external::{
    AccountDirectory, BankApiClient, Categorizer, CollaboratorError, CsvTransactionSource,
    HttpCategorizer, Recommender, RuleCategorizer, TransactionSource,
};
pub use models::*;
pub use onboarding::{AccountOnboarding, RegisteredUser};
pub use recommender::SpendingRecommender;
pub use sync::SyncPipeline;
