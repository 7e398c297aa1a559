//! Background sync scheduler
//!
//! Optional periodic sync of every account, enabled via environment:
//!
//! - `CASHBACKER_SYNC_SCHEDULE`: interval in minutes (e.g. "60" for hourly)
//!
//! Each tick runs `sync_all`; accounts synced recently are throttled by the
//! pipeline's cool-down, so a short interval stays cheap.

use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info, warn};

use cashbacker_core::{AccountSyncOutcome, Database, SyncPipeline};

/// Environment variable holding the interval in minutes
pub const SYNC_SCHEDULE_ENV: &str = "CASHBACKER_SYNC_SCHEDULE";

/// Longest accepted interval (30 days)
const MAX_INTERVAL_MINUTES: u64 = 30 * 24 * 60;

/// Configuration for scheduled syncs
#[derive(Debug, Clone)]
pub struct SyncScheduleConfig {
    pub interval_minutes: u64,
}

impl SyncScheduleConfig {
    /// Returns None if scheduling is not configured or set to 0
    pub fn from_env() -> Option<Self> {
        Self::parse(&std::env::var(SYNC_SCHEDULE_ENV).ok()?)
    }

    fn parse(value: &str) -> Option<Self> {
        let interval_minutes: u64 = match value.trim().parse() {
            Ok(n) => n,
            Err(_) => {
                warn!(value, "Invalid {}, scheduled sync disabled", SYNC_SCHEDULE_ENV);
                return None;
            }
        };

        if interval_minutes == 0 {
            warn!("{} is 0, scheduled sync disabled", SYNC_SCHEDULE_ENV);
            return None;
        }

        if interval_minutes > MAX_INTERVAL_MINUTES {
            warn!(
                interval_minutes,
                "{} exceeds {} minutes, scheduled sync disabled",
                SYNC_SCHEDULE_ENV,
                MAX_INTERVAL_MINUTES
            );
            return None;
        }

        Some(Self { interval_minutes })
    }

    fn period(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.saturating_mul(60))
    }
}

/// Spawn the scheduler; it runs until the process exits
pub fn start_sync_scheduler(db: Database, pipeline: SyncPipeline, config: SyncScheduleConfig) {
    info!(
        "Starting sync scheduler: every {} minutes",
        config.interval_minutes
    );

    tokio::spawn(async move {
        let mut ticker = interval(config.period());

        // Skip the first immediate tick
        ticker.tick().await;

        loop {
            ticker.tick().await;
            run_scheduled_sync(&db, &pipeline).await;
        }
    });
}

async fn run_scheduled_sync(db: &Database, pipeline: &SyncPipeline) {
    let outcomes = match pipeline.sync_all().await {
        Ok(outcomes) => outcomes,
        Err(e) => {
            error!("Scheduled sync failed: {}", e);
            return;
        }
    };

    let summary = summarize(&outcomes);
    info!(
        accounts = outcomes.len(),
        added = summary.added,
        throttled = summary.throttled,
        failed = summary.failed,
        "Scheduled sync finished"
    );

    if let Err(e) = db.log_audit(
        "scheduler",
        "sync_scheduled",
        Some("account"),
        None,
        Some(&format!(
            "accounts={}, added={}, failed={}",
            outcomes.len(),
            summary.added,
            summary.failed
        )),
    ) {
        warn!("Failed to log scheduled sync to audit: {}", e);
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
struct SyncSummary {
    added: usize,
    throttled: usize,
    failed: usize,
}

fn summarize(outcomes: &[AccountSyncOutcome]) -> SyncSummary {
    outcomes
        .iter()
        .fold(SyncSummary::default(), |mut acc, outcome| {
            match &outcome.result {
                Some(r) if r.throttled => acc.throttled += 1,
                Some(r) => acc.added += r.transactions_added,
                None => acc.failed += 1,
            }
            acc
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use cashbacker_core::SyncResult;

    #[test]
    fn test_parse_schedule() {
        assert_eq!(SyncScheduleConfig::parse("15").unwrap().interval_minutes, 15);
        assert!(SyncScheduleConfig::parse("0").is_none());
        assert!(SyncScheduleConfig::parse("hourly").is_none());
    }

    #[test]
    fn test_parse_schedule_rejects_huge_interval() {
        let month = SyncScheduleConfig::parse("43200").unwrap();
        assert_eq!(month.period(), Duration::from_secs(43200 * 60));

        assert!(SyncScheduleConfig::parse("43201").is_none());
        assert!(SyncScheduleConfig::parse(&u64::MAX.to_string()).is_none());
    }

    #[test]
    fn test_summarize() {
        let ok = |added, throttled| AccountSyncOutcome {
            account_id: 1,
            account_number: "1".to_string(),
            result: Some(SyncResult {
                account_id: 1,
                transactions_added: added,
                duplicates_skipped: 0,
                throttled,
                watermark: None,
            }),
            error: None,
        };
        let failed = AccountSyncOutcome {
            account_id: 2,
            account_number: "2".to_string(),
            result: None,
            error: Some("down".to_string()),
        };

        let summary = summarize(&[ok(3, false), ok(0, true), failed]);
        assert_eq!(
            summary,
            SyncSummary {
                added: 3,
                throttled: 1,
                failed: 1
            }
        );
    }
}
