//! Spending-based cashback recommender
//!
//! Ranks the categories an account spends in most often over the configured
//! history window and turns the ranking into cashback percentages: the top
//! category gets `max_percent`, the lowest-scored one `min_percent`, the rest
//! are interpolated linearly by score.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::config::{AppConfig, CashbackConfig};
use crate::db::Database;
use crate::external::{CollaboratorError, CollaboratorResult, Recommender};
use crate::models::CashbackOffer;

pub struct SpendingRecommender {
    db: Database,
    config: CashbackConfig,
    /// Categories never offered (the categorizer's fallback bucket)
    excluded: Vec<String>,
}

impl SpendingRecommender {
    pub fn new(db: Database, config: CashbackConfig) -> Self {
        Self {
            db,
            config,
            excluded: Vec::new(),
        }
    }

    pub fn from_config(db: Database, config: &AppConfig) -> Self {
        Self::new(db, config.cashback.clone())
            .excluding(&[config.categorizer.fallback_category.as_str()])
    }

    pub fn excluding(mut self, categories: &[&str]) -> Self {
        self.excluded = categories.iter().map(|c| c.trim().to_lowercase()).collect();
        self
    }

    /// Rank as of `now`
    pub fn rank_at(&self, account_id: i64, now: DateTime<Utc>) -> CollaboratorResult<Vec<CashbackOffer>> {
        let since = now - Duration::days(self.config.history_days);
        let spending = self
            .db
            .category_spending(account_id, since)
            .map_err(|e| CollaboratorError::Unavailable(e.to_string()))?;

        let top: Vec<_> = spending
            .into_iter()
            .filter(|s| !self.excluded.contains(&s.category))
            .take(self.config.max_candidates)
            .collect();

        if top.is_empty() {
            return Err(CollaboratorError::InsufficientHistory);
        }

        let scores: Vec<i64> = top.iter().map(|s| s.transaction_count).collect();
        let values = interpolate(&scores, self.config.min_percent, self.config.max_percent);

        debug!(account_id, candidates = top.len(), "Ranked cashback categories");
        Ok(top
            .into_iter()
            .zip(values)
            .map(|(s, value)| CashbackOffer::new(s.category, value))
            .collect())
    }
}

#[async_trait]
impl Recommender for SpendingRecommender {
    async fn rank(&self, account_id: i64) -> CollaboratorResult<Vec<CashbackOffer>> {
        self.rank_at(account_id, Utc::now())
    }
}

/// Map scores linearly onto `[min, max]`, rounding to the nearest integer
///
/// The highest score maps to `max` and the lowest to `min`. When every score
/// is the same (including a single score) all map to `max`.
pub fn interpolate(scores: &[i64], min: i64, max: i64) -> Vec<i64> {
    let (Some(&hi), Some(&lo)) = (scores.iter().max(), scores.iter().min()) else {
        return Vec::new();
    };
    if hi == lo {
        return vec![max; scores.len()];
    }

    let span = (hi - lo) as f64;
    let range = (max - min) as f64;
    scores
        .iter()
        .map(|&s| min + ((s - lo) as f64 * range / span).round() as i64)
        .collect()
}
