//! Offline transaction source backed by a CSV export
//!
//! Format: `account_number,id,description,amount,time` with a header row.
//! `time` is RFC 3339; `amount` is a signed integer (negative is spending).

use std::io::Read;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use csv::ReaderBuilder;
use serde::Deserialize;
use tracing::debug;

use super::{CollaboratorResult, ExternalTransaction, TransactionSource};
use crate::error::{Error, Result};

#[derive(Debug, Deserialize)]
struct CsvRow {
    account_number: String,
    id: String,
    description: String,
    amount: i64,
    time: DateTime<Utc>,
}

pub struct CsvTransactionSource {
    rows: Vec<(String, ExternalTransaction)>,
}

impl CsvTransactionSource {
    pub fn from_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .map_err(|e| Error::InvalidData(format!("Cannot open {}: {}", path.display(), e)))?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut rows = Vec::new();
        for result in rdr.deserialize() {
            let row: CsvRow = result?;
            rows.push((
                row.account_number,
                ExternalTransaction {
                    id: row.id,
                    description: row.description,
                    amount: row.amount,
                    time: row.time,
                },
            ));
        }

        debug!("Loaded {} CSV transactions", rows.len());
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl TransactionSource for CsvTransactionSource {
    async fn fetch(
        &self,
        account_number: &str,
        since: Option<DateTime<Utc>>,
    ) -> CollaboratorResult<Vec<ExternalTransaction>> {
        let mut transactions: Vec<_> = self
            .rows
            .iter()
            .filter(|(number, t)| number == account_number && since.map_or(true, |s| t.time > s))
            .map(|(_, t)| t.clone())
            .collect();
        transactions.sort_by_key(|t| t.time);
        Ok(transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const CSV: &str = "\
account_number,id,description,amount,time
111,T1,Bread,-100,2024-03-01T09:00:00Z
111,T2,Coffee,-50,2024-03-02T09:00:00Z
222,T3,Salary,5000,2024-03-02T12:00:00Z
111,T4, Jeans ,-2500,2024-03-03T18:30:00Z
";

    #[tokio::test]
    async fn test_fetch_by_account_and_watermark() {
        let source = CsvTransactionSource::from_reader(CSV.as_bytes()).unwrap();
        assert_eq!(source.len(), 4);

        let all = source.fetch("111", None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].description, "Jeans");

        let since = Utc.with_ymd_and_hms(2024, 3, 2, 9, 0, 0).unwrap();
        let newer = source.fetch("111", Some(since)).await.unwrap();
        assert_eq!(newer.len(), 1);
        assert_eq!(newer[0].id, "T4");

        assert!(source.fetch("999", None).await.unwrap().is_empty());
    }

    #[test]
    fn test_bad_amount_is_rejected() {
        let bad = "account_number,id,description,amount,time\n111,T1,Bread,abc,2024-03-01T09:00:00Z\n";
        assert!(matches!(
            CsvTransactionSource::from_reader(bad.as_bytes()),
            Err(Error::Csv(_))
        ));
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tx.csv");
        std::fs::write(&path, CSV).unwrap();
        let source = CsvTransactionSource::from_path(&path).unwrap();
        assert!(!source.is_empty());
    }
}
