//! Write the whole batch as a single JSON array document.

use super::ResultSink;
use crate::models::Transaction;
use crate::Result;
use std::path::PathBuf;
use tracing::info;

pub struct JsonFileSink {
    path: PathBuf,
}

impl JsonFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl ResultSink for JsonFileSink {
    async fn write(&self, batch: &[Transaction]) -> Result<()> {
        let document = serde_json::to_vec(batch)?;
        tokio::fs::write(&self.path, document).await?;

        info!(
            path = %self.path.display(),
            count = batch.len(),
            "Wrote transactions"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn txn(id: &str, amount: &str) -> Transaction {
        Transaction {
            id: id.to_string(),
            bank_name: "Monzo".to_string(),
            account_name: "Current".to_string(),
            currency: "GBP".to_string(),
            timestamp: "2024-03-15T08:30:00Z".to_string(),
            description: "TESCO".to_string(),
            amount: Decimal::from_str(amount).unwrap(),
            transaction_type: "DEBIT".to_string(),
            category: "PURCHASE".to_string(),
            merchant: "Tesco".to_string(),
            tags: vec!["Shopping".to_string()],
        }
    }

    #[tokio::test]
    async fn test_writes_single_array_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        let sink = JsonFileSink::new(&path);

        sink.write(&[txn("t1", "-12.34"), txn("t2", "2500")]).await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains('\n'));

        let doc: serde_json::Value = serde_json::from_str(&raw).unwrap();
        let items = doc.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["id"], "t1");
        assert_eq!(items[0]["bank"], "Monzo");
        assert_eq!(items[0]["type"], "DEBIT");
        assert_eq!(items[0]["amount"].as_f64(), Some(-12.34));
    }

    #[tokio::test]
    async fn test_empty_batch_writes_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");

        JsonFileSink::new(&path).write(&[]).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }

    #[tokio::test]
    async fn test_missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let sink = JsonFileSink::new(dir.path().join("nope").join("out.json"));

        let err = sink.write(&[txn("t1", "1")]).await.unwrap_err();
        assert!(matches!(err, crate::error::BeancounterError::IoError(_)));
    }
}
