// 🚚 Ingestion - load → clean → persist → record the run
//
// The cleaned batch is handed straight to storage; nothing is cached
// between runs. A rejected batch leaves the stored tables untouched.

use crate::batch::Batch;
use crate::config::AppConfig;
use crate::db::{insert_products, insert_run, insert_students, IngestionRun};
use crate::entities::{EntityKind, Product, Student};
use crate::loader::load_sources;
use crate::pipeline::{CleanedBatch, CleaningReport, Pipeline, Rejection};
use anyhow::Context;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Error reading files: {0:#}")]
    Load(anyhow::Error),

    #[error("Invalid rule set: {0:#}")]
    Rules(anyhow::Error),

    #[error("Validation failed: {0}")]
    Rejected(#[from] Rejection),

    #[error("Storage error: {0:#}")]
    Storage(anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub run_id: String,
    pub entity: EntityKind,
    pub inserted: usize,
    pub report: CleaningReport,
}

/// SHA-256 over the column list and every cell, in order.
pub fn batch_fingerprint(batch: &Batch) -> String {
    let mut hasher = Sha256::new();
    hasher.update(batch.columns.join("\u{1f}"));
    for row in &batch.rows {
        hasher.update(b"\x1e");
        for column in &batch.columns {
            let cell = row.get(column).map(|v| format!("{:?}", v)).unwrap_or_default();
            hasher.update(cell.as_bytes());
            hasher.update(b"\x1f");
        }
    }
    format!("{:x}", hasher.finalize())
}

/// Read the configured sources for `entity` and ingest them.
pub fn ingest(
    conn: &Connection,
    entity: EntityKind,
    config: &AppConfig,
) -> Result<IngestOutcome, IngestError> {
    let batch = load_sources(entity.sources(config)).map_err(IngestError::Load)?;
    ingest_batch(conn, entity, &batch, config)
}

/// Clean an already-merged batch and persist it as one unit.
pub fn ingest_batch(
    conn: &Connection,
    entity: EntityKind,
    batch: &Batch,
    config: &AppConfig,
) -> Result<IngestOutcome, IngestError> {
    let pipeline = entity
        .rules(config)
        .and_then(Pipeline::new)
        .map_err(IngestError::Rules)?;
    let mut run = IngestionRun::new(entity, &batch_fingerprint(batch), batch.len());

    info!(run_id = %run.run_id, entity = %entity, rows = batch.len(), "ingestion started");

    let cleaned = match pipeline.clean(batch) {
        Ok(cleaned) => cleaned,
        Err(rejection) => {
            run.reason = Some(rejection.to_string());
            run.report = serde_json::json!({ "code": rejection.code() });
            insert_run(conn, &run).map_err(IngestError::Storage)?;
            warn!(run_id = %run.run_id, reason = %rejection, "ingestion rejected");
            return Err(IngestError::Rejected(rejection));
        }
    };

    run.rows_out = cleaned.rows.len();
    run.report = serde_json::to_value(&cleaned.report).unwrap_or_default();

    match persist(conn, entity, &cleaned) {
        Ok(inserted) => {
            run.accepted = true;
            insert_run(conn, &run).map_err(IngestError::Storage)?;
            info!(run_id = %run.run_id, inserted, "{}", cleaned.report.summary());
            Ok(IngestOutcome {
                run_id: run.run_id,
                entity,
                inserted,
                report: cleaned.report,
            })
        }
        Err(err) => {
            run.reason = Some(format!("{:#}", err));
            insert_run(conn, &run).map_err(IngestError::Storage)?;
            warn!(run_id = %run.run_id, error = %format!("{:#}", err), "persisting batch failed");
            Err(IngestError::Storage(err))
        }
    }
}

fn persist(conn: &Connection, entity: EntityKind, cleaned: &CleanedBatch) -> anyhow::Result<usize> {
    match entity {
        EntityKind::Product => {
            let products = cleaned
                .rows
                .iter()
                .map(Product::from_row)
                .collect::<anyhow::Result<Vec<_>>>()
                .context("Failed to build product records")?;
            insert_products(conn, &products)
        }
        EntityKind::Student => {
            let students = cleaned
                .rows
                .iter()
                .map(Student::from_row)
                .collect::<anyhow::Result<Vec<_>>>()
                .context("Failed to build student records")?;
            insert_students(conn, &students)
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::Value;
    use crate::db::{count_rows, get_all_students, get_recent_runs, setup_database};
    use crate::entities::{product, student, ResultStatus};
    use std::fs;

    fn open() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn product_batch(prices: &[(&str, &str)]) -> Batch {
        Batch::from_records(
            product::COLUMNS.iter().map(|c| c.to_string()).collect(),
            prices
                .iter()
                .map(|(pid, price)| {
                    vec![
                        Value::from(*pid),
                        "Lamp".into(),
                        "Home".into(),
                        Value::from(*price),
                        "4".into(),
                        "3".into(),
                        "U7".into(),
                        "Meera".into(),
                        "Delhi".into(),
                    ]
                })
                .collect(),
        )
    }

    #[test]
    fn test_accepted_batch_is_persisted_and_logged() {
        let conn = open();
        let batch = product_batch(&[("P1", "10"), ("P2", "70")]);

        let outcome = ingest_batch(&conn, EntityKind::Product, &batch, &AppConfig::default()).unwrap();

        assert_eq!(outcome.inserted, 2);
        assert_eq!(count_rows(&conn, EntityKind::Product).unwrap(), 2);

        let runs = get_recent_runs(&conn, 5).unwrap();
        assert_eq!(runs.len(), 1);
        assert!(runs[0].accepted);
        assert_eq!(runs[0].rows_out, 2);
        assert_eq!(runs[0].run_id, outcome.run_id);
    }

    #[test]
    fn test_rejected_batch_persists_nothing() {
        let conn = open();
        let batch = product_batch(&[("P1", "10"), ("P2", "15000")]);

        let err = ingest_batch(&conn, EntityKind::Product, &batch, &AppConfig::default()).unwrap_err();

        match err {
            IngestError::Rejected(r) => assert_eq!(r.code(), "price_range"),
            other => panic!("expected rejection, got {:?}", other),
        }
        assert_eq!(count_rows(&conn, EntityKind::Product).unwrap(), 0);

        let runs = get_recent_runs(&conn, 5).unwrap();
        assert!(!runs[0].accepted);
        assert_eq!(
            runs[0].reason.as_deref(),
            Some("Price in dollar is out of expected range.")
        );
    }

    #[test]
    fn test_reingest_conflict_leaves_store_unchanged() {
        let conn = open();
        let config = AppConfig::default();
        ingest_batch(&conn, EntityKind::Product, &product_batch(&[("P1", "10")]), &config).unwrap();

        let again = product_batch(&[("P2", "20"), ("P1", "10")]);
        let err = ingest_batch(&conn, EntityKind::Product, &again, &config).unwrap_err();

        assert!(matches!(err, IngestError::Storage(_)));
        assert_eq!(count_rows(&conn, EntityKind::Product).unwrap(), 1);
        assert_eq!(get_recent_runs(&conn, 5).unwrap().len(), 2);
    }

    #[test]
    fn test_fingerprint_is_stable_and_content_sensitive() {
        let a = product_batch(&[("P1", "10")]);
        let b = product_batch(&[("P1", "11")]);

        assert_eq!(batch_fingerprint(&a), batch_fingerprint(&a.clone()));
        assert_ne!(batch_fingerprint(&a), batch_fingerprint(&b));
        assert_eq!(batch_fingerprint(&a).len(), 64);
    }

    #[test]
    fn test_ingest_students_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let csv = dir.path().join("f1.csv");
        let json = dir.path().join("f3.json");
        let html = dir.path().join("f4.html");
        fs::write(&csv, "sid,name,mid1,mid2,semester,gpa\nS1,Anu,20,25,70,8.2\nS2,Bala,,25,60,7\n").unwrap();
        fs::write(
            &json,
            r#"[{"sid": "S3", "name": "Chitra", "mid1": 15, "mid2": 18, "semester": 55, "gpa": " FAIL "}]"#,
        )
        .unwrap();
        fs::write(
            &html,
            "<table><tr><th>sid</th><th>name</th><th>mid1</th><th>mid2</th><th>semester</th><th>gpa</th></tr>\
             <tr><td>S1</td><td>Dup</td><td>1</td><td>1</td><td>1</td><td>1</td></tr>\
             <tr><td>S4</td><td>Deepa</td><td>30</td><td>30</td><td>80</td><td>9.1</td></tr></table>",
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.student.sources = vec![csv, json, html];

        let conn = open();
        let outcome = ingest(&conn, EntityKind::Student, &config).unwrap();

        assert_eq!(outcome.inserted, 3);
        assert_eq!(outcome.report.dropped_missing, 1);
        assert_eq!(outcome.report.dropped_duplicates, 1);

        let stored = get_all_students(&conn).unwrap();
        let sids: Vec<_> = stored.iter().map(|s| s.sid.as_str()).collect();
        assert_eq!(sids, vec!["S1", "S3", "S4"]);
        assert_eq!(stored[0].name, "Anu");
        assert_eq!(stored[1].status, ResultStatus::Fail);
        assert_eq!(stored[1].percentage, 0.0);
        assert_eq!(stored[0].mid_avg, (30.0 + 35.0) / 2.0);
        assert_eq!(student::KEY_COLUMN, "sid");
    }

    #[test]
    fn test_unreadable_source_aborts_before_cleaning() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.product.sources = vec![dir.path().join("missing.csv")];

        let conn = open();
        let err = ingest(&conn, EntityKind::Product, &config).unwrap_err();

        assert!(matches!(err, IngestError::Load(_)));
        assert!(err.to_string().starts_with("Error reading files"));
        assert!(get_recent_runs(&conn, 5).unwrap().is_empty());
    }
}
