use crate::entities::{EntityKind, Product, Student};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One ingestion attempt, accepted or rejected (audit trail)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct IngestionRun {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub entity: String,
    pub fingerprint: String,
    pub rows_in: usize,
    pub rows_out: usize,
    pub accepted: bool,
    pub reason: Option<String>,
    pub report: serde_json::Value,
}

impl IngestionRun {
    pub fn new(entity: EntityKind, fingerprint: &str, rows_in: usize) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            entity: entity.name().to_string(),
            fingerprint: fingerprint.to_string(),
            rows_in,
            rows_out: 0,
            accepted: false,
            reason: None,
            report: serde_json::json!({}),
        }
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Entity tables (unique key on the identifier column)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS products (
            pid TEXT PRIMARY KEY NOT NULL,
            product_name TEXT NOT NULL,
            category TEXT NOT NULL,
            price_in_dollar REAL NOT NULL,
            price_in_inr REAL NOT NULL,
            price_category TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            return_rate REAL NOT NULL,
            uid TEXT NOT NULL,
            user_name TEXT NOT NULL,
            branch TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS students (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            sid TEXT UNIQUE NOT NULL,
            name TEXT NOT NULL,
            mid1 REAL NOT NULL DEFAULT 0.0,
            mid2 REAL NOT NULL DEFAULT 0.0,
            mid_avg REAL NOT NULL,
            semester REAL NOT NULL,
            gpa REAL NOT NULL DEFAULT 0.0,
            percentage REAL NOT NULL,
            status TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Ingestion runs (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS ingestion_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            entity TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            rows_in INTEGER NOT NULL,
            rows_out INTEGER NOT NULL,
            accepted INTEGER NOT NULL,
            reason TEXT,
            report TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_products_category ON products(category)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_students_status ON students(status)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_runs_timestamp ON ingestion_runs(timestamp)",
        [],
    )?;

    Ok(())
}

/// Turn a unique-key violation into a readable error naming the key.
fn insert_error(err: rusqlite::Error, table: &str, key: &str) -> anyhow::Error {
    match err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            anyhow!("Duplicate key '{}' already stored in {}", key, table)
        }
        other => anyhow::Error::new(other).context(format!("Failed to insert '{}' into {}", key, table)),
    }
}

/// Insert a cleaned batch of products. All rows commit together or none do.
pub fn insert_products(conn: &Connection, products: &[Product]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO products (
                pid, product_name, category, price_in_dollar, price_in_inr,
                price_category, quantity, return_rate, uid, user_name, branch
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        )?;

        for p in products {
            stmt.execute(params![
                p.pid,
                p.product_name,
                p.category,
                p.price_in_dollar,
                p.price_in_inr,
                p.price_category.as_str(),
                p.quantity,
                p.return_rate,
                p.uid,
                p.user_name,
                p.branch,
            ])
            .map_err(|e| insert_error(e, "products", &p.pid))?;
        }
    }
    tx.commit()?;

    info!(count = products.len(), "inserted products");
    Ok(products.len())
}

/// Insert a cleaned batch of students. All rows commit together or none do.
pub fn insert_students(conn: &Connection, students: &[Student]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO students (
                sid, name, mid1, mid2, mid_avg, semester, gpa, percentage, status
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )?;

        for s in students {
            stmt.execute(params![
                s.sid,
                s.name,
                s.mid1,
                s.mid2,
                s.mid_avg,
                s.semester,
                s.gpa,
                s.percentage,
                s.status.as_str(),
            ])
            .map_err(|e| insert_error(e, "students", &s.sid))?;
        }
    }
    tx.commit()?;

    info!(count = students.len(), "inserted students");
    Ok(students.len())
}

fn parse_column<T>(idx: usize, text: &str) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = anyhow::Error>,
{
    text.parse().map_err(|e: anyhow::Error| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
    })
}

pub fn get_all_products(conn: &Connection) -> Result<Vec<Product>> {
    let mut stmt = conn.prepare(
        "SELECT pid, product_name, category, price_in_dollar, price_in_inr,
                price_category, quantity, return_rate, uid, user_name, branch
         FROM products
         ORDER BY rowid",
    )?;

    let products = stmt
        .query_map([], |row| {
            let price_category: String = row.get(5)?;
            Ok(Product {
                pid: row.get(0)?,
                product_name: row.get(1)?,
                category: row.get(2)?,
                price_in_dollar: row.get(3)?,
                price_in_inr: row.get(4)?,
                price_category: parse_column(5, &price_category)?,
                quantity: row.get(6)?,
                return_rate: row.get(7)?,
                uid: row.get(8)?,
                user_name: row.get(9)?,
                branch: row.get(10)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read products")?;

    Ok(products)
}

const STUDENT_COLUMNS: &str =
    "sid, name, mid1, mid2, mid_avg, semester, gpa, percentage, status";

fn student_from_row(row: &rusqlite::Row) -> rusqlite::Result<Student> {
    let status: String = row.get(8)?;
    Ok(Student {
        sid: row.get(0)?,
        name: row.get(1)?,
        mid1: row.get(2)?,
        mid2: row.get(3)?,
        mid_avg: row.get(4)?,
        semester: row.get(5)?,
        gpa: row.get(6)?,
        percentage: row.get(7)?,
        status: parse_column(8, &status)?,
    })
}

pub fn get_all_students(conn: &Connection) -> Result<Vec<Student>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM students ORDER BY id",
        STUDENT_COLUMNS
    ))?;

    let students = stmt
        .query_map([], student_from_row)?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read students")?;

    Ok(students)
}

/// Students with a given status ("pass" or "fail")
pub fn get_students_by_status(conn: &Connection, status: &str) -> Result<Vec<Student>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM students WHERE status = ?1 ORDER BY id",
        STUDENT_COLUMNS
    ))?;

    let students = stmt
        .query_map(params![status], student_from_row)?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read students")?;

    Ok(students)
}

/// Delete one stored record by key. Returns false when nothing matched.
pub fn delete_record(conn: &Connection, entity: EntityKind, key: &str) -> Result<bool> {
    let sql = format!(
        "DELETE FROM {} WHERE {} = ?1",
        entity.table(),
        entity.key_column()
    );
    let removed = conn.execute(&sql, params![key])?;
    debug!(entity = %entity, key, removed, "delete");
    Ok(removed > 0)
}

pub fn delete_product(conn: &Connection, pid: &str) -> Result<bool> {
    delete_record(conn, EntityKind::Product, pid)
}

pub fn delete_student(conn: &Connection, sid: &str) -> Result<bool> {
    delete_record(conn, EntityKind::Student, sid)
}

pub fn count_rows(conn: &Connection, entity: EntityKind) -> Result<i64> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", entity.table()),
        [],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Insert ingestion run into audit trail
pub fn insert_run(conn: &Connection, run: &IngestionRun) -> Result<()> {
    let report_json = serde_json::to_string(&run.report)?;

    conn.execute(
        "INSERT INTO ingestion_runs (
            run_id, timestamp, entity, fingerprint, rows_in, rows_out, accepted, reason, report
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            run.run_id,
            run.timestamp.to_rfc3339(),
            run.entity,
            run.fingerprint,
            run.rows_in as i64,
            run.rows_out as i64,
            run.accepted,
            run.reason,
            report_json,
        ],
    )?;

    Ok(())
}

/// Most recent ingestion runs first
pub fn get_recent_runs(conn: &Connection, limit: usize) -> Result<Vec<IngestionRun>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, timestamp, entity, fingerprint, rows_in, rows_out, accepted, reason, report
         FROM ingestion_runs
         ORDER BY id DESC
         LIMIT ?1",
    )?;

    let runs = stmt
        .query_map(params![limit as i64], |row| {
            let timestamp_str: String = row.get(1)?;
            let report_json: String = row.get(8)?;
            let rows_in: i64 = row.get(4)?;
            let rows_out: i64 = row.get(5)?;

            Ok(IngestionRun {
                run_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
                    })?
                    .with_timezone(&Utc),
                entity: row.get(2)?,
                fingerprint: row.get(3)?,
                rows_in: rows_in as usize,
                rows_out: rows_out as usize,
                accepted: row.get(6)?,
                reason: row.get(7)?,
                report: serde_json::from_str(&report_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
                })?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(runs)
}
