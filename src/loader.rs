// 🏗️ Loader Framework - one reader per source format
// Five formats in, one untyped Batch out. Any failed read aborts the load.

use crate::batch::{Batch, Row, Value};
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

// ============================================================================
// CORE TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceFormat {
    Csv,
    Spreadsheet,
    Json,
    Html,
    Xml,
}

impl SourceFormat {
    /// Human-readable name for display
    pub fn name(&self) -> &str {
        match self {
            SourceFormat::Csv => "CSV",
            SourceFormat::Spreadsheet => "Spreadsheet",
            SourceFormat::Json => "JSON",
            SourceFormat::Html => "HTML table",
            SourceFormat::Xml => "XML",
        }
    }

    /// File extensions this format is detected from
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            SourceFormat::Csv => &["csv"],
            SourceFormat::Spreadsheet => &["xlsx", "xls", "xlsm", "xlsb", "ods"],
            SourceFormat::Json => &["json"],
            SourceFormat::Html => &["html", "htm"],
            SourceFormat::Xml => &["xml", "lxml"],
        }
    }
}

/// SourceReader - one implementation per file format
pub trait SourceReader: Send + Sync {
    /// Read the whole file into a batch, keeping column names as written
    fn read(&self, file_path: &Path) -> Result<Batch>;

    fn format(&self) -> SourceFormat;

    /// Reader version (recorded with ingestion runs)
    fn version(&self) -> &str {
        "1.0.0"
    }
}

// ============================================================================
// FACTORY FUNCTIONS
// ============================================================================

/// Detect the source format from the file extension
pub fn detect_format(file_path: &Path) -> Result<SourceFormat> {
    let ext = file_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    [
        SourceFormat::Csv,
        SourceFormat::Spreadsheet,
        SourceFormat::Json,
        SourceFormat::Html,
        SourceFormat::Xml,
    ]
    .into_iter()
    .find(|f| f.extensions().contains(&ext.as_str()))
    .ok_or_else(|| {
        anyhow!(
            "Could not detect source format from file name: {}",
            file_path.display()
        )
    })
}

pub fn get_reader(format: SourceFormat) -> Box<dyn SourceReader> {
    match format {
        SourceFormat::Csv => Box::new(CsvReader),
        SourceFormat::Spreadsheet => Box::new(SpreadsheetReader),
        SourceFormat::Json => Box::new(JsonReader),
        SourceFormat::Html => Box::new(HtmlTableReader),
        SourceFormat::Xml => Box::new(XmlReader),
    }
}

/// Read every source in order and concatenate them row-wise.
pub fn load_sources(paths: &[PathBuf]) -> Result<Batch> {
    if paths.is_empty() {
        bail!("No source files configured");
    }

    let mut batches = Vec::with_capacity(paths.len());
    for path in paths {
        let format = detect_format(path)?;
        let reader = get_reader(format);
        let batch = reader
            .read(path)
            .with_context(|| format!("Error reading {} file: {}", format.name(), path.display()))?;

        info!(
            source = %path.display(),
            format = format.name(),
            rows = batch.len(),
            columns = batch.columns.len(),
            "loaded source"
        );
        batches.push(batch);
    }

    let merged = Batch::concat(batches);
    debug!(rows = merged.len(), columns = ?merged.columns, "merged sources");
    Ok(merged)
}

// ============================================================================
// CSV
// ============================================================================

pub struct CsvReader;

impl SourceReader for CsvReader {
    fn read(&self, file_path: &Path) -> Result<Batch> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_path(file_path)
            .with_context(|| format!("Failed to open file: {}", file_path.display()))?;

        let columns: Vec<String> = reader
            .headers()
            .context("Failed to read CSV header")?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut records = Vec::new();
        for (line_num, result) in reader.records().enumerate() {
            let record = result.with_context(|| {
                format!("Failed to parse CSV line {} in {}", line_num + 2, file_path.display())
            })?;
            records.push(record.iter().map(Value::from_text).collect());
        }

        Ok(Batch::from_records(columns, records))
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Csv
    }
}

// ============================================================================
// SPREADSHEET
// ============================================================================

pub struct SpreadsheetReader;

/// Map one spreadsheet cell to a batch value
pub fn spreadsheet_value(cell: &calamine::Data) -> Value {
    use calamine::Data;

    match cell {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::String(s) => Value::from_text(s),
        Data::Float(f) => Value::number(*f),
        Data::Int(i) => Value::Number(*i as f64),
        Data::Bool(b) => Value::Text(b.to_string()),
        Data::DateTime(dt) => Value::number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Value::Text(s.clone()),
    }
}

impl SourceReader for SpreadsheetReader {
    fn read(&self, file_path: &Path) -> Result<Batch> {
        use calamine::{open_workbook_auto, Reader};

        let mut workbook = open_workbook_auto(file_path)
            .with_context(|| format!("Failed to open spreadsheet: {}", file_path.display()))?;

        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("Spreadsheet has no worksheets: {}", file_path.display()))?;

        let range = workbook
            .worksheet_range(&sheet_name)
            .with_context(|| format!("Failed to read worksheet '{}'", sheet_name))?;

        let mut rows = range.rows();
        let columns: Vec<String> = match rows.next() {
            Some(header) => header
                .iter()
                .map(|c| {
                    spreadsheet_value(c)
                        .as_key()
                        .map(|h| h.trim().to_string())
                        .unwrap_or_default()
                })
                .collect(),
            None => return Ok(Batch::default()),
        };

        let records = rows
            .map(|row| row.iter().map(spreadsheet_value).collect())
            .collect();

        Ok(Batch::from_records(columns, records))
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Spreadsheet
    }
}

// ============================================================================
// JSON
// ============================================================================

pub struct JsonReader;

fn json_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Number(n) => n.as_f64().map(Value::number).unwrap_or(Value::Null),
        serde_json::Value::String(s) => Value::from_text(s),
        serde_json::Value::Bool(b) => Value::Text(b.to_string()),
        other => Value::Text(other.to_string()),
    }
}

/// Accepts records (`[{col: v}, ...]`) or columns (`{col: {idx: v}}` / `{col: [v]}`).
pub fn batch_from_json(root: &serde_json::Value) -> Result<Batch> {
    match root {
        serde_json::Value::Array(records) => {
            let mut batch = Batch::default();
            for (i, record) in records.iter().enumerate() {
                let object = record
                    .as_object()
                    .ok_or_else(|| anyhow!("JSON record {} is not an object", i))?;
                let row: Row = object
                    .iter()
                    .map(|(k, v)| (k.clone(), json_value(v)))
                    .collect();
                batch.push_row(row);
            }
            Ok(batch)
        }
        serde_json::Value::Object(columns) => {
            // index label -> row, in index order
            let mut by_index: Vec<(String, Row)> = Vec::new();
            let mut positions: HashMap<String, usize> = HashMap::new();
            for (column, cells) in columns {
                let entries: Vec<(String, &serde_json::Value)> = match cells {
                    serde_json::Value::Object(map) => {
                        map.iter().map(|(idx, v)| (idx.clone(), v)).collect()
                    }
                    serde_json::Value::Array(list) => list
                        .iter()
                        .enumerate()
                        .map(|(idx, v)| (idx.to_string(), v))
                        .collect(),
                    _ => bail!("JSON column '{}' is neither an object nor an array", column),
                };

                for (idx, v) in entries {
                    let pos = *positions.entry(idx.clone()).or_insert_with(|| {
                        by_index.push((idx, Row::new()));
                        by_index.len() - 1
                    });
                    by_index[pos].1.insert(column.clone(), json_value(v));
                }
            }

            by_index.sort_by(|(a, _), (b, _)| match (a.parse::<u64>(), b.parse::<u64>()) {
                (Ok(x), Ok(y)) => x.cmp(&y),
                _ => a.cmp(b),
            });

            let mut batch = Batch::new(columns.keys().cloned().collect());
            for (_, row) in by_index {
                batch.push_row(row);
            }
            Ok(batch)
        }
        _ => bail!("JSON root must be an array of records or an object of columns"),
    }
}

impl SourceReader for JsonReader {
    fn read(&self, file_path: &Path) -> Result<Batch> {
        let content = fs::read_to_string(file_path)
            .with_context(|| format!("Failed to open file: {}", file_path.display()))?;
        let root: serde_json::Value =
            serde_json::from_str(&content).context("Failed to parse JSON")?;
        batch_from_json(&root)
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Json
    }
}

// ============================================================================
// HTML TABLE
// ============================================================================

pub struct HtmlTableReader;

/// Parse the first `<table>` in an HTML document.
pub fn batch_from_html(html: &str) -> Result<Batch> {
    use scraper::{Html, Selector};

    let selector = |s: &str| Selector::parse(s).map_err(|e| anyhow!("invalid selector '{}': {:?}", s, e));
    let table_selector = selector("table")?;
    let row_selector = selector("tr")?;
    let header_selector = selector("th")?;
    let cell_selector = selector("th, td")?;

    let document = Html::parse_document(html);
    let table = document
        .select(&table_selector)
        .next()
        .ok_or_else(|| anyhow!("No tables found"))?;

    let rows: Vec<_> = table.select(&row_selector).collect();
    let header_pos = rows
        .iter()
        .position(|tr| tr.select(&header_selector).next().is_some())
        .unwrap_or(0);

    let cell_texts = |tr: &scraper::ElementRef| -> Vec<String> {
        tr.select(&cell_selector)
            .map(|c| c.text().collect::<String>().trim().to_string())
            .collect()
    };

    let columns = match rows.get(header_pos) {
        Some(tr) => cell_texts(tr),
        None => return Ok(Batch::default()),
    };

    let records = rows
        .iter()
        .skip(header_pos + 1)
        .map(|tr| cell_texts(tr).iter().map(|t| Value::from_text(t)).collect())
        .collect();

    Ok(Batch::from_records(columns, records))
}

impl SourceReader for HtmlTableReader {
    fn read(&self, file_path: &Path) -> Result<Batch> {
        let content = fs::read_to_string(file_path)
            .with_context(|| format!("Failed to open file: {}", file_path.display()))?;
        batch_from_html(&content)
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Html
    }
}

// ============================================================================
// XML
// ============================================================================

pub struct XmlReader;

/// Each child element of the root is a row; its attributes and child
/// elements are the columns.
pub fn batch_from_xml(xml: &str) -> Result<Batch> {
    let document = roxmltree::Document::parse(xml).context("Failed to parse XML")?;

    let mut batch = Batch::default();
    for record in document.root_element().children().filter(|n| n.is_element()) {
        let mut row = Row::new();
        for attr in record.attributes() {
            row.insert(attr.name().to_string(), Value::from_text(attr.value().trim()));
        }
        for field in record.children().filter(|n| n.is_element()) {
            let text = field.text().unwrap_or("").trim();
            row.insert(field.tag_name().name().to_string(), Value::from_text(text));
        }
        batch.push_row(row);
    }

    Ok(batch)
}

impl SourceReader for XmlReader {
    fn read(&self, file_path: &Path) -> Result<Batch> {
        let content = fs::read_to_string(file_path)
            .with_context(|| format!("Failed to open file: {}", file_path.display()))?;
        batch_from_xml(&content)
    }

    fn format(&self) -> SourceFormat {
        SourceFormat::Xml
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::cell;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(Path::new("f1.csv")).unwrap(), SourceFormat::Csv);
        assert_eq!(detect_format(Path::new("data2.XLSX")).unwrap(), SourceFormat::Spreadsheet);
        assert_eq!(detect_format(Path::new("data3.json")).unwrap(), SourceFormat::Json);
        assert_eq!(detect_format(Path::new("data4.html")).unwrap(), SourceFormat::Html);
        assert_eq!(detect_format(Path::new("data5.lxml")).unwrap(), SourceFormat::Xml);
        assert!(detect_format(Path::new("notes.txt")).is_err());
    }

    #[test]
    fn test_csv_reader_maps_empty_to_null() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "f1.csv", "pid,category,price\nP1,,10\nP2,Books,NA\n");

        let batch = CsvReader.read(&path).unwrap();

        assert_eq!(batch.columns, vec!["pid", "category", "price"]);
        assert_eq!(batch.len(), 2);
        assert_eq!(cell(&batch.rows[0], "category"), &Value::Null);
        assert_eq!(cell(&batch.rows[1], "price"), &Value::Null);
        assert_eq!(cell(&batch.rows[1], "category"), &Value::from("Books"));
    }

    #[test]
    fn test_json_records_and_columns() {
        let records = serde_json::json!([
            {"pid": "P1", "price": 10.5},
            {"pid": "P2", "price": null}
        ]);
        let batch = batch_from_json(&records).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(cell(&batch.rows[0], "price"), &Value::Number(10.5));
        assert_eq!(cell(&batch.rows[1], "price"), &Value::Null);

        let columns = serde_json::json!({
            "pid": {"0": "P1", "1": "P2", "10": "P3"},
            "price": {"0": 1, "1": 2, "10": 3}
        });
        let batch = batch_from_json(&columns).unwrap();
        assert_eq!(batch.len(), 3);
        assert_eq!(cell(&batch.rows[2], "pid"), &Value::from("P3"));
        assert_eq!(cell(&batch.rows[2], "price"), &Value::Number(3.0));

        assert!(batch_from_json(&serde_json::json!(42)).is_err());
    }

    #[test]
    fn test_json_columns_with_many_rows() {
        let n = 5000;
        let pids: serde_json::Map<String, serde_json::Value> = (0..n)
            .map(|i| (i.to_string(), serde_json::json!(format!("P{}", i))))
            .collect();
        let prices: serde_json::Map<String, serde_json::Value> = (0..n)
            .map(|i| (i.to_string(), serde_json::json!(i)))
            .collect();
        let root = serde_json::json!({"pid": pids, "price": prices});

        let batch = batch_from_json(&root).unwrap();

        assert_eq!(batch.len(), n);
        assert_eq!(cell(&batch.rows[0], "pid"), &Value::from("P0"));
        assert_eq!(cell(&batch.rows[n - 1], "pid"), &Value::from(format!("P{}", n - 1)));
        assert_eq!(cell(&batch.rows[n - 1], "price"), &Value::Number((n - 1) as f64));
    }

    #[test]
    fn test_html_reads_first_table_only() {
        let html = r#"
            <html><body>
              <table>
                <thead><tr><th>pid</th><th>price</th></tr></thead>
                <tbody>
                  <tr><td> P1 </td><td>10</td></tr>
                  <tr><td>P2</td><td></td></tr>
                </tbody>
              </table>
              <table><tr><th>other</th></tr><tr><td>x</td></tr></table>
            </body></html>"#;

        let batch = batch_from_html(html).unwrap();

        assert_eq!(batch.columns, vec!["pid", "price"]);
        assert_eq!(batch.len(), 2);
        assert_eq!(cell(&batch.rows[0], "pid"), &Value::from("P1"));
        assert_eq!(cell(&batch.rows[1], "price"), &Value::Null);
    }

    #[test]
    fn test_html_without_table_fails() {
        assert!(batch_from_html("<p>nothing here</p>").is_err());
    }

    #[test]
    fn test_xml_rows_from_children() {
        let xml = r#"<?xml version="1.0"?>
            <data>
              <row index="0"><pid>P1</pid><price>10</price></row>
              <row index="1"><pid>P2</pid><price/></row>
            </data>"#;

        let batch = batch_from_xml(xml).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(cell(&batch.rows[0], "pid"), &Value::from("P1"));
        assert_eq!(cell(&batch.rows[1], "price"), &Value::Null);
        assert_eq!(cell(&batch.rows[1], "index"), &Value::from("1"));
    }

    #[test]
    fn test_spreadsheet_cell_mapping() {
        use calamine::Data;

        assert_eq!(spreadsheet_value(&Data::Empty), Value::Null);
        assert_eq!(spreadsheet_value(&Data::Int(7)), Value::Number(7.0));
        assert_eq!(spreadsheet_value(&Data::Float(2.5)), Value::Number(2.5));
        assert_eq!(spreadsheet_value(&Data::String("NaN".to_string())), Value::Null);
        assert_eq!(spreadsheet_value(&Data::Bool(true)), Value::from("true"));
    }

    #[test]
    fn test_load_sources_concatenates_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let csv = write(&dir, "f1.csv", "pid,price\nP1,10\n");
        let json = write(&dir, "f3.json", r#"[{"pid": "P2", "price": 20}]"#);
        let xml = write(&dir, "f5.xml", "<data><row><pid>P3</pid><price>30</price></row></data>");

        let batch = load_sources(&[csv, json, xml]).unwrap();

        let pids: Vec<_> = batch.rows.iter().map(|r| cell(r, "pid").as_key().unwrap()).collect();
        assert_eq!(pids, vec!["P1", "P2", "P3"]);
    }

    #[test]
    fn test_load_sources_aborts_on_any_failure() {
        let dir = tempfile::tempdir().unwrap();
        let csv = write(&dir, "f1.csv", "pid,price\nP1,10\n");
        let missing = dir.path().join("f4.html");

        let err = load_sources(&[csv, missing]).unwrap_err();
        assert!(format!("{:#}", err).contains("Error reading HTML table file"));
    }
}
