// 🧹 Cleaning Pipeline - one engine, parameterized by a RuleSet
//
// Three severity tiers, kept distinct:
// - row defects (missing cell, repeated key, unparsable number) are dropped
// - repairable values are clamped in place
// - batch invariant violations reject the whole batch

use crate::batch::{cell, Batch, Row, Value};
use crate::rules::{CheckKind, ClampPhase, ClampPolicy, ClampRule, Derivation, RuleSet};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;
use tracing::{debug, warn};

// ============================================================================
// REJECTION
// ============================================================================

/// Why a whole batch was refused. Nothing from a rejected batch is persisted.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum Rejection {
    #[error("No processed data available")]
    NoData,

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("{message}")]
    CheckFailed { check: String, message: String },
}

impl Rejection {
    /// Short machine-readable code for run records
    pub fn code(&self) -> &str {
        match self {
            Rejection::NoData => "no_data",
            Rejection::MissingColumn(_) => "missing_column",
            Rejection::CheckFailed { check, .. } => check,
        }
    }
}

// ============================================================================
// REPORT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub rows_in: usize,
    pub dropped_missing: usize,
    pub dropped_duplicates: usize,
    pub clamped: BTreeMap<String, usize>,
    pub swept: usize,
    pub rows_out: usize,
}

impl CleaningReport {
    pub fn summary(&self) -> String {
        let clamped: usize = self.clamped.values().sum();
        format!(
            "{} rows in → {} out | {} missing, {} duplicate, {} swept | {} cells clamped",
            self.rows_in,
            self.rows_out,
            self.dropped_missing,
            self.dropped_duplicates,
            self.swept,
            clamped
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedBatch {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub report: CleaningReport,
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline {
    rules: RuleSet,
}

impl Pipeline {
    pub fn new(rules: RuleSet) -> Result<Self> {
        rules.validate()?;
        Ok(Pipeline { rules })
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Clean a raw batch. The input is never mutated, so the same batch
    /// always yields the same result.
    pub fn clean(&self, batch: &Batch) -> Result<CleanedBatch, Rejection> {
        let rules = &self.rules;

        for column in &rules.required_columns {
            if !batch.has_column(column) {
                warn!(entity = %rules.entity, column = %column, "batch is missing a required column");
                return Err(Rejection::MissingColumn(column.clone()));
            }
        }
        if batch.is_empty() {
            return Err(Rejection::NoData);
        }

        let mut report = CleaningReport {
            rows_in: batch.len(),
            ..CleaningReport::default()
        };

        // 1. Any missing cell in any column drops the row
        let mut rows: Vec<Row> = batch
            .rows
            .iter()
            .filter(|row| batch.columns.iter().all(|c| !cell(row, c).is_missing()))
            .cloned()
            .collect();
        report.dropped_missing = report.rows_in - rows.len();
        debug!(entity = %rules.entity, dropped = report.dropped_missing, "null elimination");

        // 2. First occurrence of each key wins
        let before = rows.len();
        let mut seen = HashSet::new();
        rows.retain(|row| match cell(row, &rules.key_column).as_key() {
            Some(key) => seen.insert(key),
            None => false,
        });
        report.dropped_duplicates = before - rows.len();
        debug!(entity = %rules.entity, dropped = report.dropped_duplicates, "duplicate elimination");

        // 3. Token normalization, then numeric coercion
        self.coerce(&mut rows);

        // 4. Clamp raw inputs, derive, clamp derived values
        self.clamp(&mut rows, ClampPhase::BeforeDerivation, &mut report);
        for derivation in &rules.derivations {
            for row in rows.iter_mut() {
                apply_derivation(derivation, row);
            }
        }
        self.clamp(&mut rows, ClampPhase::AfterDerivation, &mut report);

        // 5. Whole-batch invariants, first failure wins
        self.check(&rows)?;

        // 6. Anything still missing (e.g. failed coercion) goes now
        let mut columns = batch.columns.clone();
        for column in rules.output_columns() {
            if !columns.contains(&column) {
                columns.push(column);
            }
        }
        let before = rows.len();
        rows.retain(|row| columns.iter().all(|c| !cell(row, c).is_missing()));
        report.swept = before - rows.len();
        report.rows_out = rows.len();

        if rows.is_empty() {
            warn!(entity = %rules.entity, "no rows survived cleaning");
            return Err(Rejection::NoData);
        }

        debug!(entity = %rules.entity, "{}", report.summary());

        Ok(CleanedBatch {
            columns,
            rows,
            report,
        })
    }

    fn coerce(&self, rows: &mut [Row]) {
        for row in rows.iter_mut() {
            for norm in &self.rules.normalizations {
                let Some(value) = row.get_mut(&norm.column) else {
                    continue;
                };
                let token = match value {
                    Value::Text(raw) => raw.trim().to_lowercase(),
                    _ => continue,
                };
                *value = match norm.replacements.iter().find(|(t, _)| *t == token) {
                    Some((_, replacement)) => Value::Number(*replacement),
                    None => Value::Text(token),
                };
            }
            for column in &self.rules.numeric_columns {
                if let Some(value) = row.get_mut(column) {
                    *value = value.coerce_numeric();
                }
            }
        }
    }

    fn clamp(&self, rows: &mut [Row], phase: ClampPhase, report: &mut CleaningReport) {
        for rule in self.rules.clamps.iter().filter(|r| r.phase == phase) {
            if rule.policy == ClampPolicy::IfAnyOutOfRange && !any_out_of_range(rows, rule) {
                continue;
            }

            let mut changed = 0;
            for row in rows.iter_mut() {
                if let Some(value) = row.get_mut(&rule.column) {
                    if let Some(v) = value.as_f64() {
                        let clamped = rule.apply(v);
                        if clamped != v {
                            *value = Value::Number(clamped);
                            changed += 1;
                        }
                    }
                }
            }

            if changed > 0 {
                debug!(column = %rule.column, changed, "clamped");
                *report.clamped.entry(rule.column.clone()).or_insert(0) += changed;
            }
        }
    }

    fn check(&self, rows: &[Row]) -> Result<(), Rejection> {
        for check in &self.rules.checks {
            let passed = match &check.kind {
                CheckKind::WithinRange {
                    column,
                    min,
                    max,
                    allow_missing,
                } => rows.iter().all(|row| match cell(row, column).as_f64() {
                    Some(v) => v >= *min && v <= *max,
                    None => *allow_missing,
                }),
                CheckKind::NoMissing { columns } => rows
                    .iter()
                    .all(|row| columns.iter().all(|c| !cell(row, c).is_missing())),
                CheckKind::UniqueKey { column } => {
                    let mut seen = HashSet::new();
                    rows.iter()
                        .filter_map(|row| cell(row, column).as_key())
                        .all(|key| seen.insert(key))
                }
                CheckKind::MaxAtMost { column, limit } => rows
                    .iter()
                    .filter_map(|row| cell(row, column).as_f64())
                    .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.max(v))))
                    .map_or(true, |max| max <= *limit),
            };

            if !passed {
                warn!(entity = %self.rules.entity, check = %check.name, "batch rejected: {}", check.message);
                return Err(Rejection::CheckFailed {
                    check: check.name.clone(),
                    message: check.message.clone(),
                });
            }
        }
        Ok(())
    }
}

fn any_out_of_range(rows: &[Row], rule: &ClampRule) -> bool {
    rows.iter()
        .filter_map(|row| cell(row, &rule.column).as_f64())
        .any(|v| rule.is_out_of_range(v))
}

/// Compute one derived field. Missing inputs give a missing output.
fn apply_derivation(derivation: &Derivation, row: &mut Row) {
    let value = match derivation {
        Derivation::Offset { column, amount } => match cell(row, column).as_f64() {
            Some(v) => Value::Number(v + amount),
            None => Value::Null,
        },
        Derivation::Mean { inputs, .. } => {
            let values: Option<Vec<f64>> = inputs.iter().map(|c| cell(row, c).as_f64()).collect();
            match values {
                Some(vs) if !vs.is_empty() => {
                    Value::Number(vs.iter().sum::<f64>() / vs.len() as f64)
                }
                _ => Value::Null,
            }
        }
        Derivation::Scale {
            input,
            divide_by,
            multiply_by,
            ..
        } => match cell(row, input).as_f64() {
            Some(v) => Value::number(v / divide_by * multiply_by),
            None => Value::Null,
        },
        Derivation::Classify {
            input,
            threshold,
            above,
            otherwise,
            ..
        } => match cell(row, input).as_f64() {
            Some(v) if v > *threshold => Value::Text(above.clone()),
            Some(_) => Value::Text(otherwise.clone()),
            None => Value::Null,
        },
    };
    row.insert(derivation.output().to_string(), value);
}

// ============================================================================
// TESTS
// ============================================================================
