// 🎓 Student Entity - rule set + typed record
//
// mid scores get a fixed bonus before averaging; a "fail" GPA counts as 0.

use crate::batch::Row;
use crate::config::StudentSettings;
use crate::entities::{number_field, text_field};
use crate::rules::{ClampPhase, ClampPolicy, ClampRule, Derivation, RuleSet, TokenNormalization};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const KEY_COLUMN: &str = "sid";

pub const COLUMNS: &[&str] = &["sid", "name", "mid1", "mid2", "semester", "gpa"];

/// GPA literal that stands for a zero grade
pub const FAIL_TOKEN: &str = "fail";

// ============================================================================
// RESULT STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultStatus {
    Pass,
    Fail,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Pass => "pass",
            ResultStatus::Fail => "fail",
        }
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResultStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pass" => Ok(ResultStatus::Pass),
            "fail" => Ok(ResultStatus::Fail),
            other => bail!("unknown result status '{}'", other),
        }
    }
}

// ============================================================================
// RULES
// ============================================================================

pub fn student_rules(settings: &StudentSettings) -> RuleSet {
    let col = |s: &str| s.to_string();
    let non_negative = |column: &str| ClampRule {
        column: column.to_string(),
        lower: Some(0.0),
        upper: None,
        policy: ClampPolicy::IfAnyOutOfRange,
        phase: ClampPhase::BeforeDerivation,
    };

    RuleSet {
        entity: "student".to_string(),
        key_column: col(KEY_COLUMN),
        required_columns: COLUMNS.iter().map(|c| c.to_string()).collect(),
        numeric_columns: vec![col("mid1"), col("mid2"), col("semester"), col("gpa")],
        normalizations: vec![TokenNormalization {
            column: col("gpa"),
            replacements: vec![(FAIL_TOKEN.to_string(), 0.0)],
        }],
        derivations: vec![
            Derivation::Offset {
                column: col("mid1"),
                amount: settings.mid_bonus,
            },
            Derivation::Offset {
                column: col("mid2"),
                amount: settings.mid_bonus,
            },
            Derivation::Mean {
                inputs: vec![col("mid1"), col("mid2")],
                output: col("mid_avg"),
            },
            Derivation::Scale {
                input: col("gpa"),
                output: col("percentage"),
                divide_by: 10.0,
                multiply_by: 100.0,
            },
            Derivation::Classify {
                input: col("gpa"),
                output: col("status"),
                threshold: settings.pass_gpa_threshold,
                above: ResultStatus::Pass.as_str().to_string(),
                otherwise: ResultStatus::Fail.as_str().to_string(),
            },
        ],
        clamps: vec![non_negative("mid1"), non_negative("mid2")],
        checks: vec![],
    }
}

// ============================================================================
// STUDENT RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub sid: String,
    pub name: String,
    /// Includes the bonus
    pub mid1: f64,
    /// Includes the bonus
    pub mid2: f64,
    pub mid_avg: f64,
    pub semester: f64,
    pub gpa: f64,
    pub percentage: f64,
    pub status: ResultStatus,
}

impl Student {
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Student {
            sid: text_field(row, "sid")?,
            name: text_field(row, "name")?,
            mid1: number_field(row, "mid1")?,
            mid2: number_field(row, "mid2")?,
            mid_avg: number_field(row, "mid_avg")?,
            semester: number_field(row, "semester")?,
            gpa: number_field(row, "gpa")?,
            percentage: number_field(row, "percentage")?,
            status: text_field(row, "status")?.parse()?,
        })
    }

    pub fn passed(&self) -> bool {
        self.status == ResultStatus::Pass
    }
}

// ============================================================================
// TESTS
// ============================================================================
