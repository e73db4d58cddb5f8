// 🏷️ Cleaning Rules - Rules as Data
// One declarative rule set per entity drives the shared cleaning pipeline.

use anyhow::{bail, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Textual clean-up applied to a column before numeric coercion.
///
/// The cell is trimmed and lowercased, then any exact match in
/// `replacements` is swapped for its numeric stand-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenNormalization {
    pub column: String,
    pub replacements: Vec<(String, f64)>,
}

// ============================================================================
// DERIVATION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Derivation {
    /// `column += amount`, in place
    Offset { column: String, amount: f64 },

    /// `output = mean(inputs)`
    Mean { inputs: Vec<String>, output: String },

    /// `output = input / divide_by * multiply_by`
    Scale {
        input: String,
        output: String,
        divide_by: f64,
        multiply_by: f64,
    },

    /// `output = above if input > threshold else otherwise`
    Classify {
        input: String,
        output: String,
        threshold: f64,
        above: String,
        otherwise: String,
    },
}

impl Derivation {
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            Derivation::Offset { column, .. } => vec![column.as_str()],
            Derivation::Mean { inputs, .. } => inputs.iter().map(String::as_str).collect(),
            Derivation::Scale { input, .. } | Derivation::Classify { input, .. } => {
                vec![input.as_str()]
            }
        }
    }

    pub fn output(&self) -> &str {
        match self {
            Derivation::Offset { column, .. } => column,
            Derivation::Mean { output, .. }
            | Derivation::Scale { output, .. }
            | Derivation::Classify { output, .. } => output,
        }
    }
}

// ============================================================================
// CLAMP
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClampPolicy {
    /// Clip every value in the column
    Always,
    /// Clip only when at least one value in the column is out of range
    IfAnyOutOfRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClampPhase {
    BeforeDerivation,
    AfterDerivation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClampRule {
    pub column: String,
    pub lower: Option<f64>,
    pub upper: Option<f64>,
    pub policy: ClampPolicy,
    pub phase: ClampPhase,
}

impl ClampRule {
    pub fn is_out_of_range(&self, v: f64) -> bool {
        self.lower.is_some_and(|lo| v < lo) || self.upper.is_some_and(|hi| v > hi)
    }

    pub fn apply(&self, v: f64) -> f64 {
        let mut out = v;
        if let Some(lo) = self.lower {
            out = out.max(lo);
        }
        if let Some(hi) = self.upper {
            out = out.min(hi);
        }
        out
    }
}

// ============================================================================
// BATCH CHECKS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CheckKind {
    /// Every value lies in `[min, max]`. A missing value fails the check
    /// unless `allow_missing` is set.
    WithinRange {
        column: String,
        min: f64,
        max: f64,
        #[serde(default)]
        allow_missing: bool,
    },
    /// None of the columns has a missing value in any row
    NoMissing { columns: Vec<String> },
    /// No key repeats
    UniqueKey { column: String },
    /// Column maximum does not exceed `limit`
    MaxAtMost { column: String, limit: f64 },
}

/// Whole-batch invariant. The first failing check rejects the batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchCheck {
    pub name: String,
    pub kind: CheckKind,
    pub message: String,
}

impl BatchCheck {
    pub fn new(name: &str, kind: CheckKind, message: &str) -> Self {
        BatchCheck {
            name: name.to_string(),
            kind,
            message: message.to_string(),
        }
    }
}

// ============================================================================
// RULE SET
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Entity label used in logs and run records
    pub entity: String,

    /// Unique identifier column
    pub key_column: String,

    /// Columns the incoming batch must carry
    pub required_columns: Vec<String>,

    /// Columns parsed to numbers (unparsable → missing)
    pub numeric_columns: Vec<String>,

    #[serde(default)]
    pub normalizations: Vec<TokenNormalization>,

    #[serde(default)]
    pub derivations: Vec<Derivation>,

    #[serde(default)]
    pub clamps: Vec<ClampRule>,

    #[serde(default)]
    pub checks: Vec<BatchCheck>,
}

impl RuleSet {
    /// Load a rule set from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read rules file: {:?}", path.as_ref()))?;

        let rules: RuleSet =
            serde_json::from_str(&content).context("Failed to parse rules JSON")?;

        rules.validate()?;
        Ok(rules)
    }

    /// All columns a cleaned row carries: the required inputs plus derived outputs.
    pub fn output_columns(&self) -> Vec<String> {
        let mut columns = self.required_columns.clone();
        for derivation in &self.derivations {
            let out = derivation.output().to_string();
            if !columns.contains(&out) {
                columns.push(out);
            }
        }
        columns
    }

    /// Check that every rule only touches columns that exist by the time it runs.
    pub fn validate(&self) -> Result<()> {
        let declared = |c: &str| self.required_columns.iter().any(|r| r == c);

        if !declared(&self.key_column) {
            bail!("key column '{}' is not a required column", self.key_column);
        }
        for column in &self.numeric_columns {
            if !declared(column) {
                bail!("numeric column '{}' is not a required column", column);
            }
        }
        for norm in &self.normalizations {
            if !self.numeric_columns.contains(&norm.column) {
                bail!("normalized column '{}' is not numeric", norm.column);
            }
        }

        let mut available: Vec<String> = self.required_columns.clone();
        for derivation in &self.derivations {
            if let Derivation::Scale {
                output,
                divide_by,
                multiply_by,
                ..
            } = derivation
            {
                if *divide_by == 0.0 || !divide_by.is_finite() || !multiply_by.is_finite() {
                    bail!(
                        "scale into '{}' needs a finite, non-zero divisor and a finite factor",
                        output
                    );
                }
            }
            for input in derivation.inputs() {
                if !available.iter().any(|c| c == input) {
                    bail!(
                        "derivation of '{}' reads '{}' before it exists",
                        derivation.output(),
                        input
                    );
                }
            }
            available.push(derivation.output().to_string());
        }

        for clamp in &self.clamps {
            let known = match clamp.phase {
                ClampPhase::BeforeDerivation => declared(&clamp.column),
                ClampPhase::AfterDerivation => available.contains(&clamp.column),
            };
            if !known {
                bail!("clamp targets unknown column '{}'", clamp.column);
            }
        }

        for check in &self.checks {
            let columns: Vec<&str> = match &check.kind {
                CheckKind::WithinRange { column, .. }
                | CheckKind::UniqueKey { column }
                | CheckKind::MaxAtMost { column, .. } => vec![column.as_str()],
                CheckKind::NoMissing { columns } => columns.iter().map(String::as_str).collect(),
            };
            for column in columns {
                if !available.iter().any(|c| c == column) {
                    bail!("check '{}' references unknown column '{}'", check.name, column);
                }
            }
        }

        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================
