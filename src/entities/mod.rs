// Entity Models - Product and Student
//
// Each entity contributes:
// - a declarative RuleSet for the shared cleaning pipeline
// - a typed record built from a cleaned row

pub mod product;
pub mod student;

pub use product::{product_rules, PriceCategory, Product};
pub use student::{student_rules, ResultStatus, Student};

use crate::batch::{cell, Row};
use crate::config::AppConfig;
use crate::rules::RuleSet;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Product,
    Student,
}

impl EntityKind {
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Product => "product",
            EntityKind::Student => "student",
        }
    }

    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Product => "products",
            EntityKind::Student => "students",
        }
    }

    pub fn key_column(&self) -> &'static str {
        match self {
            EntityKind::Product => product::KEY_COLUMN,
            EntityKind::Student => student::KEY_COLUMN,
        }
    }

    /// Built-in rules, unless the config points at a JSON rule set.
    pub fn rules(&self, config: &AppConfig) -> Result<RuleSet> {
        let (rules_file, built_in) = match self {
            EntityKind::Product => (&config.product.rules_file, product_rules(&config.product)),
            EntityKind::Student => (&config.student.rules_file, student_rules(&config.student)),
        };
        match rules_file {
            Some(path) => RuleSet::from_file(path),
            None => Ok(built_in),
        }
    }

    pub fn sources<'a>(&self, config: &'a AppConfig) -> &'a [PathBuf] {
        match self {
            EntityKind::Product => &config.product.sources,
            EntityKind::Student => &config.student.sources,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "product" | "products" => Ok(EntityKind::Product),
            "student" | "students" => Ok(EntityKind::Student),
            other => Err(format!("unknown entity '{}' (expected product or student)", other)),
        }
    }
}

// ============================================================================
// ROW ACCESSORS
// ============================================================================

/// Text column as stored; numbers render without a trailing `.0`.
pub(crate) fn text_field(row: &Row, column: &str) -> Result<String> {
    cell(row, column)
        .as_key()
        .ok_or_else(|| anyhow!("column '{}' is missing", column))
}

pub(crate) fn number_field(row: &Row, column: &str) -> Result<f64> {
    cell(row, column)
        .as_f64()
        .ok_or_else(|| anyhow!("column '{}' is not numeric", column))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_kind_parsing() {
        assert_eq!("Product".parse::<EntityKind>().unwrap(), EntityKind::Product);
        assert_eq!("students".parse::<EntityKind>().unwrap(), EntityKind::Student);
        assert!("teacher".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_rules_follow_config() {
        let mut config = AppConfig::default();
        config.student.mid_bonus = 5.0;

        let rules = EntityKind::Student.rules(&config).unwrap();
        assert_eq!(rules.key_column, "sid");
        assert!(rules.derivations.iter().any(|d| matches!(
            d,
            crate::rules::Derivation::Offset { amount, .. } if *amount == 5.0
        )));
        assert_eq!(EntityKind::Product.rules(&config).unwrap().key_column, "pid");
    }

    #[test]
    fn test_rules_file_overrides_built_in() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("student_rules.json");

        let mut custom = student_rules(&Default::default());
        custom.entity = "student-custom".to_string();
        std::fs::write(&path, serde_json::to_string(&custom).unwrap()).unwrap();

        let mut config = AppConfig::default();
        config.student.rules_file = Some(path);

        assert_eq!(EntityKind::Student.rules(&config).unwrap().entity, "student-custom");

        config.student.rules_file = Some(dir.path().join("absent.json"));
        assert!(EntityKind::Student.rules(&config).is_err());
    }
}
