// ⚙️ Configuration - TOML file with named defaults for every rule constant

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DEFAULT_CONFIG_PATH: &str = "etl.toml";
pub const DEFAULT_DATABASE_PATH: &str = "etl.db";

pub const USD_TO_INR_RATE: f64 = 83.0;
pub const EXPENSIVE_THRESHOLD_INR: f64 = 5000.0;
pub const MAX_PRICE_USD: f64 = 10000.0;
pub const MAX_QUANTITY: f64 = 1000.0;
pub const MAX_RETURN_RATE: f64 = 100.0;

pub const MID_BONUS: f64 = 10.0;
pub const PASS_GPA_THRESHOLD: f64 = 6.0;

// ============================================================================
// ENTITY SETTINGS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductSettings {
    pub usd_to_inr_rate: f64,
    pub expensive_threshold_inr: f64,
    pub max_price_usd: f64,
    pub max_quantity: f64,
    pub sources: Vec<PathBuf>,
    /// JSON rule set replacing the built-in product rules
    pub rules_file: Option<PathBuf>,
}

impl Default for ProductSettings {
    fn default() -> Self {
        ProductSettings {
            usd_to_inr_rate: USD_TO_INR_RATE,
            expensive_threshold_inr: EXPENSIVE_THRESHOLD_INR,
            max_price_usd: MAX_PRICE_USD,
            max_quantity: MAX_QUANTITY,
            sources: Vec::new(),
            rules_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudentSettings {
    pub mid_bonus: f64,
    pub pass_gpa_threshold: f64,
    pub sources: Vec<PathBuf>,
    /// JSON rule set replacing the built-in student rules
    pub rules_file: Option<PathBuf>,
}

impl Default for StudentSettings {
    fn default() -> Self {
        StudentSettings {
            mid_bonus: MID_BONUS,
            pass_gpa_threshold: PASS_GPA_THRESHOLD,
            sources: Vec::new(),
            rules_file: None,
        }
    }
}

// ============================================================================
// APP CONFIG
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database_path: PathBuf,
    pub product: ProductSettings,
    pub student: StudentSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            product: ProductSettings::default(),
            student: StudentSettings::default(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
        let config: AppConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file '{}'", path.display()))?;
        Ok(config)
    }

    /// Use the file when it exists, built-in defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            info!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_falls_back_to_constants() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etl.toml");
        fs::write(
            &path,
            r#"
database_path = "data/store.db"

[product]
usd_to_inr_rate = 84.5
sources = ["data/f1.csv", "data/f2.xlsx"]
"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();

        assert_eq!(config.database_path, PathBuf::from("data/store.db"));
        assert_eq!(config.product.usd_to_inr_rate, 84.5);
        assert_eq!(config.product.expensive_threshold_inr, EXPENSIVE_THRESHOLD_INR);
        assert_eq!(config.product.sources.len(), 2);
        assert_eq!(config.student, StudentSettings::default());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("etl.toml");
        fs::write(&path, "database_path = [").unwrap();

        let err = AppConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
