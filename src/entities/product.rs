// 📦 Product Entity - rule set + typed record
//
// price_in_inr = price_in_dollar * rate
// price_category = Expensive if price_in_inr > threshold else Cheap

use crate::batch::Row;
use crate::config::{ProductSettings, MAX_RETURN_RATE};
use crate::entities::{number_field, text_field};
use crate::rules::{
    BatchCheck, CheckKind, ClampPhase, ClampPolicy, ClampRule, Derivation, RuleSet,
};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const KEY_COLUMN: &str = "pid";

pub const COLUMNS: &[&str] = &[
    "pid",
    "product_name",
    "category",
    "price_in_dollar",
    "quantity",
    "return_rate",
    "uid",
    "user_name",
    "branch",
];

// ============================================================================
// PRICE CATEGORY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceCategory {
    Cheap,
    Expensive,
}

impl PriceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceCategory::Cheap => "Cheap",
            PriceCategory::Expensive => "Expensive",
        }
    }
}

impl fmt::Display for PriceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PriceCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Cheap" => Ok(PriceCategory::Cheap),
            "Expensive" => Ok(PriceCategory::Expensive),
            other => bail!("unknown price category '{}'", other),
        }
    }
}

// ============================================================================
// RULES
// ============================================================================

pub fn product_rules(settings: &ProductSettings) -> RuleSet {
    let col = |s: &str| s.to_string();

    RuleSet {
        entity: "product".to_string(),
        key_column: col(KEY_COLUMN),
        required_columns: COLUMNS.iter().map(|c| c.to_string()).collect(),
        numeric_columns: vec![col("price_in_dollar"), col("quantity"), col("return_rate")],
        normalizations: vec![],
        derivations: vec![
            Derivation::Scale {
                input: col("price_in_dollar"),
                output: col("price_in_inr"),
                divide_by: 1.0,
                multiply_by: settings.usd_to_inr_rate,
            },
            Derivation::Classify {
                input: col("price_in_inr"),
                output: col("price_category"),
                threshold: settings.expensive_threshold_inr,
                above: PriceCategory::Expensive.as_str().to_string(),
                otherwise: PriceCategory::Cheap.as_str().to_string(),
            },
        ],
        clamps: vec![
            ClampRule {
                column: col("quantity"),
                lower: Some(0.0),
                upper: None,
                policy: ClampPolicy::Always,
                phase: ClampPhase::AfterDerivation,
            },
            ClampRule {
                column: col("return_rate"),
                lower: Some(0.0),
                upper: Some(MAX_RETURN_RATE),
                policy: ClampPolicy::Always,
                phase: ClampPhase::AfterDerivation,
            },
        ],
        checks: vec![
            BatchCheck::new(
                "price_range",
                CheckKind::WithinRange {
                    column: col("price_in_dollar"),
                    min: 0.0,
                    max: settings.max_price_usd,
                    allow_missing: false,
                },
                "Price in dollar is out of expected range.",
            ),
            BatchCheck::new(
                "quantity_range",
                CheckKind::WithinRange {
                    column: col("quantity"),
                    min: 0.0,
                    max: settings.max_quantity,
                    allow_missing: false,
                },
                "Quantity is out of expected range.",
            ),
            BatchCheck::new(
                "critical_fields",
                CheckKind::NoMissing {
                    columns: vec![col("pid"), col("price_in_dollar"), col("quantity")],
                },
                "Missing critical data (pid, price_in_dollar, quantity).",
            ),
            BatchCheck::new(
                "duplicate_pid",
                CheckKind::UniqueKey { column: col(KEY_COLUMN) },
                "Duplicate entries found based on pid.",
            ),
            BatchCheck::new(
                "price_outlier",
                CheckKind::MaxAtMost {
                    column: col("price_in_dollar"),
                    limit: settings.max_price_usd,
                },
                "Outlier detected in price_in_dollar.",
            ),
            BatchCheck::new(
                "return_rate_range",
                CheckKind::WithinRange {
                    column: col("return_rate"),
                    min: 0.0,
                    max: MAX_RETURN_RATE,
                    allow_missing: false,
                },
                "Return rate is out of expected range (0-100).",
            ),
        ],
    }
}

// ============================================================================
// PRODUCT RECORD
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub pid: String,
    pub product_name: String,
    pub category: String,
    pub price_in_dollar: f64,
    pub price_in_inr: f64,
    pub price_category: PriceCategory,
    pub quantity: i64,
    pub return_rate: f64,

    // Provenance
    pub uid: String,
    pub user_name: String,
    pub branch: String,
}

impl Product {
    /// Build from a cleaned row. Quantity drops its fractional part.
    pub fn from_row(row: &Row) -> Result<Self> {
        Ok(Product {
            pid: text_field(row, "pid")?,
            product_name: text_field(row, "product_name")?,
            category: text_field(row, "category")?,
            price_in_dollar: number_field(row, "price_in_dollar")?,
            price_in_inr: number_field(row, "price_in_inr")?,
            price_category: text_field(row, "price_category")?.parse()?,
            quantity: number_field(row, "quantity")?.trunc() as i64,
            return_rate: number_field(row, "return_rate")?,
            uid: text_field(row, "uid")?,
            user_name: text_field(row, "user_name")?,
            branch: text_field(row, "branch")?,
        })
    }

    /// Sales value in the target currency
    pub fn sales_value(&self) -> f64 {
        self.price_in_inr * self.quantity as f64
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{cell, Batch, Value};
    use crate::pipeline::{Pipeline, Rejection};

    fn header() -> Vec<String> {
        COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    fn record(pid: &str, category: Value, price: &str, qty: &str, rate: &str) -> Vec<Value> {
        vec![
            pid.into(),
            format!("Item {}", pid).into(),
            category,
            price.into(),
            qty.into(),
            rate.into(),
            "U1".into(),
            "Asha".into(),
            "Chennai".into(),
        ]
    }

    fn pipeline() -> Pipeline {
        Pipeline::new(product_rules(&ProductSettings::default())).unwrap()
    }

    #[test]
    fn test_rules_are_valid() {
        assert!(product_rules(&ProductSettings::default()).validate().is_ok());
    }

    #[test]
    fn test_conversion_and_tier() {
        let raw = Batch::from_records(
            header(),
            vec![
                record("P1", "Books".into(), "10", "3", "5"),
                record("P2", "Laptops".into(), "900", "1", "2.5"),
                record("P3", "Pens".into(), "60.24", "1", "0"),
            ],
        );

        let cleaned = pipeline().clean(&raw).unwrap();
        let products: Vec<Product> = cleaned
            .rows
            .iter()
            .map(|r| Product::from_row(r).unwrap())
            .collect();

        assert_eq!(products.len(), 3);
        for p in &products {
            assert!((p.price_in_inr - p.price_in_dollar * 83.0).abs() < 1e-9);
            let expected = if p.price_in_inr > 5000.0 {
                PriceCategory::Expensive
            } else {
                PriceCategory::Cheap
            };
            assert_eq!(p.price_category, expected);
        }
        assert_eq!(products[0].price_in_inr, 830.0);
        assert_eq!(products[1].price_category, PriceCategory::Expensive);
        // 60.24 * 83 = 4999.92, just under the threshold
        assert_eq!(products[2].price_category, PriceCategory::Cheap);
    }

    #[test]
    fn test_price_over_limit_rejects_batch() {
        let raw = Batch::from_records(
            header(),
            vec![
                record("P1", "Books".into(), "10", "3", "5"),
                record("P2", "Cars".into(), "15000", "1", "5"),
            ],
        );

        let err = pipeline().clean(&raw).unwrap_err();

        assert_eq!(err.code(), "price_range");
        assert_eq!(err.to_string(), "Price in dollar is out of expected range.");
    }

    #[test]
    fn test_quantity_over_limit_rejects_batch() {
        let raw = Batch::from_records(header(), vec![record("P1", "Books".into(), "10", "5000", "5")]);

        assert_eq!(pipeline().clean(&raw).unwrap_err().code(), "quantity_range");
    }

    #[test]
    fn test_negative_return_rate_and_quantity_are_clamped() {
        let raw = Batch::from_records(
            header(),
            vec![
                record("P1", "Books".into(), "10", "-4", "-5"),
                record("P2", "Books".into(), "12", "2", "140"),
            ],
        );

        let cleaned = pipeline().clean(&raw).unwrap();

        assert_eq!(cleaned.rows.len(), 2);
        assert_eq!(cell(&cleaned.rows[0], "return_rate"), &Value::Number(0.0));
        assert_eq!(cell(&cleaned.rows[0], "quantity"), &Value::Number(0.0));
        assert_eq!(cell(&cleaned.rows[1], "return_rate"), &Value::Number(100.0));
        assert_eq!(cleaned.report.clamped.get("return_rate"), Some(&2));
    }

    #[test]
    fn test_duplicate_pid_keeps_first() {
        let raw = Batch::from_records(
            header(),
            vec![
                record("P1", "Books".into(), "10", "1", "1"),
                record("P1", "Games".into(), "20", "2", "2"),
            ],
        );

        let cleaned = pipeline().clean(&raw).unwrap();

        assert_eq!(cleaned.rows.len(), 1);
        assert_eq!(cell(&cleaned.rows[0], "category"), &Value::from("Books"));
        assert_eq!(cleaned.report.dropped_duplicates, 1);
    }

    #[test]
    fn test_text_is_stored_verbatim() {
        let mut padded = record(" P1", " Books ".into(), "10", "1", "1");
        padded[1] = " Desk Lamp".into();
        let raw = Batch::from_records(
            header(),
            vec![padded, record("P1", "Books".into(), "12", "1", "1")],
        );

        let cleaned = pipeline().clean(&raw).unwrap();

        assert_eq!(cleaned.rows.len(), 2);
        assert_eq!(cleaned.report.dropped_duplicates, 0);
        let first = Product::from_row(&cleaned.rows[0]).unwrap();
        assert_eq!(first.pid, " P1");
        assert_eq!(first.product_name, " Desk Lamp");
        assert_eq!(first.category, " Books ");
    }

    #[test]
    fn test_null_category_drops_row() {
        let raw = Batch::from_records(
            header(),
            vec![
                record("P1", Value::Null, "10", "1", "1"),
                record("P2", "Games".into(), "20", "2", "2"),
            ],
        );

        let cleaned = pipeline().clean(&raw).unwrap();

        assert_eq!(cleaned.rows.len(), 1);
        assert_eq!(cell(&cleaned.rows[0], "pid"), &Value::from("P2"));
        assert_eq!(cleaned.report.dropped_missing, 1);
    }

    #[test]
    fn test_unparsable_price_fails_price_range() {
        let raw = Batch::from_records(
            header(),
            vec![
                record("P1", "Books".into(), "ten", "1", "1"),
                record("P2", "Games".into(), "20", "2", "2"),
            ],
        );

        let err = pipeline().clean(&raw).unwrap_err();
        assert_eq!(err.code(), "price_range");
        assert_eq!(err.to_string(), "Price in dollar is out of expected range.");
    }

    #[test]
    fn test_unparsable_quantity_fails_quantity_range() {
        let raw = Batch::from_records(
            header(),
            vec![
                record("P1", "Books".into(), "10", "many", "1"),
                record("P2", "Games".into(), "20", "2", "2"),
            ],
        );

        let err = pipeline().clean(&raw).unwrap_err();
        assert_eq!(err.code(), "quantity_range");
        assert_eq!(err.to_string(), "Quantity is out of expected range.");
    }

    #[test]
    fn test_unparsable_return_rate_fails_return_rate_range() {
        let raw = Batch::from_records(
            header(),
            vec![
                record("P1", "Books".into(), "10", "1", "high"),
                record("P2", "Games".into(), "20", "2", "2"),
            ],
        );

        assert_eq!(pipeline().clean(&raw).unwrap_err().code(), "return_rate_range");
    }

    #[test]
    fn test_checks_run_in_declared_order() {
        let names: Vec<_> = product_rules(&ProductSettings::default())
            .checks
            .iter()
            .map(|c| c.name.clone())
            .collect();
        assert_eq!(
            names,
            vec![
                "price_range",
                "quantity_range",
                "critical_fields",
                "duplicate_pid",
                "price_outlier",
                "return_rate_range",
            ]
        );
    }

    #[test]
    fn test_first_failed_check_decides_rejection() {
        // price and quantity both out of range
        let raw = Batch::from_records(
            header(),
            vec![
                record("P1", "Books".into(), "10", "5000", "1"),
                record("P2", "Cars".into(), "15000", "1", "1"),
            ],
        );
        assert_eq!(pipeline().clean(&raw).unwrap_err().code(), "price_range");

        // missing quantity together with a bad return rate
        let raw = Batch::from_records(
            header(),
            vec![
                record("P1", "Books".into(), "10", "many", "1"),
                record("P2", "Games".into(), "20", "2", "high"),
            ],
        );
        let err = pipeline().clean(&raw).unwrap_err();
        assert_eq!(err.code(), "quantity_range");
        assert_eq!(err.to_string(), "Quantity is out of expected range.");
    }

    #[test]
    fn test_custom_rate_from_settings() {
        let settings = ProductSettings {
            usd_to_inr_rate: 80.0,
            ..ProductSettings::default()
        };
        let pipeline = Pipeline::new(product_rules(&settings)).unwrap();
        let raw = Batch::from_records(header(), vec![record("P1", "Books".into(), "10", "1", "1")]);

        let cleaned = pipeline.clean(&raw).unwrap();
        assert_eq!(cell(&cleaned.rows[0], "price_in_inr"), &Value::Number(800.0));
    }

    #[test]
    fn test_from_row_truncates_quantity() {
        let raw = Batch::from_records(header(), vec![record("101", "Books".into(), "10", "2.7", "1")]);
        let cleaned = pipeline().clean(&raw).unwrap();

        let product = Product::from_row(&cleaned.rows[0]).unwrap();
        assert_eq!(product.quantity, 2);
        assert_eq!(product.pid, "101");
        assert_eq!(product.sales_value(), 1660.0);
    }

    #[test]
    fn test_empty_batch_is_no_data() {
        let raw = Batch::from_records(header(), vec![]);
        assert_eq!(pipeline().clean(&raw).unwrap_err(), Rejection::NoData);
    }
}
