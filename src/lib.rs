// Tabular ETL - Core Library
// Exposes all modules for use in the CLI and tests

pub mod analysis;
pub mod batch;
pub mod config;
pub mod db;
pub mod entities;
pub mod ingest;
pub mod loader;
pub mod logging;
pub mod pipeline;
pub mod rules;

// Re-export commonly used types
pub use analysis::{sales_summary, student_summary, CategorySales, SalesSummary, StudentSummary};
pub use batch::{Batch, Row, Value};
pub use config::{AppConfig, ProductSettings, StudentSettings};
pub use db::{
    count_rows, delete_product, delete_record, delete_student, get_all_products,
    get_all_students, get_recent_runs, get_students_by_status, insert_products, insert_run,
    insert_students, setup_database, IngestionRun,
};
pub use entities::{
    product_rules, student_rules, EntityKind, PriceCategory, Product, ResultStatus, Student,
};
pub use ingest::{batch_fingerprint, ingest, ingest_batch, IngestError, IngestOutcome};
pub use loader::{detect_format, get_reader, load_sources, SourceFormat, SourceReader};
pub use pipeline::{CleanedBatch, CleaningReport, Pipeline, Rejection};
pub use rules::{
    BatchCheck, CheckKind, ClampPhase, ClampPolicy, ClampRule, Derivation, RuleSet,
    TokenNormalization,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
