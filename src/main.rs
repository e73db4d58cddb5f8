// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::PathBuf;

use tabular_etl::config::DEFAULT_CONFIG_PATH;
use tabular_etl::logging::init_logging;
use tabular_etl::{
    count_rows, delete_record, get_all_products, get_all_students, get_recent_runs,
    get_students_by_status, ingest, sales_summary, setup_database, student_summary, AppConfig,
    EntityKind, IngestError, ResultStatus,
};

#[derive(Parser)]
#[command(name = "tabular-etl", version, about = "Clean, validate and store tabular product and student data")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log every pipeline stage
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load, clean and store the configured sources for an entity
    Ingest {
        entity: EntityKind,
        /// Source files to use instead of the configured list
        #[arg(short, long = "source")]
        sources: Vec<PathBuf>,
    },
    /// Print stored records
    List {
        entity: EntityKind,
        /// Students only: pass or fail
        #[arg(long)]
        status: Option<ResultStatus>,
    },
    /// Delete one stored record by key (pid or sid)
    Delete { entity: EntityKind, key: String },
    /// Sales and result summaries over stored records
    Summary,
    /// Recent ingestion attempts
    Runs {
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },
    /// Print the active rule set as JSON
    Rules { entity: EntityKind },
    /// Browse stored records in the terminal
    View,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = AppConfig::load_or_default(&cli.config)?;

    if let Command::Rules { entity } = &cli.command {
        let rules = entity.rules(&config)?;
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }

    let conn = Connection::open(&config.database_path).with_context(|| {
        format!("Failed to open database '{}'", config.database_path.display())
    })?;
    setup_database(&conn)?;

    match cli.command {
        Command::Ingest { entity, sources } => {
            if !sources.is_empty() {
                match entity {
                    EntityKind::Product => config.product.sources = sources,
                    EntityKind::Student => config.student.sources = sources,
                }
            }
            run_ingest(&conn, entity, &config)
        }
        Command::List { entity, status } => run_list(&conn, entity, status),
        Command::Delete { entity, key } => run_delete(&conn, entity, &key),
        Command::Summary => run_summary(&conn),
        Command::Runs { limit } => run_runs(&conn, limit),
        Command::Rules { .. } => Ok(()),
        Command::View => run_ui_mode(&conn),
    }
}

fn run_ingest(conn: &Connection, entity: EntityKind, config: &AppConfig) -> Result<()> {
    println!("🗄️  Ingest {} - sources → clean → SQLite", entity);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    match ingest(conn, entity, config) {
        Ok(outcome) => {
            let report = &outcome.report;
            println!("\n📂 Rows loaded:          {}", report.rows_in);
            println!("🧹 Dropped (missing):    {}", report.dropped_missing);
            println!("🔁 Dropped (duplicate):  {}", report.dropped_duplicates);
            for (column, count) in &report.clamped {
                println!("📏 Clamped {:<13} {}", format!("{}:", column), count);
            }
            println!("🧽 Swept after derive:   {}", report.swept);
            println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            println!("✅ Stored {} {} rows (run {})", outcome.inserted, entity, outcome.run_id);
            Ok(())
        }
        Err(IngestError::Rejected(rejection)) => {
            eprintln!("\n❌ Batch rejected [{}]", rejection.code());
            eprintln!("   {}", rejection);
            std::process::exit(2);
        }
        Err(err) => Err(err.into()),
    }
}

fn run_list(conn: &Connection, entity: EntityKind, status: Option<ResultStatus>) -> Result<()> {
    match entity {
        EntityKind::Product => {
            if status.is_some() {
                bail!("--status only applies to students");
            }
            let products = get_all_products(conn)?;
            println!(
                "{:<8} {:<24} {:<14} {:>10} {:>12} {:<10} {:>6} {:>7}",
                "pid", "product", "category", "usd", "inr", "class", "qty", "return%"
            );
            for p in &products {
                println!(
                    "{:<8} {:<24} {:<14} {:>10.2} {:>12.2} {:<10} {:>6} {:>7.1}",
                    p.pid,
                    p.product_name,
                    p.category,
                    p.price_in_dollar,
                    p.price_in_inr,
                    p.price_category.as_str(),
                    p.quantity,
                    p.return_rate
                );
            }
            println!("\n{} products", products.len());
        }
        EntityKind::Student => {
            let students = match status {
                Some(status) => get_students_by_status(conn, status.as_str())?,
                None => get_all_students(conn)?,
            };
            println!(
                "{:<8} {:<20} {:>6} {:>6} {:>7} {:>8} {:>5} {:>7} {:<6}",
                "sid", "name", "mid1", "mid2", "mid_avg", "semester", "gpa", "pct", "result"
            );
            for s in &students {
                println!(
                    "{:<8} {:<20} {:>6.1} {:>6.1} {:>7.2} {:>8.1} {:>5.2} {:>7.1} {:<6}",
                    s.sid, s.name, s.mid1, s.mid2, s.mid_avg, s.semester, s.gpa, s.percentage, s.status.as_str()
                );
            }
            println!("\n{} students", students.len());
        }
    }
    Ok(())
}

fn run_delete(conn: &Connection, entity: EntityKind, key: &str) -> Result<()> {
    if delete_record(conn, entity, key)? {
        println!("🗑️  Deleted {} '{}'", entity, key);
    } else {
        println!("⚠️  No {} with {} '{}'", entity, entity.key_column(), key);
    }
    Ok(())
}

fn run_summary(conn: &Connection) -> Result<()> {
    let sales = sales_summary(&get_all_products(conn)?);
    let results = student_summary(&get_all_students(conn)?);

    println!("📊 Products");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", sales.summary());
    for category in &sales.by_category {
        println!("   {:<20} ₹{:>14.2}  ({} products)", category.category, category.sales, category.products);
    }

    println!("\n🎓 Students");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("{}", results.summary());
    if let Some(top) = &results.top_student {
        println!("   Top student: {} ({}, GPA {:.2})", top.name, top.sid, top.gpa);
    }
    Ok(())
}

fn run_runs(conn: &Connection, limit: usize) -> Result<()> {
    let runs = get_recent_runs(conn, limit)?;
    if runs.is_empty() {
        println!("No ingestion runs recorded yet");
        return Ok(());
    }

    for run in &runs {
        let marker = if run.accepted { "✅" } else { "❌" };
        println!(
            "{} {}  {:<8} {:>5} → {:<5} {}  {}",
            marker,
            run.timestamp.format("%Y-%m-%d %H:%M:%S"),
            run.entity,
            run.rows_in,
            run.rows_out,
            &run.fingerprint[..run.fingerprint.len().min(12)],
            run.reason.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode(conn: &Connection) -> Result<()> {
    println!("🖥️  Loading stored records...\n");

    let products = get_all_products(conn)?;
    let students = get_all_students(conn)?;
    let runs = get_recent_runs(conn, 50)?;
    println!(
        "✓ Loaded {} products and {} students ({} in store)\n",
        products.len(),
        students.len(),
        count_rows(conn, EntityKind::Product)? + count_rows(conn, EntityKind::Student)?
    );

    let mut app = ui::App::new(products, students, runs);
    ui::run_ui(&mut app)?;

    println!("\n✅ Viewer closed");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_conn: &Connection) -> Result<()> {
    eprintln!("❌ Terminal viewer not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use: tabular-etl list <product|student>");
    std::process::exit(1);
}
