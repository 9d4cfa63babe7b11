// Entry point and high-level CLI flow.
//
// - Bulk mode (default): load part numbers from a CSV, query manufacturing,
//   sales and cost history and write a multi-sheet report.
// - `--part PN`: fold the three histories of one part into a summary with
//   derived margins and risk tiers, rendered as text or JSON.
// - `--match`: look each part up in the item master next to its latest
//   sales order.
// - `--init-db`: create the ERP tables in an empty database and exit.
mod config;
mod db;
mod error;
mod loader;
mod logging;
mod output;
mod reports;
mod rollup;
mod sqlite;
mod summary;
mod types;
mod util;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use config::ReportConfig;
use db::HistoryQueries;
use error::ReportError;
use sqlite::SqliteSource;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};
use util::format_int;

/// Check part manufacturing and sales history against the ERP database
#[derive(Parser, Debug)]
#[command(name = "part-history")]
#[command(about = "Check part manufacturing and sales history against the ERP database")]
struct Args {
    /// CSV file containing part numbers (optional with --part)
    #[arg(required_unless_present_any = ["part", "init_db"])]
    csv_file: Option<PathBuf>,

    /// Column holding the part numbers
    #[arg(short = 'c', long, default_value = "part_number")]
    column: String,

    /// Column holding the quoted revision
    #[arg(long, default_value = "revision")]
    rev_column: String,

    /// Column holding the quoted quantity
    #[arg(long, default_value = "quantity")]
    qty_column: String,

    /// Output directory (bulk mode) or file (--part, --match)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,

    /// Years of history to retrieve
    #[arg(short = 'y', long)]
    years: Option<u32>,

    /// Generate a detailed summary for one part number
    #[arg(short = 'p', long)]
    part: Option<String>,

    /// Render the part summary as JSON instead of text
    #[arg(long, requires = "part")]
    json: bool,

    /// Write the item-master match list instead of the history report
    #[arg(long = "match", conflicts_with = "part")]
    match_parts: bool,

    /// SQLite database holding the ERP tables
    #[arg(long, env = "PART_HISTORY_DB", default_value = "data/m2m.db")]
    db: PathBuf,

    /// Create any missing ERP tables in --db and exit
    #[arg(long, conflicts_with_all = ["part", "match_parts"])]
    init_db: bool,

    /// JSON file overriding report thresholds and defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum part numbers per query
    #[arg(long)]
    batch_size: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Disable logging to file
    #[arg(long)]
    no_log_file: bool,

    /// Directory for timestamped log files
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,
}

fn load_config(args: &Args) -> Result<ReportConfig> {
    let mut config = match &args.config {
        Some(path) => ReportConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ReportConfig::default(),
    };
    if let Some(years) = args.years {
        config.lookback_years = years;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    config.validate()?;
    Ok(config)
}

fn default_report_dir() -> PathBuf {
    Path::new("output").join(format!(
        "part_history_{}",
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

/// The `--part` argument as the loader would key it, or `None` when blank.
fn requested_part(args: &Args) -> Option<String> {
    util::non_empty(args.part.as_deref())
}

/// Handle `--part`: summary for a single part number.
fn handle_part_summary(
    args: &Args,
    config: &ReportConfig,
    as_of: NaiveDate,
    part: &str,
) -> Result<()> {
    let rfq_table = match &args.csv_file {
        Some(path) => {
            loader::load_rfq_table(path, &args.column, &args.rev_column, &args.qty_column)?
        }
        None => HashMap::new(),
    };

    println!("\nGenerating detailed summary for part {}...", part);
    let source = SqliteSource::open(&args.db)?;
    let queries = HistoryQueries::new(&source, config, as_of);
    let history = queries.part_history(part);
    source.close();
    let history = history?;

    let summary = summary::summarize(part, &history, rfq_table.get(part), config, as_of);
    let rendered = if args.json {
        serde_json::to_string_pretty(&summary)?
    } else {
        summary::render_text(&summary, config)
    };

    match &args.output {
        Some(path) => {
            output::write_text(path, &rendered)?;
            println!("\nDone! Output saved to '{}'", path.display());
        }
        None => println!("{}", rendered),
    }
    info!("Part summary generated for {}", part);
    Ok(())
}

/// Handle the default mode: three history sheets plus a summary sheet.
fn handle_bulk_report(
    queries: &HistoryQueries<'_, SqliteSource>,
    args: &Args,
    parts: &[String],
) -> Result<()> {
    println!("\nQuerying database for part history...");
    let report = queries.report(parts)?;

    let dir = args.output.clone().unwrap_or_else(default_report_dir);
    let files = output::write_report(&dir, &report)?;

    println!("\nPart History Summary\n");
    output::preview_table_rows(&report.summary_rows(), 3);
    for file in &files {
        println!("  {}", file.display());
    }
    info!("Process completed successfully");
    println!("\nDone! Output saved to '{}'", dir.display());
    Ok(())
}

/// Handle `--match`: item-master rows with each part's latest sales order.
fn handle_match(
    queries: &HistoryQueries<'_, SqliteSource>,
    args: &Args,
    parts: &[String],
) -> Result<()> {
    let rows = queries.part_matches(parts)?;
    let matched: HashSet<&str> = rows.iter().map(|r| r.part_number.as_str()).collect();

    let path = args
        .output
        .clone()
        .unwrap_or_else(|| Path::new("output").join("matched_parts.csv"));
    info!("Saving {} records to {}", rows.len(), path.display());
    output::write_csv(&path, &rows)?;

    println!(
        "\nMatched {} of {} part numbers ({} item-master rows)\n",
        format_int(matched.len()),
        format_int(parts.len()),
        format_int(rows.len())
    );
    output::preview_table_rows(&rows, 5);
    println!("Done! Output saved to '{}'", path.display());
    Ok(())
}

fn run(args: &Args) -> Result<()> {
    let config = load_config(args)?;
    let as_of = Local::now().date_naive();
    info!("Starting part history check process");

    if args.init_db {
        sqlite::bootstrap(&args.db)?;
        println!("Database ready at '{}'", args.db.display());
        return Ok(());
    }

    if args.part.is_some() {
        let part = requested_part(args)
            .ok_or_else(|| ReportError::Config("--part must not be blank".into()))?;
        return handle_part_summary(args, &config, as_of, &part);
    }

    let csv_path = args
        .csv_file
        .as_deref()
        .context("a CSV file of part numbers is required")?;
    let (parts, load_report) = loader::load_part_numbers(csv_path, &args.column)?;
    println!(
        "Loaded {} rows, {} unique part numbers ({} blank)",
        format_int(load_report.total_rows),
        format_int(load_report.unique_parts),
        format_int(load_report.blank_rows)
    );
    if parts.is_empty() {
        warn!("No part numbers found in the CSV file");
        println!("\nWarning: No part numbers found in the CSV file");
        return Ok(());
    }

    let source = SqliteSource::open(&args.db)?;
    let queries = HistoryQueries::new(&source, &config, as_of);
    let result = if args.match_parts {
        handle_match(&queries, args, &parts)
    } else {
        handle_bulk_report(&queries, args, &parts)
    };
    source.close();
    result
}

fn main() -> ExitCode {
    let args = Args::parse();

    let log_dir = (!args.no_log_file).then_some(args.log_dir.as_path());
    match logging::init(&args.log_level, log_dir) {
        Ok(Some(path)) => info!("Logging to {}", path.display()),
        Ok(None) => {}
        Err(e) => {
            eprintln!("Could not open log file: {}", e);
            let _ = logging::init(&args.log_level, None);
        }
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<ReportError>() {
                Some(re) if re.is_input_error() => {
                    error!("{}", re);
                    println!("\nError: {}", re);
                }
                _ => {
                    error!("Unexpected error: {:#}", e);
                    println!("\nError: An unexpected error occurred. See log for details.");
                }
            }
            ExitCode::FAILURE
        }
    }
}
