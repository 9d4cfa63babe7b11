use crate::error::ReportResult;
use crate::reports::HistoryReport;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};
use tracing::{error, info};

fn ensure_parent(path: &Path) -> ReportResult<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    Ok(())
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> ReportResult<()> {
    ensure_parent(path)?;
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_text(path: &Path, text: &str) -> ReportResult<()> {
    ensure_parent(path)?;
    fs::write(path, text)?;
    Ok(())
}

fn write_sheets(dir: &Path, report: &HistoryReport) -> ReportResult<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    let summary = dir.join("summary.csv");
    write_csv(&summary, &report.summary_rows())?;
    written.push(summary);

    if !report.manufacturing.is_empty() {
        let path = dir.join("manufacturing_history.csv");
        write_csv(&path, &report.manufacturing)?;
        written.push(path);
    }
    if !report.sales.is_empty() {
        let path = dir.join("sales_history.csv");
        write_csv(&path, &report.sales)?;
        written.push(path);
    }
    if !report.costs.is_empty() {
        let path = dir.join("cost_analysis.csv");
        write_csv(&path, &report.costs)?;
        written.push(path);
    }
    Ok(written)
}

/// Write the bulk report as one CSV per sheet under `dir`. The summary
/// sheet is always written; empty data sheets are skipped.
pub fn write_report(dir: &Path, report: &HistoryReport) -> ReportResult<Vec<PathBuf>> {
    info!("Saving results to {}", dir.display());
    let result = write_sheets(dir, report);
    match &result {
        Ok(files) => info!("Results successfully saved ({} sheets)", files.len()),
        Err(e) => error!("Failed to save results: {}", e),
    }
    result
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().cloned().take(max_rows).collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}
