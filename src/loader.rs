use crate::error::{ReportError, ReportResult};
use crate::types::RfqEntry;
use crate::util::{non_empty, parse_f64_safe};
use csv::{ReaderBuilder, StringRecord};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct LoadReport {
    pub total_rows: usize,
    pub unique_parts: usize,
    pub blank_rows: usize,
}

fn open(path: &Path) -> ReportResult<(csv::Reader<std::fs::File>, StringRecord)> {
    info!("Loading data from {}", path.display());
    if !path.exists() {
        error!("CSV file not found: {}", path.display());
        return Err(ReportError::InputNotFound(path.to_path_buf()));
    }
    let mut rdr = ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = rdr.headers()?.clone();
    Ok((rdr, headers))
}

fn column_index(headers: &StringRecord, column: &str) -> Option<usize> {
    headers.iter().position(|h| h.trim() == column)
}

fn require_column(headers: &StringRecord, column: &str) -> ReportResult<usize> {
    column_index(headers, column).ok_or_else(|| {
        let available = headers.iter().collect::<Vec<_>>().join(", ");
        error!("Column '{}' not found. Available: {}", column, available);
        ReportError::MissingColumn {
            column: column.to_string(),
            available,
        }
    })
}

/// Read the identifier column, dropping blanks and keeping the first
/// occurrence of each part number in file order.
pub fn load_part_numbers(path: &Path, column: &str) -> ReportResult<(Vec<String>, LoadReport)> {
    let (mut rdr, headers) = open(path)?;
    let idx = require_column(&headers, column)?;

    let mut seen: HashSet<String> = HashSet::new();
    let mut parts = Vec::new();
    let mut total_rows = 0usize;
    let mut blank_rows = 0usize;
    for record in rdr.records() {
        let record = record?;
        total_rows += 1;
        let Some(part) = non_empty(record.get(idx)) else {
            blank_rows += 1;
            continue;
        };
        if seen.insert(part.clone()) {
            parts.push(part);
        }
    }

    info!(
        "Loaded {} rows, found {} unique part numbers",
        total_rows,
        parts.len()
    );
    let report = LoadReport {
        total_rows,
        unique_parts: parts.len(),
        blank_rows,
    };
    Ok((parts, report))
}

/// Build the RFQ lookup keyed by part number. The revision and quantity
/// columns are optional; when a column is absent its value is simply
/// unavailable. The first row for a part wins.
pub fn load_rfq_table(
    path: &Path,
    part_column: &str,
    revision_column: &str,
    quantity_column: &str,
) -> ReportResult<HashMap<String, RfqEntry>> {
    let (mut rdr, headers) = open(path)?;
    let part_idx = require_column(&headers, part_column)?;
    let rev_idx = column_index(&headers, revision_column);
    let qty_idx = column_index(&headers, quantity_column);

    let mut table = HashMap::new();
    for record in rdr.records() {
        let record = record?;
        let Some(part) = non_empty(record.get(part_idx)) else {
            continue;
        };
        table.entry(part).or_insert_with(|| RfqEntry {
            revision: rev_idx.and_then(|i| non_empty(record.get(i))),
            quantity: qty_idx.and_then(|i| parse_f64_safe(record.get(i))),
        });
    }
    info!("RFQ lookup holds {} part numbers", table.len());
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn dedupes_in_first_appearance_order() {
        let f = csv_file("part_number,quantity\nB-2,1\nA-1,2\n,3\nB-2,4\n C-3 ,5\n");
        let (parts, report) = load_part_numbers(f.path(), "part_number").unwrap();
        assert_eq!(parts, vec!["B-2", "A-1", "C-3"]);
        assert_eq!(report.total_rows, 5);
        assert_eq!(report.blank_rows, 1);
        assert_eq!(report.unique_parts, 3);
    }

    #[test]
    fn missing_column_lists_available() {
        let f = csv_file("pn,qty\nA,1\n");
        let err = load_part_numbers(f.path(), "part_number").unwrap_err();
        match err {
            ReportError::MissingColumn { column, available } => {
                assert_eq!(column, "part_number");
                assert_eq!(available, "pn, qty");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_file_is_input_error() {
        let missing = Path::new("/nonexistent/parts.csv");
        let err = load_part_numbers(missing, "part_number").unwrap_err();
        assert!(matches!(err, ReportError::InputNotFound(_)));
        assert!(err.is_input_error());
    }

    #[test]
    fn rfq_table_reads_optional_columns() {
        let f = csv_file("part_number,revision,quantity\nA-1,C,250\nA-1,D,10\nB-2,,\n");
        let table = load_rfq_table(f.path(), "part_number", "revision", "quantity").unwrap();
        assert_eq!(
            table["A-1"],
            RfqEntry {
                revision: Some("C".into()),
                quantity: Some(250.0)
            }
        );
        assert_eq!(table["B-2"], RfqEntry::default());
    }

    #[test]
    fn rfq_table_without_quote_columns() {
        let f = csv_file("part_number\nA-1\n");
        let table = load_rfq_table(f.path(), "part_number", "revision", "quantity").unwrap();
        assert_eq!(table["A-1"], RfqEntry::default());
    }
}
