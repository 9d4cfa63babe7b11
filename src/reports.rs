use crate::types::{CostRollupRecord, ManufacturingRecord, SalesRecord, SheetSummaryRow};
use std::collections::HashSet;

/// Everything the bulk report writes, one field per sheet.
#[derive(Debug, Default)]
pub struct HistoryReport {
    pub manufacturing: Vec<ManufacturingRecord>,
    pub sales: Vec<SalesRecord>,
    pub costs: Vec<CostRollupRecord>,
}

fn unique_parts<'a>(parts: impl Iterator<Item = &'a str>) -> usize {
    parts.collect::<HashSet<_>>().len()
}

impl HistoryReport {
    /// Record and distinct-part counts per data sheet.
    pub fn summary_rows(&self) -> Vec<SheetSummaryRow> {
        vec![
            SheetSummaryRow {
                category: "Manufacturing History".into(),
                records: self.manufacturing.len(),
                unique_parts: unique_parts(
                    self.manufacturing.iter().map(|r| r.part_number.as_str()),
                ),
            },
            SheetSummaryRow {
                category: "Sales History".into(),
                records: self.sales.len(),
                unique_parts: unique_parts(self.sales.iter().map(|r| r.part_number.as_str())),
            },
            SheetSummaryRow {
                category: "Cost Analysis".into(),
                records: self.costs.len(),
                unique_parts: unique_parts(self.costs.iter().map(|r| r.part_number.as_str())),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cost(part: &str, rev: &str) -> CostRollupRecord {
        CostRollupRecord {
            part_number: part.into(),
            revision: rev.into(),
            description: None,
            standard_cost: 0.0,
            average_cost: None,
            job_count: 0,
        }
    }

    #[test]
    fn summary_counts_records_and_distinct_parts() {
        let report = HistoryReport {
            costs: vec![cost("A-1", "A"), cost("A-1", "B"), cost("B-2", "01")],
            ..HistoryReport::default()
        };
        let rows = report.summary_rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].category, "Manufacturing History");
        assert_eq!(rows[0].records, 0);
        assert_eq!(rows[0].unique_parts, 0);
        assert_eq!(rows[2].category, "Cost Analysis");
        assert_eq!(rows[2].records, 3);
        assert_eq!(rows[2].unique_parts, 2);
    }
}
