// Report tunables. Defaults match the ERP reporting conventions; a JSON file
// may override any subset of them.
use crate::error::{ReportError, ReportResult};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// History window for the manufacturing, sales and cost queries.
    pub lookback_years: u32,
    /// Maximum number of part numbers per `IN (...)` query.
    pub batch_size: usize,
    /// Revision reported when the RFQ input does not name one.
    pub default_revision: String,
    /// Calendar years in the annual revenue mapping, current year included.
    pub revenue_years: u32,
    pub recent_orders: usize,
    pub potential_thresholds: [f64; 3],
    pub annual_thresholds: [f64; 3],
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            lookback_years: 5,
            batch_size: 1000,
            default_revision: "05".to_string(),
            revenue_years: 6,
            recent_orders: 5,
            potential_thresholds: [1_000.0, 10_000.0, 50_000.0],
            annual_thresholds: [10_000.0, 50_000.0, 250_000.0],
        }
    }
}

impl ReportConfig {
    pub fn from_file(path: &Path) -> ReportResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: ReportConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ReportResult<()> {
        if self.batch_size == 0 {
            return Err(ReportError::Config("batch_size must be at least 1".into()));
        }
        if self.revenue_years == 0 {
            return Err(ReportError::Config("revenue_years must be at least 1".into()));
        }
        for (name, t) in [
            ("potential_thresholds", &self.potential_thresholds),
            ("annual_thresholds", &self.annual_thresholds),
        ] {
            if !(t[0] <= t[1] && t[1] <= t[2]) {
                return Err(ReportError::Config(format!("{name} must be ascending")));
            }
        }
        Ok(())
    }
}
