// Query layer: the data-source seam plus the batched executor that every
// history query goes through.
use crate::config::ReportConfig;
use crate::error::ReportResult;
use crate::reports::HistoryReport;
use crate::rollup::ROLLUP_YEARS;
use crate::summary::PartHistory;
use crate::types::{CostRollupRecord, ManufacturingRecord, PartMatchRecord, SalesRecord};
use crate::util::years_before;
use chrono::NaiveDate;
use tracing::{error, info, warn};

/// A ready-to-use handle onto the ERP data. Each method answers for one
/// batch of part numbers; batching and logging happen in [`HistoryQueries`].
pub trait HistorySource {
    /// Closed or released jobs released on or after `since`, ordered by part
    /// then release date descending.
    fn manufacturing_history(
        &self,
        parts: &[String],
        since: NaiveDate,
    ) -> ReportResult<Vec<ManufacturingRecord>>;

    /// Sales-order lines ordered on or after `since`, each priced from its
    /// latest release, ordered by part then order date descending.
    fn sales_history(&self, parts: &[String], since: NaiveDate) -> ReportResult<Vec<SalesRecord>>;

    /// One row per item-master revision with the trimmed average cost of
    /// jobs released after `since`.
    fn cost_rollup(&self, parts: &[String], since: NaiveDate)
        -> ReportResult<Vec<CostRollupRecord>>;

    /// Item-master rows joined with each part's latest sales-order line.
    fn part_matches(&self, parts: &[String]) -> ReportResult<Vec<PartMatchRecord>>;
}

/// Split `ids` into contiguous groups of at most `batch_size`, run `query`
/// on each in order and concatenate the results. Any failure discards the
/// rows gathered so far. No query is issued for empty input.
pub fn fetch_batched<T, F>(ids: &[String], batch_size: usize, mut query: F) -> ReportResult<Vec<T>>
where
    F: FnMut(&[String]) -> ReportResult<Vec<T>>,
{
    let mut rows = Vec::new();
    for chunk in ids.chunks(batch_size.max(1)) {
        rows.extend(query(chunk)?);
    }
    Ok(rows)
}

pub struct HistoryQueries<'a, S: HistorySource> {
    source: &'a S,
    config: &'a ReportConfig,
    as_of: NaiveDate,
}

impl<'a, S: HistorySource> HistoryQueries<'a, S> {
    pub fn new(source: &'a S, config: &'a ReportConfig, as_of: NaiveDate) -> Self {
        Self {
            source,
            config,
            as_of,
        }
    }

    fn since(&self) -> NaiveDate {
        years_before(self.as_of, self.config.lookback_years)
    }

    fn run<T, F>(&self, label: &'static str, parts: &[String], mut query: F) -> ReportResult<Vec<T>>
    where
        F: FnMut(&[String]) -> ReportResult<Vec<T>>,
    {
        if parts.is_empty() {
            warn!("No part numbers provided for {}", label);
            return Ok(Vec::new());
        }
        fetch_batched(parts, self.config.batch_size, |chunk| {
            info!("Querying {} for {} parts", label, chunk.len());
            let rows = query(chunk)?;
            info!("{} query returned {} rows", label, rows.len());
            Ok(rows)
        })
        .map_err(|e| {
            error!("{} query failed: {}", label, e);
            e
        })
    }

    pub fn manufacturing_history(
        &self,
        parts: &[String],
    ) -> ReportResult<Vec<ManufacturingRecord>> {
        let since = self.since();
        self.run("manufacturing history", parts, |chunk| {
            self.source.manufacturing_history(chunk, since)
        })
    }

    pub fn sales_history(&self, parts: &[String]) -> ReportResult<Vec<SalesRecord>> {
        let since = self.since();
        self.run("sales history", parts, |chunk| {
            self.source.sales_history(chunk, since)
        })
    }

    /// The rollup window is fixed at `ROLLUP_YEARS`, whatever the history
    /// window is set to.
    pub fn cost_rollup(&self, parts: &[String]) -> ReportResult<Vec<CostRollupRecord>> {
        let since = years_before(self.as_of, ROLLUP_YEARS);
        self.run("average cost", parts, |chunk| {
            self.source.cost_rollup(chunk, since)
        })
    }

    pub fn part_matches(&self, parts: &[String]) -> ReportResult<Vec<PartMatchRecord>> {
        self.run("part master", parts, |chunk| self.source.part_matches(chunk))
    }

    /// The three record sets for the bulk report, fetched one after another.
    pub fn report(&self, parts: &[String]) -> ReportResult<HistoryReport> {
        Ok(HistoryReport {
            manufacturing: self.manufacturing_history(parts)?,
            sales: self.sales_history(parts)?,
            costs: self.cost_rollup(parts)?,
        })
    }

    pub fn part_history(&self, part_number: &str) -> ReportResult<PartHistory> {
        let ids = [part_number.to_string()];
        Ok(PartHistory {
            manufacturing: self.manufacturing_history(&ids)?,
            sales: self.sales_history(&ids)?,
            costs: self.cost_rollup(&ids)?,
        })
    }
}
