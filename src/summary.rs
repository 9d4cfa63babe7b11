// Per-part summary: folds the manufacturing, sales and cost rollup rows of a
// single part into one record of derived business metrics.
//
// Aggregation never fails. Missing data falls back to explicit zeros or
// `None`, so only the upstream queries can abort a summary.
use crate::config::ReportConfig;
use crate::types::{
    CostRollupRecord, ManufacturingRecord, PartSummary, RecentSalesOrder, RfqEntry, RiskTier,
    SalesRecord,
};
use crate::util::{average, round2};
use chrono::{Datelike, NaiveDate};
use std::collections::BTreeMap;
use std::fmt::Write;

/// The three record sets fetched for one part.
#[derive(Debug, Clone, Default)]
pub struct PartHistory {
    pub manufacturing: Vec<ManufacturingRecord>,
    pub sales: Vec<SalesRecord>,
    pub costs: Vec<CostRollupRecord>,
}

fn recent_orders(sales: &[SalesRecord], limit: usize) -> Vec<RecentSalesOrder> {
    let mut sorted: Vec<&SalesRecord> = sales.iter().collect();
    sorted.sort_by(|a, b| b.order_date.cmp(&a.order_date));
    sorted
        .into_iter()
        .take(limit)
        .map(|s| RecentSalesOrder {
            order_date: s.order_date,
            qty: s.ordered_qty,
            so_number: s.sales_order_number.clone(),
            // Recomputed rather than trusting the fetched unit price.
            unit_price: if s.ordered_qty == 0.0 {
                0.0
            } else {
                s.total_value / s.ordered_qty
            },
        })
        .collect()
}

/// Revenue per calendar year for the trailing window ending at `as_of`'s
/// year. Every year in the window is present, zero when nothing sold.
fn annual_revenue(sales: &[SalesRecord], as_of: NaiveDate, years: u32) -> BTreeMap<i32, f64> {
    let last = as_of.year();
    let first = last - years.saturating_sub(1) as i32;
    let mut buckets: BTreeMap<i32, f64> = (first..=last).map(|y| (y, 0.0)).collect();
    for s in sales {
        if let Some(total) = buckets.get_mut(&s.order_date.year()) {
            *total += s.total_value;
        }
    }
    buckets
}

fn standard_cost_for(costs: &[CostRollupRecord], revision: &str) -> f64 {
    costs
        .iter()
        .find(|c| c.revision == revision)
        .or_else(|| costs.first())
        .map(|c| c.standard_cost)
        .unwrap_or(0.0)
}

pub fn summarize(
    part_number: &str,
    history: &PartHistory,
    rfq: Option<&RfqEntry>,
    config: &ReportConfig,
    as_of: NaiveDate,
) -> PartSummary {
    let current_revision = rfq
        .and_then(|r| r.revision.clone())
        .unwrap_or_else(|| config.default_revision.clone());
    let rfq_qty = rfq.and_then(|r| r.quantity).unwrap_or(0.0);

    let mut builds_by_revision: BTreeMap<String, usize> = BTreeMap::new();
    for job in &history.manufacturing {
        *builds_by_revision.entry(job.revision.clone()).or_insert(0) += 1;
    }

    let averages: Vec<f64> = history.costs.iter().filter_map(|c| c.average_cost).collect();
    let sql_cost = average(&averages);

    let recent_sales_orders = recent_orders(&history.sales, config.recent_orders);
    let annual_revenue = annual_revenue(&history.sales, as_of, config.revenue_years);
    let avg_annual_revenue =
        annual_revenue.values().sum::<f64>() / config.revenue_years.max(1) as f64;

    // Zero-priced lines are warranty or internal releases, not real prices.
    let priced = recent_sales_orders.iter().find(|o| o.unit_price > 0.0);
    let recent_unit_price = priced.map(|o| o.unit_price).unwrap_or(0.0);

    let potential_revenue = rfq_qty * recent_unit_price;
    let estimated_margin = if recent_unit_price > 0.0 {
        1.0 - sql_cost / recent_unit_price
    } else {
        0.0
    };

    PartSummary {
        part_number: part_number.to_string(),
        recent_std_cost: standard_cost_for(&history.costs, &current_revision),
        current_revision,
        total_builds: history.manufacturing.len(),
        builds_by_revision,
        total_sales_orders: history.sales.len(),
        recent_so_qty: priced.map(|o| o.qty),
        recent_so_date: priced.map(|o| o.order_date),
        recent_unit_price,
        recent_sales_orders,
        annual_revenue,
        avg_annual_revenue,
        rfq_qty,
        sql_cost,
        potential_revenue,
        estimated_margin,
        risk_by_potential: RiskTier::classify(potential_revenue, &config.potential_thresholds),
        risk_by_avg_annual: RiskTier::classify(avg_annual_revenue, &config.annual_thresholds),
    }
}

/// Plain-text rendering. Downstream tools parse this, so the line layout and
/// the tab separators in the order table are fixed.
pub fn render_text(summary: &PartSummary, config: &ReportConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Part # {}", summary.part_number);
    let _ = writeln!(
        out,
        "Built {} times in the past {} years for an avg cost of ${:.2}",
        summary.total_builds,
        config.lookback_years,
        round2(summary.sql_cost)
    );
    let _ = writeln!(
        out,
        "the previous {} sales orders (out of {} total SOs) were:",
        config.recent_orders, summary.total_sales_orders
    );
    if summary.recent_sales_orders.is_empty() {
        return out;
    }
    out.push_str("OrderDate\tOrderedQty\tSalesOrderNumber\tUnitPrice\n");
    for o in &summary.recent_sales_orders {
        let _ = writeln!(
            out,
            "{}\t{}\t\t{}\t\t\t{:.2}",
            o.order_date.format("%m/%d/%Y"),
            o.qty as i64,
            o.so_number,
            round2(o.unit_price)
        );
    }
    out
}
