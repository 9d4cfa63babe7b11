use crate::util::{ser_round2, ser_round2_map, ser_round2_opt};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tabled::Tabled;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    Closed,
    Released,
}

impl JobStatus {
    /// Job statuses are stored free-form in the ERP; only the two statuses the
    /// history query admits are recognised.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CLOSED" => Some(JobStatus::Closed),
            "RELEASED" => Some(JobStatus::Released),
            _ => None,
        }
    }
}

/// One completed or released job for a part.
#[derive(Debug, Clone, Serialize)]
pub struct ManufacturingRecord {
    #[serde(rename = "JobNumber")]
    pub job_number: String,
    #[serde(rename = "PartNumber")]
    pub part_number: String,
    #[serde(rename = "Revision")]
    pub revision: String,
    #[serde(rename = "DueDate")]
    pub due_date: Option<NaiveDate>,
    #[serde(rename = "Quantity")]
    pub quantity: f64,
    #[serde(rename = "Customer")]
    pub customer: Option<String>,
    #[serde(rename = "Status")]
    pub status: JobStatus,
    #[serde(rename = "ReleaseDate")]
    pub release_date: NaiveDate,
    #[serde(rename = "Labor")]
    pub labor: f64,
    #[serde(rename = "Material")]
    pub material: f64,
    #[serde(rename = "Overhead")]
    pub overhead: f64,
    #[serde(rename = "Setup")]
    pub setup: f64,
    #[serde(rename = "Subcontract")]
    pub subcontract: f64,
    #[serde(rename = "Other")]
    pub other: f64,
    #[serde(rename = "TotalCost")]
    pub total_cost: f64,
    #[serde(rename = "UnitCost")]
    pub unit_cost: Option<f64>,
}

impl ManufacturingRecord {
    /// Fill in `total_cost` and `unit_cost` from the cost components.
    pub fn with_derived_costs(mut self) -> Self {
        self.total_cost =
            self.labor + self.material + self.overhead + self.setup + self.subcontract + self.other;
        self.unit_cost = if self.quantity == 0.0 {
            None
        } else {
            Some(self.total_cost / self.quantity)
        };
        self
    }
}

/// One sales-order line, priced from its latest release.
#[derive(Debug, Clone, Serialize)]
pub struct SalesRecord {
    #[serde(rename = "SalesOrderNumber")]
    pub sales_order_number: String,
    #[serde(rename = "CustomerNumber")]
    pub customer_number: Option<String>,
    #[serde(rename = "CustomerName")]
    pub customer_name: Option<String>,
    #[serde(rename = "PartNumber")]
    pub part_number: String,
    #[serde(rename = "Revision")]
    pub revision: String,
    #[serde(rename = "ItemStatus")]
    pub item_status: Option<String>,
    #[serde(rename = "OrderedQty")]
    pub ordered_qty: f64,
    #[serde(rename = "UnitPrice")]
    pub unit_price: f64,
    #[serde(rename = "TotalValue")]
    pub total_value: f64,
    #[serde(rename = "OrderDate")]
    pub order_date: NaiveDate,
}

/// Per part-revision cost summary. `average_cost` is `None` when no job
/// survived the outlier trim; it is never zero-filled.
#[derive(Debug, Clone, Serialize)]
pub struct CostRollupRecord {
    #[serde(rename = "PartNumber")]
    pub part_number: String,
    #[serde(rename = "Revision")]
    pub revision: String,
    #[serde(rename = "Description")]
    pub description: Option<String>,
    #[serde(rename = "StandardCost")]
    pub standard_cost: f64,
    #[serde(rename = "AverageCost")]
    pub average_cost: Option<f64>,
    #[serde(rename = "JobCount")]
    pub job_count: usize,
}

/// Item-master row feeding the cost rollup.
#[derive(Debug, Clone)]
pub struct PartMaster {
    pub part_number: String,
    pub revision: String,
    pub description: Option<String>,
    pub standard_cost: f64,
}

/// A closed job with nonzero quantity, as sampled for the cost rollup.
/// Rows arrive most recent first within a part.
#[derive(Debug, Clone)]
pub struct CostSample {
    pub part_number: String,
    pub revision: String,
    pub release_date: NaiveDate,
    pub unit_cost: f64,
}

fn display_opt<T: fmt::Display>(v: &Option<T>) -> String {
    match v {
        Some(v) => v.to_string(),
        None => String::new(),
    }
}

/// Item-master row joined with the part's latest sales-order line.
#[derive(Debug, Clone, Serialize, Tabled)]
pub struct PartMatchRecord {
    #[serde(rename = "PartNumber")]
    #[tabled(rename = "PartNumber")]
    pub part_number: String,
    #[serde(rename = "Revision")]
    #[tabled(rename = "Revision")]
    pub revision: String,
    #[serde(rename = "BasePrice")]
    #[tabled(rename = "BasePrice")]
    pub base_price: f64,
    #[serde(rename = "OnHand")]
    #[tabled(rename = "OnHand")]
    pub on_hand: f64,
    #[serde(rename = "OnOrder")]
    #[tabled(rename = "OnOrder")]
    pub on_order: f64,
    #[serde(rename = "Description")]
    #[tabled(rename = "Description", display_with = "display_opt")]
    pub description: Option<String>,
    #[serde(rename = "LastSalesOrder")]
    #[tabled(rename = "LastSalesOrder", display_with = "display_opt")]
    pub last_sales_order: Option<String>,
    #[serde(rename = "LastOrderRevision")]
    #[tabled(rename = "LastOrderRevision", display_with = "display_opt")]
    pub last_order_revision: Option<String>,
    #[serde(rename = "LastOrderPrice")]
    #[tabled(rename = "LastOrderPrice", display_with = "display_opt")]
    pub last_order_price: Option<f64>,
    #[serde(rename = "LastOrderQty")]
    #[tabled(rename = "LastOrderQty", display_with = "display_opt")]
    pub last_order_qty: Option<f64>,
}

/// Externally supplied quote data for one part.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RfqEntry {
    pub revision: Option<String>,
    pub quantity: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
    #[serde(rename = "Very High")]
    VeryHigh,
}

impl RiskTier {
    /// Step function over ascending thresholds; each boundary belongs to the
    /// tier above it.
    pub fn classify(value: f64, thresholds: &[f64; 3]) -> Self {
        if value < thresholds[0] {
            RiskTier::Low
        } else if value < thresholds[1] {
            RiskTier::Medium
        } else if value < thresholds[2] {
            RiskTier::High
        } else {
            RiskTier::VeryHigh
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentSalesOrder {
    #[serde(rename = "OrderDate")]
    pub order_date: NaiveDate,
    #[serde(rename = "Qty")]
    pub qty: f64,
    #[serde(rename = "SONumber")]
    pub so_number: String,
    #[serde(rename = "UnitPrice", serialize_with = "ser_round2")]
    pub unit_price: f64,
}

/// Derived per-part view. Values keep full precision; rounding happens in
/// the serializers.
#[derive(Debug, Clone, Serialize)]
pub struct PartSummary {
    #[serde(rename = "PartNumber")]
    pub part_number: String,
    #[serde(rename = "CurrentRevision")]
    pub current_revision: String,
    #[serde(rename = "TotalBuilds")]
    pub total_builds: usize,
    #[serde(rename = "BuildsByRevision")]
    pub builds_by_revision: BTreeMap<String, usize>,
    #[serde(rename = "TotalSalesOrders")]
    pub total_sales_orders: usize,
    #[serde(rename = "RecentSalesOrders")]
    pub recent_sales_orders: Vec<RecentSalesOrder>,
    #[serde(rename = "AnnualRevenue", serialize_with = "ser_round2_map")]
    pub annual_revenue: BTreeMap<i32, f64>,
    #[serde(rename = "AvgAnnualRevenue", serialize_with = "ser_round2")]
    pub avg_annual_revenue: f64,
    #[serde(rename = "RFQQty", serialize_with = "ser_round2")]
    pub rfq_qty: f64,
    #[serde(rename = "RecentSOQty", serialize_with = "ser_round2_opt")]
    pub recent_so_qty: Option<f64>,
    #[serde(rename = "RecentSODate")]
    pub recent_so_date: Option<NaiveDate>,
    #[serde(rename = "RecentUnitPrice", serialize_with = "ser_round2")]
    pub recent_unit_price: f64,
    /// Zero when the part has no cost history, unlike the rollup's `None`.
    #[serde(rename = "SQLCost", serialize_with = "ser_round2")]
    pub sql_cost: f64,
    #[serde(rename = "RecentStdCost", serialize_with = "ser_round2")]
    pub recent_std_cost: f64,
    #[serde(rename = "PotentialRevenue", serialize_with = "ser_round2")]
    pub potential_revenue: f64,
    #[serde(rename = "EstimatedMargin", serialize_with = "ser_round2")]
    pub estimated_margin: f64,
    #[serde(rename = "RiskByPotential")]
    pub risk_by_potential: RiskTier,
    #[serde(rename = "RiskByAvgAnnual")]
    pub risk_by_avg_annual: RiskTier,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct SheetSummaryRow {
    #[serde(rename = "Category")]
    #[tabled(rename = "Category")]
    pub category: String,
    #[serde(rename = "Records")]
    #[tabled(rename = "Records")]
    pub records: usize,
    #[serde(rename = "Unique Parts")]
    #[tabled(rename = "Unique Parts")]
    pub unique_parts: usize,
}
