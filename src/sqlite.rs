// SQLite realisation of the ERP tables the history queries read:
// jomast/jopact (jobs and their actual costs), somast/soitem/sorels (sales
// orders, lines and priced releases) and inmast (item master).
//
// Report connections are opened read-only. Only `bootstrap` writes, and
// only to create missing tables.
use crate::db::HistorySource;
use crate::error::{ReportError, ReportResult};
use crate::rollup::compute_rollup;
use crate::types::{
    CostRollupRecord, CostSample, JobStatus, ManufacturingRecord, PartMaster, PartMatchRecord,
    SalesRecord,
};
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params_from_iter, Connection, OpenFlags, Row};
use std::path::Path;
use tracing::{info, warn};

/// The ERP tables the history queries read, with the columns they use.
const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS jomast (
        fjobno TEXT PRIMARY KEY, fpartno TEXT NOT NULL, fpartrev TEXT,
        fddue_date TEXT, fquantity REAL, fcus_id TEXT, fstatus TEXT, fact_rel TEXT
    );
    CREATE TABLE IF NOT EXISTS jopact (
        fjobno TEXT PRIMARY KEY, flabact REAL DEFAULT 0, fmatlact REAL DEFAULT 0,
        fovhdact REAL DEFAULT 0, fsetupact REAL DEFAULT 0, fsubact REAL DEFAULT 0,
        fothract REAL DEFAULT 0
    );
    CREATE TABLE IF NOT EXISTS somast (
        fsono TEXT PRIMARY KEY, fcustno TEXT, fcompany TEXT, forderdate TEXT
    );
    CREATE TABLE IF NOT EXISTS soitem (
        fsono TEXT, fenumber TEXT, fpartno TEXT, fpartrev TEXT, fcitemstatus TEXT,
        fquantity REAL, fprice REAL, PRIMARY KEY (fsono, fenumber)
    );
    CREATE TABLE IF NOT EXISTS sorels (
        fsono TEXT, fenumber TEXT, frelease TEXT, fnetprice REAL,
        PRIMARY KEY (fsono, fenumber, frelease)
    );
    CREATE TABLE IF NOT EXISTS inmast (
        fpartno TEXT, frev TEXT, fdescript TEXT, fstdcost REAL, fprice REAL,
        fonhand REAL, fonorder REAL, PRIMARY KEY (fpartno, frev)
    );
"#;

pub fn create_schema(conn: &Connection) -> ReportResult<()> {
    conn.execute_batch(SCHEMA)
        .map_err(ReportError::query("schema bootstrap"))
}

/// Create `path` (and its parent directory) holding empty ERP tables.
/// Existing tables are left untouched.
pub fn bootstrap(path: &Path) -> ReportResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    info!("Bootstrapping database {}", path.display());
    let conn = Connection::open(path)?;
    create_schema(&conn)?;
    if let Err((_, e)) = conn.close() {
        warn!("Error closing connection: {}", e);
    }
    info!("Database schema ready");
    Ok(())
}

pub struct SqliteSource {
    conn: Connection,
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

fn date_param(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

impl SqliteSource {
    pub fn open(path: &Path) -> ReportResult<Self> {
        info!("Connecting to database {}", path.display());
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        info!("Database connection successful");
        Ok(Self { conn })
    }

    pub fn close(self) {
        match self.conn.close() {
            Ok(()) => info!("Database connection closed"),
            Err((_, e)) => warn!("Error closing connection: {}", e),
        }
    }

    /// Run `sql` binding `parts` (once per `IN` list) followed by `extra`.
    fn query_parts<T, F>(
        &self,
        context: &'static str,
        sql: &str,
        parts: &[String],
        in_lists: usize,
        extra: Option<String>,
        map: F,
    ) -> ReportResult<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut params: Vec<&str> = Vec::with_capacity(parts.len() * in_lists + 1);
        for _ in 0..in_lists {
            params.extend(parts.iter().map(String::as_str));
        }
        if let Some(extra) = extra.as_deref() {
            params.push(extra);
        }
        let mut stmt = self.conn.prepare(sql).map_err(ReportError::query(context))?;
        let rows = stmt
            .query_map(params_from_iter(params), map)
            .map_err(ReportError::query(context))?
            .collect::<rusqlite::Result<Vec<T>>>()
            .map_err(ReportError::query(context))?;
        Ok(rows)
    }

    fn part_masters(&self, parts: &[String]) -> ReportResult<Vec<PartMaster>> {
        let sql = format!(
            r#"
            SELECT fpartno, COALESCE(frev, ''), fdescript, COALESCE(fstdcost, 0)
            FROM inmast
            WHERE fpartno IN ({})
            ORDER BY fpartno, frev
            "#,
            placeholders(parts.len())
        );
        self.query_parts("part master", &sql, parts, 1, None, |row| {
            Ok(PartMaster {
                part_number: row.get(0)?,
                revision: row.get(1)?,
                description: row.get(2)?,
                standard_cost: row.get(3)?,
            })
        })
    }

    fn cost_samples(&self, parts: &[String], since: NaiveDate) -> ReportResult<Vec<CostSample>> {
        let sql = format!(
            r#"
            SELECT jm.fpartno, COALESCE(jm.fpartrev, ''), date(jm.fact_rel),
                   (COALESCE(jp.fmatlact, 0) + COALESCE(jp.fsubact, 0)
                    + COALESCE(jp.fsetupact, 0) + COALESCE(jp.flabact, 0)
                    + COALESCE(jp.fovhdact, 0) + COALESCE(jp.fothract, 0)) / jm.fquantity
            FROM jomast jm
            JOIN jopact jp ON jm.fjobno = jp.fjobno
            WHERE jm.fpartno IN ({})
              AND UPPER(jm.fstatus) = 'CLOSED'
              AND jm.fquantity <> 0
              AND date(jm.fact_rel) > ?
            ORDER BY jm.fpartno, jm.fact_rel DESC, jm.fjobno DESC
            "#,
            placeholders(parts.len())
        );
        self.query_parts("cost sample", &sql, parts, 1, Some(date_param(since)), |row| {
            Ok(CostSample {
                part_number: row.get(0)?,
                revision: row.get(1)?,
                release_date: row.get(2)?,
                unit_cost: row.get(3)?,
            })
        })
    }
}

fn job_status(row: &Row<'_>, idx: usize) -> rusqlite::Result<JobStatus> {
    let raw: String = row.get(idx)?;
    JobStatus::parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("unexpected job status '{raw}'").into(),
        )
    })
}

impl HistorySource for SqliteSource {
    fn manufacturing_history(
        &self,
        parts: &[String],
        since: NaiveDate,
    ) -> ReportResult<Vec<ManufacturingRecord>> {
        let sql = format!(
            r#"
            SELECT jm.fjobno, jm.fpartno, COALESCE(jm.fpartrev, ''), date(jm.fddue_date),
                   COALESCE(jm.fquantity, 0), jm.fcus_id, jm.fstatus, date(jm.fact_rel),
                   COALESCE(jp.flabact, 0), COALESCE(jp.fmatlact, 0), COALESCE(jp.fovhdact, 0),
                   COALESCE(jp.fsetupact, 0), COALESCE(jp.fsubact, 0), COALESCE(jp.fothract, 0)
            FROM jomast jm
            LEFT JOIN jopact jp ON jm.fjobno = jp.fjobno
            WHERE jm.fpartno IN ({})
              AND date(jm.fact_rel) >= ?
              AND UPPER(jm.fstatus) IN ('CLOSED', 'RELEASED')
            ORDER BY jm.fpartno, jm.fact_rel DESC, jm.fjobno DESC
            "#,
            placeholders(parts.len())
        );
        self.query_parts(
            "manufacturing history",
            &sql,
            parts,
            1,
            Some(date_param(since)),
            |row| {
                Ok(ManufacturingRecord {
                    job_number: row.get(0)?,
                    part_number: row.get(1)?,
                    revision: row.get(2)?,
                    due_date: row.get(3)?,
                    quantity: row.get(4)?,
                    customer: row.get(5)?,
                    status: job_status(row, 6)?,
                    release_date: row.get(7)?,
                    labor: row.get(8)?,
                    material: row.get(9)?,
                    overhead: row.get(10)?,
                    setup: row.get(11)?,
                    subcontract: row.get(12)?,
                    other: row.get(13)?,
                    total_cost: 0.0,
                    unit_cost: None,
                }
                .with_derived_costs())
            },
        )
    }

    fn sales_history(&self, parts: &[String], since: NaiveDate) -> ReportResult<Vec<SalesRecord>> {
        // Several releases of one line may exist; the highest release
        // sequence carries the governing price. Sequences are compared as
        // numbers since not every source zero-pads them.
        let sql = format!(
            r#"
            WITH latest_rels AS (
                SELECT fsono, fenumber, fnetprice,
                       ROW_NUMBER() OVER (
                           PARTITION BY fsono, fenumber
                           ORDER BY CAST(frelease AS INTEGER) DESC
                       ) AS rn
                FROM sorels
            )
            SELECT s.fsono, s.fcustno, s.fcompany, i.fpartno, COALESCE(i.fpartrev, ''),
                   i.fcitemstatus, COALESCE(i.fquantity, 0), COALESCE(r.fnetprice, 0),
                   date(s.forderdate)
            FROM somast s
            JOIN soitem i ON s.fsono = i.fsono
            JOIN latest_rels r ON i.fsono = r.fsono AND i.fenumber = r.fenumber AND r.rn = 1
            WHERE i.fpartno IN ({})
              AND date(s.forderdate) >= ?
            ORDER BY i.fpartno, s.forderdate DESC, s.fsono DESC
            "#,
            placeholders(parts.len())
        );
        self.query_parts("sales history", &sql, parts, 1, Some(date_param(since)), |row| {
            let ordered_qty: f64 = row.get(6)?;
            let total_value: f64 = row.get(7)?;
            Ok(SalesRecord {
                sales_order_number: row.get(0)?,
                customer_number: row.get(1)?,
                customer_name: row.get(2)?,
                part_number: row.get(3)?,
                revision: row.get(4)?,
                item_status: row.get(5)?,
                ordered_qty,
                unit_price: if ordered_qty == 0.0 {
                    0.0
                } else {
                    total_value / ordered_qty
                },
                total_value,
                order_date: row.get(8)?,
            })
        })
    }

    fn cost_rollup(
        &self,
        parts: &[String],
        since: NaiveDate,
    ) -> ReportResult<Vec<CostRollupRecord>> {
        let masters = self.part_masters(parts)?;
        let samples = self.cost_samples(parts, since)?;
        Ok(compute_rollup(&masters, &samples))
    }

    fn part_matches(&self, parts: &[String]) -> ReportResult<Vec<PartMatchRecord>> {
        let list = placeholders(parts.len());
        let sql = format!(
            r#"
            WITH latest_so AS (
                SELECT fsono, fpartno, fpartrev, fprice, fquantity,
                       ROW_NUMBER() OVER (PARTITION BY fpartno ORDER BY fsono DESC) AS rn
                FROM soitem
                WHERE fpartno IN ({list})
            )
            SELECT i.fpartno, COALESCE(i.frev, ''), COALESCE(i.fprice, 0),
                   COALESCE(i.fonhand, 0), COALESCE(i.fonorder, 0), i.fdescript,
                   s.fsono, s.fpartrev, s.fprice, s.fquantity
            FROM inmast i
            LEFT JOIN latest_so s ON i.fpartno = s.fpartno AND s.rn = 1
            WHERE i.fpartno IN ({list})
            ORDER BY i.fpartno, i.frev
            "#
        );
        self.query_parts("part master", &sql, parts, 2, None, |row| {
            Ok(PartMatchRecord {
                part_number: row.get(0)?,
                revision: row.get(1)?,
                base_price: row.get(2)?,
                on_hand: row.get(3)?,
                on_order: row.get(4)?,
                description: row.get(5)?,
                last_sales_order: row.get(6)?,
                last_order_revision: row.get(7)?,
                last_order_price: row.get(8)?,
                last_order_qty: row.get(9)?,
            })
        })
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn parts(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn manufacturing_filters_status_and_window() {
        let src = memory_source();
        insert_job(&src, "J1", "A-1", "A", 10.0, "Closed", "2025-03-01", 100.0);
        insert_job(&src, "J2", "A-1", "A", 5.0, "RELEASED", "2026-01-15", 50.0);
        insert_job(&src, "J3", "A-1", "A", 5.0, "CANCELLED", "2026-02-01", 50.0);
        insert_job(&src, "J4", "A-1", "A", 5.0, "CLOSED", "2019-02-01", 50.0);
        insert_job(&src, "J5", "B-2", "B", 0.0, "CLOSED", "2024-06-30", 80.0);
        insert_job(&src, "J6", "Z-9", "A", 1.0, "CLOSED", "2024-06-30", 80.0);

        let rows = src
            .manufacturing_history(&parts(&["A-1", "B-2"]), d("2021-10-19"))
            .unwrap();
        let jobs: Vec<_> = rows.iter().map(|r| r.job_number.as_str()).collect();
        assert_eq!(jobs, vec!["J2", "J1", "J5"]);
        assert_eq!(rows[1].status, JobStatus::Closed);
        assert_eq!(rows[1].total_cost, 100.0);
        assert_eq!(rows[1].unit_cost, Some(10.0));
        assert_eq!(rows[2].unit_cost, None);
    }

    #[test]
    fn sales_use_latest_release_price() {
        let src = memory_source();
        insert_order(&src, "SO1", "A-1", "A", 4.0, 40.0, "2025-05-01");
        src.conn()
            .execute("INSERT INTO sorels VALUES ('SO1', '  1', '002', 60.0)", [])
            .unwrap();
        insert_order(&src, "SO2", "A-1", "A", 0.0, 0.0, "2026-02-01");
        insert_order(&src, "SO0", "A-1", "A", 1.0, 5.0, "2018-01-01");

        let rows = src.sales_history(&parts(&["A-1"]), d("2021-10-19")).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].sales_order_number, "SO2");
        assert_eq!(rows[0].unit_price, 0.0);
        assert_eq!(rows[1].total_value, 60.0);
        assert_eq!(rows[1].unit_price, 15.0);
        assert_eq!(rows[1].customer_name.as_deref(), Some("Acme Corp"));
    }

    #[test]
    fn cost_rollup_trims_closed_jobs() {
        let src = memory_source();
        insert_master(&src, "A-1", "A", 9.0);
        insert_master(&src, "A-1", "B", 11.0);
        for (i, unit) in [1.0, 2.0, 3.0, 4.0].iter().enumerate() {
            insert_job(
                &src,
                &format!("J{i}"),
                "A-1",
                "A",
                2.0,
                "CLOSED",
                &format!("2025-0{}-01", i + 1),
                unit * 2.0,
            );
        }
        // Released jobs and zero-quantity jobs never enter the sample.
        insert_job(&src, "JR", "A-1", "A", 1.0, "RELEASED", "2025-08-01", 500.0);
        insert_job(&src, "JZ", "A-1", "A", 0.0, "CLOSED", "2025-08-01", 500.0);

        let rows = src.cost_rollup(&parts(&["A-1"]), d("2021-10-19")).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].revision, "A");
        assert_eq!(rows[0].average_cost, Some(2.5));
        assert_eq!(rows[0].job_count, 2);
        assert_eq!(rows[1].revision, "B");
        assert_eq!(rows[1].average_cost, None);
        assert_eq!(rows[1].standard_cost, 11.0);
    }

    #[test]
    fn null_cost_component_counts_as_zero() {
        let src = memory_source();
        insert_master(&src, "A-1", "A", 3.0);
        for (i, unit) in [2.0, 4.0, 6.0].iter().enumerate() {
            insert_job(&src, &format!("J{i}"), "A-1", "A", 1.0, "CLOSED", "2025-02-01", *unit);
        }
        insert_job(&src, "JN", "A-1", "A", 1.0, "CLOSED", "2025-06-01", 2.5);
        src.conn()
            .execute("UPDATE jopact SET flabact = NULL WHERE fjobno = 'JN'", [])
            .unwrap();

        let jobs = src.manufacturing_history(&parts(&["A-1"]), d("2021-10-19")).unwrap();
        assert_eq!(jobs[0].job_number, "JN");
        assert_eq!(jobs[0].total_cost, 2.5);

        let samples = src.cost_samples(&parts(&["A-1"]), d("2021-10-19")).unwrap();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0].unit_cost, 2.5);

        // Ranked 2.0, 2.5, 4.0, 6.0; the middle two survive.
        let rows = src.cost_rollup(&parts(&["A-1"]), d("2021-10-19")).unwrap();
        assert_eq!(rows[0].average_cost, Some(3.25));
        assert_eq!(rows[0].job_count, 2);
    }

    #[test]
    fn release_sequence_orders_numerically() {
        let src = memory_source();
        insert_order(&src, "SO1", "A-1", "A", 2.0, 20.0, "2025-05-01");
        src.conn()
            .execute("UPDATE sorels SET frelease = '9' WHERE fsono = 'SO1'", [])
            .unwrap();
        src.conn()
            .execute("INSERT INTO sorels VALUES ('SO1', '  1', '10', 30.0)", [])
            .unwrap();

        let rows = src.sales_history(&parts(&["A-1"]), d("2021-10-19")).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_value, 30.0);
        assert_eq!(rows[0].unit_price, 15.0);
    }

    #[test]
    fn bootstrap_creates_queryable_empty_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data").join("m2m.db");
        bootstrap(&path).unwrap();
        // Running it again leaves the tables in place.
        bootstrap(&path).unwrap();

        let src = SqliteSource::open(&path).unwrap();
        let ids = parts(&["A-1"]);
        assert!(src.manufacturing_history(&ids, d("2021-01-01")).unwrap().is_empty());
        assert!(src.sales_history(&ids, d("2021-01-01")).unwrap().is_empty());
        assert!(src.cost_rollup(&ids, d("2021-01-01")).unwrap().is_empty());
        assert!(src.part_matches(&ids).unwrap().is_empty());
        src.close();
    }

    #[test]
    fn part_matches_join_latest_order() {
        let src = memory_source();
        insert_master(&src, "A-1", "A", 9.0);
        insert_master(&src, "C-3", "01", 2.0);
        insert_order(&src, "000101", "A-1", "A", 4.0, 40.0, "2025-05-01");
        insert_order(&src, "000205", "A-1", "B", 2.0, 30.0, "2025-06-01");

        let rows = src.part_matches(&parts(&["A-1", "C-3", "X-0"])).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].last_sales_order.as_deref(), Some("000205"));
        assert_eq!(rows[0].last_order_revision.as_deref(), Some("B"));
        assert_eq!(rows[0].last_order_price, Some(15.0));
        assert_eq!(rows[0].last_order_qty, Some(2.0));
        assert_eq!(rows[1].part_number, "C-3");
        assert_eq!(rows[1].last_sales_order, None);
    }

    #[test]
    fn missing_table_surfaces_query_error() {
        let conn = Connection::open_in_memory().unwrap();
        let src = SqliteSource::from_connection(conn);
        let err = src.sales_history(&parts(&["A-1"]), d("2021-01-01")).unwrap_err();
        assert!(matches!(
            err,
            ReportError::Query {
                context: "sales history",
                ..
            }
        ));
    }

    #[test]
    fn single_part_summary_from_database() {
        use crate::config::ReportConfig;
        use crate::db::HistoryQueries;
        use crate::summary::summarize;
        use crate::types::RiskTier;

        let src = memory_source();
        insert_master(&src, "ABC-1", "A", 40.0);
        for (i, cost) in [30.0, 50.0, 70.0].iter().enumerate() {
            insert_job(&src, &format!("J{i}"), "ABC-1", "A", 1.0, "CLOSED", "2025-04-01", *cost);
        }
        insert_job(&src, "J9", "ABC-1", "B", 2.0, "RELEASED", "2026-04-01", 0.0);
        insert_order(&src, "SO1", "ABC-1", "A", 10.0, 1000.0, "2026-03-01");
        insert_order(&src, "SO2", "ABC-1", "A", 5.0, 400.0, "2024-03-01");

        let config = ReportConfig {
            batch_size: 1,
            ..ReportConfig::default()
        };
        let as_of = d("2026-10-19");
        let queries = HistoryQueries::new(&src, &config, as_of);
        let history = queries.part_history("ABC-1").unwrap();
        let s = summarize("ABC-1", &history, None, &config, as_of);

        assert_eq!(s.total_builds, 4);
        assert_eq!(s.builds_by_revision.get("B"), Some(&1));
        assert_eq!(s.sql_cost, 50.0);
        assert_eq!(s.recent_unit_price, 100.0);
        assert_eq!(s.estimated_margin, 0.5);
        assert_eq!(s.annual_revenue[&2026], 1000.0);
        assert_eq!(s.annual_revenue[&2024], 400.0);
        assert_eq!(s.avg_annual_revenue, 1400.0 / 6.0);
        assert_eq!(s.risk_by_avg_annual, RiskTier::Low);
        assert_eq!(s.recent_std_cost, 40.0);
    }

    #[test]
    fn bulk_report_collects_all_sheets() {
        use crate::config::ReportConfig;
        use crate::db::HistoryQueries;

        let src = memory_source();
        insert_master(&src, "A-1", "A", 1.0);
        insert_master(&src, "B-2", "A", 1.0);
        insert_job(&src, "J1", "A-1", "A", 1.0, "CLOSED", "2025-04-01", 3.0);
        insert_order(&src, "SO1", "B-2", "A", 1.0, 9.0, "2026-03-01");

        let config = ReportConfig::default();
        let queries = HistoryQueries::new(&src, &config, d("2026-10-19"));
        let report = queries.report(&parts(&["A-1", "B-2", "C-3"])).unwrap();
        let rows = report.summary_rows();
        assert_eq!((rows[0].records, rows[0].unique_parts), (1, 1));
        assert_eq!((rows[1].records, rows[1].unique_parts), (1, 1));
        assert_eq!((rows[2].records, rows[2].unique_parts), (2, 2));
    }
}
