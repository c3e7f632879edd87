//! Star schema over `raw_orders`: four dimensions and one fact table.

use crate::error::{PipelineError, PipelineResult, Stage};
use crate::observability::{Diagnostic, PipelineObserver, StageStats};

use super::load::{RAW_ORDERS, RAW_PEOPLE};
use super::{empty_text_table, Warehouse};

/// Columns `raw_orders` must have for the transformation to run.
pub const REQUIRED_COLUMNS: [&str; 21] = [
    "row_id",
    "order_id",
    "order_date",
    "ship_date",
    "ship_mode",
    "customer_id",
    "customer_name",
    "segment",
    "city",
    "state",
    "country",
    "region",
    "market",
    "product_id",
    "product_name",
    "category",
    "sub_category",
    "sales",
    "quantity",
    "discount",
    "profit",
];

/// Table name and defining query, in build order.
const TABLES: [(&str, &str); 5] = [
    (
        "dim_date",
        "SELECT d AS date_key, \
                EXTRACT(YEAR FROM d) AS \"year\", \
                EXTRACT(QUARTER FROM d) AS \"quarter\", \
                EXTRACT(MONTH FROM d) AS \"month\", \
                EXTRACT(DAY FROM d) AS \"day\" \
         FROM ( \
             SELECT order_date AS d FROM raw_orders WHERE order_date IS NOT NULL \
             UNION \
             SELECT ship_date AS d FROM raw_orders WHERE ship_date IS NOT NULL \
         ) AS dates \
         ORDER BY date_key",
    ),
    (
        "dim_customer",
        "SELECT customer_id, \
                MIN(customer_name) AS customer_name, \
                MIN(segment) AS segment, \
                MIN(city) AS city, \
                MIN(state) AS state, \
                MIN(country) AS country, \
                MIN(region) AS region, \
                MIN(market) AS market \
         FROM raw_orders \
         WHERE customer_id IS NOT NULL \
         GROUP BY customer_id \
         ORDER BY customer_id",
    ),
    (
        "dim_product",
        "SELECT product_id, \
                MIN(product_name) AS product_name, \
                MIN(category) AS category, \
                MIN(sub_category) AS sub_category \
         FROM raw_orders \
         WHERE product_id IS NOT NULL \
         GROUP BY product_id \
         ORDER BY product_id",
    ),
    (
        "dim_people",
        "SELECT region, MIN(person) AS person \
         FROM raw_people \
         WHERE region IS NOT NULL \
         GROUP BY region \
         ORDER BY region",
    ),
    (
        "fact_sales",
        "SELECT row_id, order_id, order_date, ship_date, ship_mode, \
                customer_id, product_id, region, market, \
                sales, quantity, discount, profit \
         FROM raw_orders",
    ),
];

/// Post-transform row count per table, in build order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformReport {
    pub row_counts: Vec<(String, usize)>,
}

impl TransformReport {
    pub fn rows(&self, table: &str) -> Option<usize> {
        self.row_counts
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, n)| *n)
    }
}

/// Build `dim_date`, `dim_customer`, `dim_product`, `dim_people` and `fact_sales`.
///
/// Fails if `raw_orders` is absent or lacks any of [`REQUIRED_COLUMNS`]. A missing `raw_people`
/// is treated as empty.
pub fn build_star_schema(
    wh: &mut Warehouse,
    observer: &dyn PipelineObserver,
) -> PipelineResult<TransformReport> {
    let columns = wh.columns(RAW_ORDERS).ok_or_else(|| PipelineError::SchemaMismatch {
        message: format!("table '{RAW_ORDERS}' not found; run the load step first"),
    })?;
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .into_iter()
        .filter(|c| !columns.iter().any(|name| name == *c))
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::missing_columns(RAW_ORDERS, &missing));
    }
    if !wh.has_table(RAW_PEOPLE) {
        wh.put_table(RAW_PEOPLE, empty_text_table(&["region", "person"]));
    }

    let mut report = TransformReport::default();
    for (table, sql) in TABLES {
        let rows = wh.create_table(table, sql)?;
        observer.on_diagnostic(
            &Diagnostic::info(Stage::Transform, format!("{table} built")).with_rows(rows),
        );
        report.row_counts.push((table.to_string(), rows));
    }

    observer.on_stage_finished(
        Stage::Transform,
        StageStats {
            rows_in: wh.table(RAW_ORDERS).map_or(0, |df| df.height()),
            rows_out: report.rows("fact_sales").unwrap_or(0),
        },
    );
    Ok(report)
}
