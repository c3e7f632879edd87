//! BI extracts: six queries over the star schema, each written as its own CSV.

use std::path::{Path, PathBuf};

use polars::prelude::*;

use crate::error::{PipelineResult, Stage};
use crate::export::write_atomically;
use crate::observability::{Diagnostic, PipelineObserver, StageStats};

use super::Warehouse;

/// Output file name and query for each extract.
pub const REPORTS: [(&str, &str); 6] = [
    (
        "kpi_overview.csv",
        "SELECT SUM(sales) AS total_revenue, \
                SUM(profit) AS total_profit, \
                COUNT(DISTINCT order_id) AS total_orders, \
                COUNT(DISTINCT customer_id) AS total_customers, \
                ROUND(SUM(profit) / NULLIF(SUM(sales), 0), 4) AS profit_margin \
         FROM fact_sales",
    ),
    (
        "monthly_sales_trends.csv",
        "SELECT order_year, order_month, \
                SUM(sales) AS revenue, \
                SUM(profit) AS profit, \
                COUNT(DISTINCT order_id) AS orders, \
                COUNT(DISTINCT customer_id) AS active_customers \
         FROM ( \
             SELECT EXTRACT(YEAR FROM order_date) AS order_year, \
                    EXTRACT(MONTH FROM order_date) AS order_month, \
                    sales, profit, order_id, customer_id \
             FROM fact_sales \
             WHERE order_date IS NOT NULL \
         ) AS monthly \
         GROUP BY order_year, order_month \
         ORDER BY order_year, order_month",
    ),
    (
        "product_performance.csv",
        "SELECT f.product_id AS product_id, \
                p.product_name AS product_name, \
                p.category AS category, \
                p.sub_category AS sub_category, \
                SUM(f.sales) AS revenue, \
                SUM(f.profit) AS profit, \
                SUM(f.quantity) AS units_sold, \
                ROUND(SUM(f.profit) / NULLIF(SUM(f.sales), 0), 4) AS profit_margin \
         FROM fact_sales f \
         JOIN dim_product p ON f.product_id = p.product_id \
         GROUP BY f.product_id, p.product_name, p.category, p.sub_category \
         ORDER BY revenue DESC",
    ),
    (
        "customer_loyalty.csv",
        "SELECT customer_id, \
                COUNT(DISTINCT order_id) AS order_count, \
                SUM(sales) AS lifetime_revenue, \
                SUM(profit) AS lifetime_profit, \
                MIN(order_date) AS first_order_date, \
                MAX(order_date) AS last_order_date \
         FROM fact_sales \
         GROUP BY customer_id \
         ORDER BY customer_id",
    ),
    (
        "regional_performance.csv",
        "SELECT c.market AS market, \
                c.region AS region, \
                SUM(f.sales) AS revenue, \
                SUM(f.profit) AS profit, \
                COUNT(DISTINCT f.order_id) AS orders, \
                COUNT(DISTINCT f.customer_id) AS customers \
         FROM fact_sales f \
         JOIN dim_customer c ON f.customer_id = c.customer_id \
         GROUP BY c.market, c.region \
         ORDER BY market, region",
    ),
    (
        "discount_profitability.csv",
        "SELECT discount, \
                COUNT(DISTINCT order_id) AS orders, \
                SUM(sales) AS revenue, \
                SUM(profit) AS profit, \
                ROUND(SUM(profit) / NULLIF(SUM(sales), 0), 4) AS profit_margin \
         FROM fact_sales \
         GROUP BY discount \
         ORDER BY discount",
    ),
];

/// One written extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOutput {
    pub path: PathBuf,
    pub rows: usize,
}

/// Run every extract query and write the results under `out_dir`.
pub fn export_reports(
    wh: &mut Warehouse,
    out_dir: &Path,
    observer: &dyn PipelineObserver,
) -> PipelineResult<Vec<ReportOutput>> {
    let mut outputs = Vec::with_capacity(REPORTS.len());
    for (file_name, sql) in REPORTS {
        let mut df = wh.execute(sql)?;
        let path = out_dir.join(file_name);
        write_atomically(&path, |file| {
            CsvWriter::new(file).include_header(true).finish(&mut df)?;
            Ok(())
        })?;
        observer.on_diagnostic(
            &Diagnostic::info(Stage::Report, format!("exported {file_name}")).with_rows(df.height()),
        );
        outputs.push(ReportOutput {
            path,
            rows: df.height(),
        });
    }
    observer.on_stage_finished(
        Stage::Report,
        StageStats {
            rows_in: wh.table("fact_sales").map_or(0, |df| df.height()),
            rows_out: outputs.iter().map(|o| o.rows).sum(),
        },
    );
    Ok(outputs)
}
