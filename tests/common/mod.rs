#![allow(dead_code)]

use std::path::Path;

use rust_xlsxwriter::{Format, Workbook, Worksheet};

use retail_etl::config::PipelineConfig;

pub const ORDER_HEADER: [&str; 24] = [
    "Row ID",
    "Order ID",
    "Order Date",
    "Ship Date",
    "Ship Mode",
    "Customer ID",
    "Customer Name",
    "Segment",
    "City",
    "State",
    "Country",
    "Postal Code",
    "Market",
    "Region",
    "Product ID",
    "Category",
    "Sub-Category",
    "Product Name",
    "Sales",
    "Quantity",
    "Discount",
    "Profit",
    "Shipping Cost",
    "Order Priority",
];

/// One worksheet cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Num(f64),
    /// Day serial with a date number format.
    Date(f64),
    Blank,
}

pub fn text(s: &str) -> Cell {
    Cell::Text(s.to_string())
}

/// Fields of one orders row that the tests vary.
#[derive(Debug, Clone)]
pub struct Order {
    pub row_id: f64,
    pub order_id: &'static str,
    pub order_date: f64,
    pub customer_id: &'static str,
    pub state: &'static str,
    pub country: &'static str,
    pub postal_code: Option<f64>,
    pub region: &'static str,
    pub product_id: &'static str,
    pub sales: f64,
    pub quantity: Option<f64>,
    pub discount: f64,
    pub profit: f64,
}

impl Order {
    pub fn new(row_id: f64, order_id: &'static str) -> Self {
        Self {
            row_id,
            order_id,
            // 2016-01-05
            order_date: 42374.0,
            customer_id: "AB-100",
            state: "New York",
            country: "United States",
            postal_code: Some(10024.0),
            region: "East",
            product_id: "OFF-PA-1",
            sales: 100.0,
            quantity: Some(1.0),
            discount: 0.0,
            profit: 10.0,
        }
    }

    pub fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Num(self.row_id),
            if self.order_id.is_empty() {
                Cell::Blank
            } else {
                text(self.order_id)
            },
            Cell::Date(self.order_date),
            Cell::Date(self.order_date + 4.0),
            text("Standard Class"),
            text(self.customer_id),
            text("Alex Bell"),
            text("Consumer"),
            text("Springfield"),
            text(self.state),
            text(self.country),
            self.postal_code.map_or(Cell::Blank, Cell::Num),
            text(if self.country == "Canada" { "Canada" } else { "US" }),
            text(self.region),
            text(self.product_id),
            text("Office Supplies"),
            text("Paper"),
            text("Copy Paper"),
            Cell::Num(self.sales),
            self.quantity.map_or(Cell::Blank, Cell::Num),
            Cell::Num(self.discount),
            Cell::Num(self.profit),
            Cell::Num(4.5),
            text("Medium"),
        ]
    }
}

/// The standard fixture orders.
///
/// - `CA-1` is returned twice (fan-out) and its row appears twice verbatim (exact duplicate)
/// - `CA-2` / `CA-3` are Canadian rows in an eastern / western province
/// - `CA-3` has zero sales and an order-date serial of 1
/// - `CA-4` has a blank postal code and a discount of 1.5
/// - the last row has no order id
pub fn standard_orders() -> Vec<Order> {
    let ca1 = Order {
        sales: 200.0,
        quantity: Some(2.0),
        discount: 0.2,
        profit: 50.0,
        ..Order::new(1.0, "CA-1")
    };
    vec![
        ca1.clone(),
        Order {
            state: "Ontario",
            country: "Canada",
            region: "Canada",
            customer_id: "CD-200",
            product_id: "TEC-PH-2",
            ..Order::new(2.0, "CA-2")
        },
        Order {
            state: "Alberta",
            country: "Canada",
            region: "Canada",
            order_date: 1.0,
            sales: 0.0,
            profit: 5.0,
            ..Order::new(3.0, "CA-3")
        },
        Order {
            state: "Texas",
            region: "Central",
            postal_code: None,
            discount: 1.5,
            ..Order::new(4.0, "CA-4")
        },
        Order::new(5.0, ""),
        ca1,
    ]
}

pub fn standard_returns() -> Vec<Vec<Cell>> {
    vec![
        vec![text("Yes"), text("CA-1"), text("East")],
        vec![text("yes"), text("CA-1"), text("East")],
        vec![text("No"), text("CA-3"), text("Western Canada")],
    ]
}

pub fn standard_people() -> Vec<Vec<Cell>> {
    vec![
        vec![text("Anna Andreadi"), text("East")],
        vec![text("Chuck Magee"), text("Eastern Canada")],
        vec![text("Kelly\u{a0}Lampkin"), text("Central")],
        vec![text("Someone Else"), text("Central")],
    ]
}

fn write_sheet(
    ws: &mut Worksheet,
    name: &str,
    header: &[&str],
    rows: &[Vec<Cell>],
    date_format: &Format,
) {
    ws.set_name(name).unwrap();
    for (c, h) in header.iter().enumerate() {
        ws.write_string(0, c as u16, *h).unwrap();
    }
    for (r, row) in rows.iter().enumerate() {
        let r = (r + 1) as u32;
        for (c, cell) in row.iter().enumerate() {
            let c = c as u16;
            match cell {
                Cell::Text(s) => {
                    ws.write_string(r, c, s.as_str()).unwrap();
                }
                Cell::Num(n) => {
                    ws.write_number(r, c, *n).unwrap();
                }
                Cell::Date(serial) => {
                    ws.write_number_with_format(r, c, *serial, date_format).unwrap();
                }
                Cell::Blank => {}
            }
        }
    }
}

/// One sheet of a fixture workbook.
pub struct Sheet<'a> {
    pub name: &'a str,
    pub header: &'a [&'a str],
    pub rows: Vec<Vec<Cell>>,
}

pub fn write_sheets(path: &Path, sheets: &[Sheet<'_>]) {
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    let mut wb = Workbook::new();
    for sheet in sheets {
        write_sheet(
            wb.add_worksheet(),
            sheet.name,
            sheet.header,
            &sheet.rows,
            &date_format,
        );
    }
    wb.save(path).unwrap();
}

pub fn orders_sheet(orders: &[Order]) -> Sheet<'static> {
    Sheet {
        name: "Orders",
        header: &ORDER_HEADER,
        rows: orders.iter().map(Order::cells).collect(),
    }
}

pub fn returns_sheet(rows: Vec<Vec<Cell>>) -> Sheet<'static> {
    Sheet {
        name: "Returns",
        header: &["Returned", "Order ID", "Region"],
        rows,
    }
}

pub fn people_sheet(rows: Vec<Vec<Cell>>) -> Sheet<'static> {
    Sheet {
        name: "People",
        header: &["Person", "Region"],
        rows,
    }
}

/// A config whose every path lives under `dir`.
pub fn config_in(dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.source.workbook = dir.join("raw").join("superstore.xlsx");
    config.output.csv_path = dir.join("processed").join("cleaned_orders.csv");
    config.output.parquet_path = dir.join("processed").join("cleaned_orders.parquet");
    config.warehouse.dir = dir.join("warehouse");
    config.warehouse.reports_dir = dir.join("reports");
    config
}

/// `config_in(dir)` with `sheets` written to its source workbook path.
pub fn setup_with(dir: &Path, sheets: &[Sheet<'_>]) -> PipelineConfig {
    let config = config_in(dir);
    std::fs::create_dir_all(config.source.workbook.parent().unwrap()).unwrap();
    write_sheets(&config.source.workbook, sheets);
    config
}

/// `config_in(dir)` with the standard workbook.
pub fn standard_setup(dir: &Path) -> PipelineConfig {
    setup_with(
        dir,
        &[
            orders_sheet(&standard_orders()),
            returns_sheet(standard_returns()),
            people_sheet(standard_people()),
        ],
    )
}
