//! Join orders, returns and people into one denormalized record set.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::cleaning::validate::is_missing_key;
use crate::error::{PipelineError, PipelineResult, Stage};
use crate::observability::{Diagnostic, PipelineObserver, Severity, StageStats};
use crate::types::{DataSet, DataType, Field, Value, ValueKey};

/// Canadian provinces mapped to the "Eastern Canada" region; every other Canadian state is
/// "Western Canada".
pub const EASTERN_CANADA: [&str; 6] = [
    "Ontario",
    "Quebec",
    "Nova Scotia",
    "New Brunswick",
    "Prince Edward Island",
    "Newfoundland and Labrador",
];

pub const UNKNOWN_PERSON: &str = "Unknown";

/// How a missing region is named in the unmatched-region list.
pub const NULL_REGION: &str = "<null>";

/// Counts produced by [`merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub rows_in: usize,
    pub rows_out: usize,
    pub returned_yes: usize,
    pub canada_rows_rewritten: usize,
    pub canada_split_skipped: bool,
    pub people_join_skipped: bool,
    pub unmatched_region_rows: usize,
    /// Distinct region values with no people entry, sorted.
    pub unmatched_regions: Vec<String>,
}

/// Join `orders` with `returns` (left, fan-out) and `people` (left, on the rewritten region).
///
/// Fails with [`PipelineError::MissingColumns`] if returns lacks `order_id`/`returned` or orders
/// lacks `order_id`. Everything else degrades to diagnostics.
pub fn merge(
    orders: DataSet,
    returns: &DataSet,
    people: &DataSet,
    observer: &dyn PipelineObserver,
) -> PipelineResult<(DataSet, MergeReport)> {
    let missing: Vec<&str> = ["order_id", "returned"]
        .into_iter()
        .filter(|c| !returns.schema.contains(c))
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::missing_columns("returns", &missing));
    }
    if !orders.schema.contains("order_id") {
        return Err(PipelineError::missing_columns("orders", &["order_id"]));
    }

    let mut report = MergeReport {
        rows_in: orders.row_count(),
        ..MergeReport::default()
    };

    let mut merged = join_returns(orders, returns)?;
    report.returned_yes = merged
        .column("returned")
        .map(|col| col.filter(|v| v.as_str() == Some("Yes")).count())
        .unwrap_or(0);
    if merged.row_count() > report.rows_in {
        observer.on_diagnostic(&Diagnostic::info(
            Stage::Merge,
            format!(
                "returns join fanned out by {} rows",
                merged.row_count() - report.rows_in
            ),
        ));
    }

    match split_canada(&mut merged) {
        Some(n) => report.canada_rows_rewritten = n,
        None => {
            report.canada_split_skipped = true;
            observer.on_diagnostic(&Diagnostic::new(
                Stage::Merge,
                Severity::Warning,
                "'country' or 'state' missing; Canada region split skipped",
            ));
        }
    }

    join_people(&mut merged, people, &mut report, observer);

    report.rows_out = merged.row_count();
    observer.on_stage_finished(
        Stage::Merge,
        StageStats {
            rows_in: report.rows_in,
            rows_out: report.rows_out,
        },
    );
    Ok((merged, report))
}

/// Normalize a raw `returned` cell to exactly `"Yes"` or `"No"`.
pub fn normalize_returned(v: &Value) -> &'static str {
    let text = v.to_text();
    let mut chars = text.trim().chars();
    let capitalized: String = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.as_str().to_lowercase().chars()).collect(),
        None => String::new(),
    };
    if capitalized == "Yes" { "Yes" } else { "No" }
}

fn join_returns(mut orders: DataSet, returns: &DataSet) -> PipelineResult<DataSet> {
    let (r_key, r_val) = match (
        returns.schema.index_of("order_id"),
        returns.schema.index_of("returned"),
    ) {
        (Some(k), Some(v)) => (k, v),
        _ => return Err(PipelineError::missing_columns("returns", &["order_id", "returned"])),
    };

    let mut lookup: HashMap<ValueKey<'_>, Vec<&Value>> = HashMap::new();
    for row in &returns.rows {
        if !is_missing_key(&row[r_key]) {
            lookup.entry(ValueKey(&row[r_key])).or_default().push(&row[r_val]);
        }
    }

    // A stale `returned` column on orders would shadow the joined one.
    orders.drop_column("returned");
    let order_idx = orders
        .schema
        .index_of("order_id")
        .ok_or_else(|| PipelineError::missing_columns("orders", &["order_id"]))?;

    let mut rows = Vec::with_capacity(orders.rows.len());
    for mut row in orders.rows {
        let matches = if is_missing_key(&row[order_idx]) {
            None
        } else {
            lookup.get(&ValueKey(&row[order_idx]))
        };
        match matches {
            Some(hits) => {
                for hit in hits {
                    let mut fanned = row.clone();
                    fanned.push(Value::Utf8(normalize_returned(hit).to_string()));
                    rows.push(fanned);
                }
            }
            None => {
                row.push(Value::Utf8("No".to_string()));
                rows.push(row);
            }
        }
    }

    let mut schema = orders.schema;
    schema.fields.push(Field::new("returned", DataType::Categorical));
    Ok(DataSet::new(schema, rows))
}

/// Rewrite `region` for Canadian rows by province. `None` if `country` or `state` is absent.
pub fn split_canada(ds: &mut DataSet) -> Option<usize> {
    let country = ds.schema.index_of("country")?;
    let state = ds.schema.index_of("state")?;
    let region = ds.ensure_column("region", DataType::Mixed);

    let mut rewritten = 0;
    for row in &mut ds.rows {
        if row[country].as_str() != Some("Canada") {
            continue;
        }
        let eastern = row[state].as_str().is_some_and(|s| EASTERN_CANADA.contains(&s));
        let name = if eastern { "Eastern Canada" } else { "Western Canada" };
        row[region] = Value::Utf8(name.to_string());
        rewritten += 1;
    }
    Some(rewritten)
}

fn join_people(
    ds: &mut DataSet,
    people: &DataSet,
    report: &mut MergeReport,
    observer: &dyn PipelineObserver,
) {
    ds.drop_column("person");

    let keys = (
        ds.schema.index_of("region"),
        people.schema.index_of("region"),
        people.schema.index_of("person"),
    );
    let (Some(region), Some(p_region), Some(p_person)) = keys else {
        report.people_join_skipped = true;
        ds.push_column(Field::new("person", DataType::Utf8), |_| {
            Value::Utf8(UNKNOWN_PERSON.to_string())
        });
        observer.on_diagnostic(&Diagnostic::warning(
            Stage::Merge,
            "people lookup unavailable (no 'region'/'person'); person set to 'Unknown'",
            ds.row_count(),
        ));
        return;
    };

    let mut lookup: HashMap<ValueKey<'_>, &Value> = HashMap::new();
    for row in &people.rows {
        if !row[p_region].is_null() {
            lookup.entry(ValueKey(&row[p_region])).or_insert(&row[p_person]);
        }
    }

    let mut unmatched_rows = 0usize;
    let mut unmatched: BTreeSet<String> = BTreeSet::new();
    ds.push_column(Field::new("person", DataType::Utf8), |row| {
        match lookup.get(&ValueKey(&row[region])) {
            Some(person) if !person.is_null() => Value::Utf8(person.to_text()),
            _ => {
                unmatched_rows += 1;
                unmatched.insert(match &row[region] {
                    Value::Null => NULL_REGION.to_string(),
                    v => v.to_text(),
                });
                Value::Utf8(UNKNOWN_PERSON.to_string())
            }
        }
    });

    report.unmatched_region_rows = unmatched_rows;
    report.unmatched_regions = unmatched.into_iter().collect();
    if unmatched_rows > 0 {
        observer.on_diagnostic(&Diagnostic::warning(
            Stage::Merge,
            format!(
                "unmatched regions filled with 'Unknown': {:?}",
                report.unmatched_regions
            ),
            unmatched_rows,
        ));
    }
}
