//! CSV export: header row, comma-separated, categoricals as plain text, dates as `YYYY-MM-DD`.

use std::path::Path;

use crate::error::PipelineResult;
use crate::types::DataSet;

use super::write_atomically;

/// Write `ds` as CSV to `path`, atomically.
pub fn write_csv(ds: &DataSet, path: impl AsRef<Path>) -> PipelineResult<()> {
    write_atomically(path.as_ref(), |file| {
        let mut wtr = csv::WriterBuilder::new().has_headers(true).from_writer(file);
        wtr.write_record(ds.schema.field_names())?;
        for row in &ds.rows {
            wtr.write_record(row.iter().map(|v| v.to_string()))?;
        }
        wtr.flush()?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataType, Field, Schema, Value};
    use chrono::NaiveDate;

    #[test]
    fn writes_header_and_rendered_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("orders.csv");
        let ds = DataSet::new(
            Schema::new(vec![
                Field::new("order_id", DataType::Utf8),
                Field::new("order_date", DataType::Date),
                Field::new("sales", DataType::Float64),
                Field::new("segment", DataType::Categorical),
            ]),
            vec![
                vec![
                    Value::Utf8("CA-1, A".to_string()),
                    Value::Date(NaiveDate::from_ymd_opt(2016, 1, 2).unwrap()),
                    Value::Float64(12.5),
                    Value::Utf8("Consumer".to_string()),
                ],
                vec![Value::Utf8("CA-2".to_string()), Value::Null, Value::Null, Value::Null],
            ],
        );

        write_csv(&ds, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "order_id,order_date,sales,segment\n\"CA-1, A\",2016-01-02,12.5,Consumer\nCA-2,,,\n"
        );
    }
}
