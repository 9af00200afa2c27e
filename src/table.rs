//! Feature table export
//!
//! Flattens per-user feature records into a table with one row per user and
//! an identical column set on every row. A feature a user lacks, or an
//! undefined (NaN) measure, is written as an empty CSV cell or JSON `null`.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::error::ComputeError;
use crate::types::{FeatureRecord, FeatureValue, UserId};

/// Name of the leading identifier column
pub const USER_ID_COLUMN: &str = "user_id";

/// Serialization format for a [`FeatureTable`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableFormat {
    #[default]
    Csv,
    /// JSON array of row objects
    Json,
    JsonPretty,
    /// One JSON row object per line
    Ndjson,
}

/// One user's row
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub user_id: UserId,
    /// One cell per feature column, `None` where the user has no value
    pub cells: Vec<Option<FeatureValue>>,
}

/// Per-user features in tabular form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    columns: Vec<String>,
    rows: Vec<FeatureRow>,
}

impl FeatureTable {
    /// Build a table from per-user records.
    ///
    /// Rows are ordered by user id; feature columns are the sorted union of
    /// all feature names.
    pub fn from_records(records: &BTreeMap<UserId, FeatureRecord>) -> Self {
        let columns: Vec<String> = records
            .values()
            .flat_map(FeatureRecord::names)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();

        let rows = records
            .iter()
            .map(|(user_id, record)| FeatureRow {
                user_id: user_id.clone(),
                cells: columns.iter().map(|name| record.get(name)).collect(),
            })
            .collect();

        Self { columns, rows }
    }

    /// Feature column names, excluding `user_id`
    pub fn feature_columns(&self) -> &[String] {
        &self.columns
    }

    /// Full header: `user_id` followed by the feature columns
    pub fn header(&self) -> Vec<&str> {
        std::iter::once(USER_ID_COLUMN)
            .chain(self.columns.iter().map(String::as_str))
            .collect()
    }

    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Look up a single cell
    pub fn value(&self, user_id: &str, column: &str) -> Option<FeatureValue> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows
            .iter()
            .find(|row| row.user_id == user_id)
            .and_then(|row| row.cells[index])
    }

    pub fn write<W: Write>(&self, writer: W, format: TableFormat) -> Result<(), ComputeError> {
        match format {
            TableFormat::Csv => self.write_csv(writer),
            TableFormat::Json => Ok(serde_json::to_writer(writer, self)?),
            TableFormat::JsonPretty => Ok(serde_json::to_writer_pretty(writer, self)?),
            TableFormat::Ndjson => self.write_ndjson(writer),
        }
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), ComputeError> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(self.header())?;
        for row in &self.rows {
            let cells = row.cells.iter().map(|cell| csv_cell(*cell));
            wtr.write_record(std::iter::once(row.user_id.clone()).chain(cells))?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn write_ndjson<W: Write>(&self, mut writer: W) -> Result<(), ComputeError> {
        for row in &self.rows {
            serde_json::to_writer(&mut writer, &self.row_view(row))?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    fn row_view<'a>(&'a self, row: &'a FeatureRow) -> RowView<'a> {
        RowView {
            columns: &self.columns,
            row,
        }
    }
}

fn csv_cell(cell: Option<FeatureValue>) -> String {
    match cell {
        Some(FeatureValue::Count(n)) => n.to_string(),
        Some(FeatureValue::Real(x)) if !x.is_nan() => format!("{x:?}"),
        _ => String::new(),
    }
}

/// A row serialized as an object in column order
struct RowView<'a> {
    columns: &'a [String],
    row: &'a FeatureRow,
}

impl Serialize for RowView<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len() + 1))?;
        map.serialize_entry(USER_ID_COLUMN, &self.row.user_id)?;
        for (column, cell) in self.columns.iter().zip(&self.row.cells) {
            map.serialize_entry(column, cell)?;
        }
        map.end()
    }
}

impl Serialize for FeatureTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for row in &self.rows {
            seq.serialize_element(&self.row_view(row))?;
        }
        seq.end()
    }
}
