//! Auxiliary time-series data uploaded with a model

use std::io;
use std::path::Path;

use itertools::Itertools;

use crate::common::{CraneError, CraneResult, TimeGrid, TIME_KEY};

/// Column-oriented table whose first column is `time`
#[derive(Debug, Clone, PartialEq)]
pub struct DataTable {
    columns: Vec<(String, Vec<f64>)>,
}

impl DataTable {
    pub fn from_time_grid(grid: &TimeGrid) -> Self {
        Self {
            columns: vec![(TIME_KEY.to_string(), grid.points().to_vec())],
        }
    }

    /// Append a measured or prescribed signal
    pub fn with_column(mut self, name: &str, values: Vec<f64>) -> CraneResult<Self> {
        let name = name.trim().to_lowercase();
        if self.column(&name).is_some() {
            return Err(CraneError::DataError(format!("duplicate column '{}'", name)));
        }
        self.columns.push((name, values));
        self.validate()?;
        Ok(self)
    }

    pub fn time(&self) -> &[f64] {
        self.columns.first().map(|(_, v)| v.as_slice()).unwrap_or(&[])
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        let key = name.trim().to_lowercase();
        self.columns
            .iter()
            .find(|(n, _)| *n == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.time().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validate(&self) -> CraneResult<()> {
        match self.columns.first() {
            Some((name, _)) if name == TIME_KEY => {}
            _ => {
                return Err(CraneError::DataError(
                    "first data column must be 'time'".to_string(),
                ))
            }
        }
        let time = self.time();
        if time.is_empty() {
            return Err(CraneError::DataError("data table has no rows".to_string()));
        }
        if time.iter().tuple_windows().any(|(a, b)| !(b > a)) {
            return Err(CraneError::DataError(
                "time column must be strictly increasing".to_string(),
            ));
        }
        for (name, values) in &self.columns {
            if values.len() != time.len() {
                return Err(CraneError::DataError(format!(
                    "column '{}' has {} rows, expected {}",
                    name,
                    values.len(),
                    time.len()
                )));
            }
            if let Some(row) = values.iter().position(|v| !v.is_finite()) {
                return Err(CraneError::DataError(format!(
                    "column '{}' has a non-finite value in row {}",
                    name,
                    row + 1
                )));
            }
        }
        Ok(())
    }

    /// Read a CSV file with a header row. Columns are lowercased.
    pub fn from_reader<R: io::Read>(reader: R) -> CraneResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut columns: Vec<(String, Vec<f64>)> = reader
            .headers()?
            .iter()
            .map(|h| (h.to_lowercase(), Vec::new()))
            .collect();

        for (row, record) in reader.records().enumerate() {
            let record = record?;
            for ((name, values), field) in columns.iter_mut().zip(record.iter()) {
                let value = field.parse::<f64>().map_err(|_| {
                    CraneError::DataError(format!(
                        "row {}: '{}' in column '{}' is not a number",
                        row + 1,
                        field,
                        name
                    ))
                })?;
                values.push(value);
            }
        }

        let table = Self { columns };
        table.validate()?;
        Ok(table)
    }

    pub fn from_path(path: &Path) -> CraneResult<Self> {
        let file = std::fs::File::open(path).map_err(|e| {
            CraneError::DataError(format!("cannot open {}: {}", path.display(), e))
        })?;
        Self::from_reader(file)
    }

    pub fn to_csv_string(&self) -> CraneResult<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(self.names())?;
        for row in 0..self.len() {
            writer.write_record(self.columns.iter().map(|(_, v)| v[row].to_string()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| CraneError::DataError(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| CraneError::DataError(e.to_string()))
    }
}
