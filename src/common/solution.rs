//! Solution table shared by the remote and local pipelines

use std::path::Path;

use crate::common::error::{CraneError, CraneResult};

/// Name of the column every solution is keyed by
pub const TIME_KEY: &str = "time";

/// Time-aligned values per variable, produced once per solve
#[derive(Debug, Clone, PartialEq)]
pub struct SolutionTable {
    time: Vec<f64>,
    columns: Vec<(String, Vec<f64>)>,
    scalars: Vec<(String, f64)>,
}

impl SolutionTable {
    pub fn new(time: Vec<f64>) -> Self {
        Self {
            time,
            columns: Vec::new(),
            scalars: Vec::new(),
        }
    }

    /// Add a column aligned with the time column
    pub fn insert(&mut self, name: &str, values: Vec<f64>) -> CraneResult<()> {
        let key = normalize_key(name);
        if key == TIME_KEY || self.get(&key).is_some() {
            return Err(CraneError::DataError(format!("duplicate column '{}'", key)));
        }
        if values.len() != self.time.len() {
            return Err(CraneError::DataError(format!(
                "column '{}' has {} samples, expected {}",
                key,
                values.len(),
                self.time.len()
            )));
        }
        self.columns.push((key, values));
        Ok(())
    }

    pub fn insert_scalar(&mut self, name: &str, value: f64) {
        self.scalars.push((normalize_key(name), value));
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        let key = normalize_key(name);
        if key == TIME_KEY {
            return Some(&self.time);
        }
        self.columns
            .iter()
            .find(|(n, _)| *n == key)
            .map(|(_, v)| v.as_slice())
    }

    pub fn require(&self, name: &str) -> CraneResult<&[f64]> {
        self.get(name).ok_or_else(|| {
            CraneError::DataError(format!("solution has no column '{}'", normalize_key(name)))
        })
    }

    pub fn scalar(&self, name: &str) -> Option<f64> {
        let key = normalize_key(name);
        self.scalars.iter().find(|(n, _)| *n == key).map(|(_, v)| *v)
    }

    /// Column names, `time` first
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(TIME_KEY).chain(self.columns.iter().map(|(n, _)| n.as_str()))
    }

    /// Number of time samples
    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    /// Parse the row-oriented `results.csv` layout: `name, v0, v1, ...`
    pub fn from_row_csv(text: &str) -> CraneResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let mut rows: Vec<(String, Vec<f64>)> = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut cells = record.iter().filter(|c| !c.is_empty());
            let name = match cells.next() {
                Some(name) => normalize_key(name),
                None => continue,
            };
            let values = cells
                .map(|c| {
                    c.parse::<f64>().map_err(|_| {
                        CraneError::DataError(format!("row '{}' has non-numeric value '{}'", name, c))
                    })
                })
                .collect::<CraneResult<Vec<f64>>>()?;
            rows.push((name, values));
        }

        if rows.is_empty() {
            return Err(CraneError::DataError("solution is empty".to_string()));
        }
        let time_row = rows
            .iter()
            .position(|(n, _)| n == TIME_KEY)
            .ok_or_else(|| CraneError::DataError("solution has no time row".to_string()))?;
        let (_, time) = rows.remove(time_row);

        let mut table = Self::new(time);
        for (name, values) in rows {
            if values.len() == 1 && table.len() != 1 {
                table.insert_scalar(&name, values[0]);
            } else {
                table.insert(&name, values)?;
            }
        }
        Ok(table)
    }

    /// Write the table in the same row-oriented layout it is fetched in
    pub fn to_row_csv(&self) -> CraneResult<String> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());
        let columns = std::iter::once((TIME_KEY, &self.time))
            .chain(self.columns.iter().map(|(n, v)| (n.as_str(), v)));
        for (name, values) in columns {
            let mut record = vec![name.to_string()];
            record.extend(values.iter().map(|v| v.to_string()));
            writer.write_record(&record)?;
        }
        for (name, value) in &self.scalars {
            writer.write_record(&[name.clone(), value.to_string()])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| CraneError::DataError(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| CraneError::DataError(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> CraneResult<()> {
        std::fs::write(path, self.to_row_csv()?)?;
        Ok(())
    }
}

fn normalize_key(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS: &str = "time, 0, 0.5, 1.0\n\
                           u, 0.0, 1.5, -2.0\n\
                           y, 0, 0.1, 0.3\n\
                           Theta, 0, 0.01, 0.02\n\
                           obj, 12.5\n";

    #[test]
    fn test_parse_row_csv() {
        let table = SolutionTable::from_row_csv(RESULTS).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.time(), &[0.0, 0.5, 1.0]);
        assert_eq!(table.get("u").unwrap(), &[0.0, 1.5, -2.0]);
        assert_eq!(table.get("theta").unwrap(), &[0.0, 0.01, 0.02]);
        assert_eq!(table.scalar("obj"), Some(12.5));
        let keys: Vec<&str> = table.keys().collect();
        assert_eq!(keys, vec!["time", "u", "y", "theta"]);
    }

    #[test]
    fn test_missing_time_row_is_rejected() {
        let err = SolutionTable::from_row_csv("u, 1, 2\n").unwrap_err();
        assert!(matches!(err, CraneError::DataError(_)));
        assert!(SolutionTable::from_row_csv("").is_err());
    }

    #[test]
    fn test_ragged_row_is_rejected() {
        let err = SolutionTable::from_row_csv("time, 0, 1, 2\nu, 1, 2\n").unwrap_err();
        assert!(err.to_string().contains("'u' has 2 samples"));
    }

    #[test]
    fn test_non_numeric_cell_is_rejected() {
        assert!(SolutionTable::from_row_csv("time, 0, 1\nu, 1, abc\n").is_err());
    }

    #[test]
    fn test_row_csv_is_reparsed_identically() {
        let table = SolutionTable::from_row_csv(RESULTS).unwrap();
        let reparsed = SolutionTable::from_row_csv(&table.to_row_csv().unwrap()).unwrap();
        assert_eq!(reparsed, table);
    }

    #[test]
    fn test_insert_checks_length() {
        let mut table = SolutionTable::new(vec![0.0, 1.0]);
        assert!(table.insert("y", vec![1.0]).is_err());
        table.insert("y", vec![1.0, 2.0]).unwrap();
        assert!(table.insert("Y", vec![1.0, 2.0]).is_err());
        assert!(table.require("v").is_err());
    }
}
