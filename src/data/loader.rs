use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use rustc_hash::FxHashMap;
use tracing::debug;

use super::{DiscreteDataset, Variable};
use crate::error::{Result, SearchError};

impl DiscreteDataset {
    /// Loads a headed CSV file; see [`DiscreteDataset::from_reader`].
    pub fn from_csv_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let dataset = Self::from_reader(file)?;
        debug!(
            path = %path.display(),
            rows = dataset.rows,
            variables = dataset.variables.len(),
            "data.csv.loaded"
        );
        Ok(dataset)
    }

    /// Parses CSV with a header row. Every distinct cell text of a column
    /// becomes a category; categories are sorted so indices are stable
    /// across row orderings.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);
        let names: Vec<String> = reader.headers()?.iter().map(str::to_owned).collect();
        if names.is_empty() {
            return Err(SearchError::Data("csv has no columns".into()));
        }

        let mut raw: Vec<Vec<String>> = vec![Vec::new(); names.len()];
        for (line, record) in reader.records().enumerate() {
            let record = record?;
            if record.len() != names.len() {
                return Err(SearchError::Data(format!(
                    "row {} has {} cells, expected {}",
                    line + 1,
                    record.len(),
                    names.len()
                )));
            }
            for (column, cell) in raw.iter_mut().zip(record.iter()) {
                column.push(cell.to_owned());
            }
        }
        if raw[0].is_empty() {
            return Err(SearchError::Data("csv has no data rows".into()));
        }

        let mut variables = Vec::with_capacity(names.len());
        let mut columns = Vec::with_capacity(names.len());
        for (name, cells) in names.into_iter().zip(raw) {
            let categories: Vec<String> = cells
                .iter()
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();
            let lookup: FxHashMap<&str, u32> = categories
                .iter()
                .enumerate()
                .map(|(i, c)| (c.as_str(), i as u32))
                .collect();
            let column = cells.iter().map(|c| lookup[c.as_str()]).collect();
            columns.push(column);
            variables.push(Variable::new(name, categories));
        }
        DiscreteDataset::new(variables, columns)
    }
}
