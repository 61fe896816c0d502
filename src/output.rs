//! Result table assembly and CSV output
//!
//! Every requested variable becomes one column, or one `<var>..<entry>`
//! column per entry for vectors, distributions and histograms. Each parsed
//! file becomes one row.

use crate::dispatch::FileResult;
use crate::error::{OutputError, Result};
use crate::stats::{format_number, ReducedValue};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Cell rendered for a missing variable or entry
pub const MISSING: &str = "NaN";

/// Separator between a variable name and its entry in column names
pub const ENTRY_COLUMN_SEPARATOR: &str = "..";

#[derive(Debug, Clone)]
enum Column {
    Single(String),
    Entries(String, Vec<String>),
}

/// Reduced values of a batch, laid out as rows and columns
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    header: Vec<String>,
    rows: Vec<Vec<String>>,
    files: Vec<PathBuf>,
}

impl ResultTable {
    /// Balance and reduce every variable, then lay out the table
    ///
    /// `names` fixes the column order. The entry columns of a variable come
    /// from the first file (by path) that has it. Rows are sorted by path.
    pub fn build(names: &[String], mut results: Vec<FileResult>) -> Result<Self> {
        results.sort_by(|a, b| a.path.cmp(&b.path));

        let mut reduced = Vec::with_capacity(results.len());
        for result in &mut results {
            let mut values = Vec::with_capacity(names.len());
            for name in names {
                let value = match result.variables.get_mut(name) {
                    Some(var) => {
                        var.finalize()?;
                        Some(var.reduced_content()?)
                    }
                    None => None,
                };
                values.push(value);
            }
            reduced.push(values);
        }

        let columns: Vec<Column> = names
            .iter()
            .map(|name| {
                let entries = results
                    .iter()
                    .find_map(|r| r.variables.get(name))
                    .and_then(|var| var.entries());
                match entries {
                    Some(entries) if !entries.is_empty() => Column::Entries(name.clone(), entries),
                    _ => Column::Single(name.clone()),
                }
            })
            .collect();

        let header = columns
            .iter()
            .flat_map(|column| match column {
                Column::Single(name) => vec![name.clone()],
                Column::Entries(name, entries) => entries
                    .iter()
                    .map(|e| format!("{}{}{}", name, ENTRY_COLUMN_SEPARATOR, e))
                    .collect(),
            })
            .collect();

        let mut rows = Vec::with_capacity(results.len());
        for (result, values) in results.iter().zip(&reduced) {
            let mut row = Vec::new();
            for (column, value) in columns.iter().zip(values) {
                render_cells(column, value.as_ref(), &result.path, &mut row);
            }
            rows.push(row);
        }

        debug!(columns = columns.len(), rows = rows.len(), "Result table built");
        Ok(Self {
            header,
            rows,
            files: results.into_iter().map(|r| r.path).collect(),
        })
    }

    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Source file of each row
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Write header and rows as CSV
    pub fn write_csv(&self, path: &Path) -> std::result::Result<(), OutputError> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(&self.header)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn render_cells(column: &Column, value: Option<&ReducedValue>, file: &Path, row: &mut Vec<String>) {
    match (column, value) {
        (Column::Single(name), None) | (Column::Entries(name, _), None) => {
            warn!(variable = %name, file = %file.display(), "Variable missing from results");
            let width = match column {
                Column::Single(_) => 1,
                Column::Entries(_, entries) => entries.len(),
            };
            row.extend(std::iter::repeat(MISSING.to_string()).take(width));
        }
        (Column::Entries(_, entries), Some(ReducedValue::Entries(reduced))) => {
            row.extend(entries.iter().map(|e| {
                reduced
                    .get(e)
                    .map(|v| format_number(*v))
                    .unwrap_or_else(|| MISSING.to_string())
            }));
        }
        (Column::Entries(_, entries), Some(other)) => {
            row.push(other.render());
            row.extend(
                std::iter::repeat(MISSING.to_string()).take(entries.len().saturating_sub(1)),
            );
        }
        (Column::Single(_), Some(value)) => row.push(value.render()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VariableConfig;
    use crate::dispatch::{ParseUnit, VariablePlan};
    use tempfile::TempDir;

    fn plan() -> VariablePlan {
        VariablePlan::new(vec![
            VariableConfig::new("cpuIpc", "scalar"),
            VariableConfig::new("cacheMisses", "vector").with_entries(&["cpu0", "cpu1"]),
            VariableConfig::new("isa", "configuration"),
        ])
        .unwrap()
    }

    fn result(plan: &VariablePlan, path: &str, lines: &[&str]) -> FileResult {
        let variables = ParseUnit::new(path, plan).process_output(lines).unwrap();
        FileResult {
            path: PathBuf::from(path),
            variables,
            bytes: 0,
        }
    }

    #[test]
    fn test_layout_and_rendering() {
        let plan = plan();
        let results = vec![
            result(&plan, "/runs/b/stats.txt", &["scalar/cpuIpc/2.5", "configuration/isa/arm"]),
            result(
                &plan,
                "/runs/a/stats.txt",
                &[
                    "scalar/cpuIpc/1.5",
                    "vector/cacheMisses::cpu0/10",
                    "vector/cacheMisses::cpu1/20",
                    "configuration/isa/riscv",
                ],
            ),
        ];

        let table = ResultTable::build(&plan.names(), results).unwrap();
        assert_eq!(
            table.header(),
            &["cpuIpc", "cacheMisses..cpu0", "cacheMisses..cpu1", "isa"]
        );
        assert_eq!(
            table.rows(),
            &[
                vec!["1.0", "10.0", "20.0", "riscv"],
                vec!["2.0", "0.0", "0.0", "arm"],
            ]
        );
        assert_eq!(table.files()[0], PathBuf::from("/runs/a/stats.txt"));
    }

    #[test]
    fn test_missing_variable_renders_nan() {
        let plan = plan();
        let mut partial = result(&plan, "/runs/a/stats.txt", &[]);
        partial.variables.remove("cacheMisses");
        let full = result(&plan, "/runs/b/stats.txt", &[]);

        let table = ResultTable::build(&plan.names(), vec![partial, full]).unwrap();
        assert_eq!(table.rows()[0], vec!["0.0", "NaN", "NaN", "None"]);
        assert_eq!(table.rows()[1], vec!["0.0", "0.0", "0.0", "None"]);

        let unknown = vec!["ghost".to_string()];
        let table = ResultTable::build(&unknown, vec![result(&plan, "/x", &[])]).unwrap();
        assert_eq!(table.header(), &["ghost"]);
        assert_eq!(table.rows(), &[vec!["NaN"]]);
    }

    #[test]
    fn test_rebinned_histogram_zero_statistic_renders_zero() {
        let plan = VariablePlan::new(vec![VariableConfig::new("lat", "histogram")
            .with_rebinning(3, 30.0)
            .with_statistics(&["samples"])])
        .unwrap();
        let results = vec![result(
            &plan,
            "/runs/a/stats.txt",
            &["histogram/lat::0-30/30", "histogram/lat::samples/0"],
        )];

        let table = ResultTable::build(&plan.names(), results).unwrap();
        assert_eq!(
            table.header(),
            &["lat..0-15", "lat..15-30", "lat..30+", "lat..samples"]
        );
        assert_eq!(table.rows(), &[vec!["15.0", "15.0", "0.0", "0.0"]]);
    }

    #[test]
    fn test_balance_overflow_is_fatal() {
        let plan = VariablePlan::new(vec![VariableConfig::new("ipc", "scalar")]).unwrap();
        let results = vec![result(&plan, "/x", &["scalar/ipc/1", "scalar/ipc/2"])];
        assert!(ResultTable::build(&plan.names(), results).is_err());
    }

    #[test]
    fn test_write_csv() {
        let plan = plan();
        let results = vec![result(
            &plan,
            "/runs/a/stats.txt",
            &["scalar/cpuIpc/3", "configuration/isa/x86,64"],
        )];
        let table = ResultTable::build(&plan.names(), results).unwrap();

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("results.csv");
        table.write_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "cpuIpc,cacheMisses..cpu0,cacheMisses..cpu1,isa\n3.0,0.0,0.0,\"x86,64\"\n"
        );
    }
}
