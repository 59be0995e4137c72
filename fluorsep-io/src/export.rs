//! Result export.
//!
//! Two formats: a flat long-form CSV with one value per line, convenient
//! for dataframe tooling, and a nested JSON document keyed by cell and
//! trial that mirrors the layout older analysis scripts expect. Both carry
//! the separation parameters alongside the traces.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::Array2;
use serde_json::{json, Map, Value};

use fluorsep_core::{SeparationConfig, TraceGrid};

use crate::Result;

/// The data available for export. Absent phases are skipped.
#[derive(Clone, Copy, Default)]
pub struct ExportTables<'a> {
    pub raw: Option<&'a TraceGrid>,
    pub sep: Option<&'a TraceGrid>,
    pub result: Option<&'a TraceGrid>,
    pub deltaf_raw: Option<&'a TraceGrid>,
    pub deltaf_result: Option<&'a TraceGrid>,
    /// Per-cell mixing matrices.
    pub mixmat: Option<&'a [Array2<f64>]>,
    /// Parameters the results were computed with.
    pub config: Option<&'a SeparationConfig>,
}

impl<'a> ExportTables<'a> {
    fn fields(&self) -> impl Iterator<Item = (&'static str, &'a TraceGrid)> {
        [
            ("raw", self.raw),
            ("sep", self.sep),
            ("result", self.result),
            ("deltaf_raw", self.deltaf_raw),
            ("deltaf_result", self.deltaf_result),
        ]
        .into_iter()
        .filter_map(|(name, grid)| grid.map(|g| (name, g)))
    }
}

fn config_params(config: &SeparationConfig) -> Vec<(&'static str, String)> {
    vec![
        ("n_regions", config.n_regions.to_string()),
        ("expansion", config.expansion.to_string()),
        ("alpha", config.alpha.to_string()),
        ("max_iter", config.max_iter.to_string()),
        ("tol", config.tol.to_string()),
        ("max_tries", config.max_tries.to_string()),
        ("method", config.method.to_string()),
    ]
}

/// Writes all present data as long-form CSV with columns
/// `field,cell,trial,row,frame,value`, preceded by `#`-prefixed parameter
/// lines when a configuration is attached. Mixing matrices use the same
/// columns with the trial fixed at zero and the frame column as the
/// matrix column index.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_csv(path: &Path, tables: &ExportTables<'_>) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    if let Some(config) = tables.config {
        for (name, value) in config_params(config) {
            writeln!(out, "# {name}={value}")?;
        }
    }
    writeln!(out, "field,cell,trial,row,frame,value")?;
    for (field, grid) in tables.fields() {
        for cell in 0..grid.n_cells() {
            for (trial, traces) in grid.cell(cell).iter().enumerate() {
                for ((row, frame), &value) in traces.indexed_iter() {
                    writeln!(out, "{field},{cell},{trial},{row},{frame},{value}")?;
                }
            }
        }
    }
    if let Some(mixmats) = tables.mixmat {
        for (cell, mixmat) in mixmats.iter().enumerate() {
            for ((row, col), &value) in mixmat.indexed_iter() {
                writeln!(out, "mixmat,{cell},0,{row},{col},{value}")?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

fn grid_to_value(grid: &TraceGrid) -> Value {
    let mut cells = Map::new();
    for cell in 0..grid.n_cells() {
        let mut trials = Map::new();
        for (trial, traces) in grid.cell(cell).iter().enumerate() {
            let rows: Vec<Vec<f64>> = traces
                .rows()
                .into_iter()
                .map(|row| row.to_vec())
                .collect();
            trials.insert(format!("trial{trial}"), json!(rows));
        }
        cells.insert(format!("cell{cell}"), Value::Object(trials));
    }
    Value::Object(cells)
}

/// Writes all present data as nested JSON keyed `field -> cellN -> trialM`,
/// with mixing matrices under `mixmat.cellN` and parameters under `config`.
///
/// # Errors
/// Returns an error if the file cannot be created or written.
pub fn write_nested_json(path: &Path, tables: &ExportTables<'_>) -> Result<()> {
    let mut root = Map::new();
    for (field, grid) in tables.fields() {
        root.insert(field.to_string(), grid_to_value(grid));
    }
    if let Some(mixmats) = tables.mixmat {
        let mut cells = Map::new();
        for (cell, mixmat) in mixmats.iter().enumerate() {
            let rows: Vec<Vec<f64>> = mixmat
                .rows()
                .into_iter()
                .map(|row| row.to_vec())
                .collect();
            cells.insert(format!("cell{cell}"), json!(rows));
        }
        root.insert("mixmat".into(), Value::Object(cells));
    }
    if let Some(config) = tables.config {
        let params: Map<String, Value> = config_params(config)
            .into_iter()
            .map(|(name, value)| (name.to_string(), Value::String(value)))
            .collect();
        root.insert("config".into(), Value::Object(params));
    }
    let out = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(out, &Value::Object(root)).map_err(std::io::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use tempfile::TempDir;

    fn grid() -> TraceGrid {
        let trial = Array2::from_shape_fn((2, 3), |(r, c)| (r * 3 + c) as f64);
        TraceGrid::new(vec![vec![trial.clone()], vec![trial]]).unwrap()
    }

    #[test]
    fn test_csv_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let g = grid();
        let tables = ExportTables {
            raw: Some(&g),
            ..ExportTables::default()
        };
        write_csv(&path, &tables).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "field,cell,trial,row,frame,value");
        // 2 cells x 1 trial x 2 rows x 3 frames
        assert_eq!(lines.len(), 1 + 12);
        assert_eq!(lines[1], "raw,0,0,0,0,0");
        assert!(lines.contains(&"raw,1,0,1,2,5"));
    }

    #[test]
    fn test_csv_parameter_header_and_mixmat() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let g = grid();
        let config = SeparationConfig::default().with_n_regions(6);
        let mixmats = vec![array![[1.0, 0.5], [0.0, 2.0]]];
        let tables = ExportTables {
            raw: Some(&g),
            mixmat: Some(&mixmats),
            config: Some(&config),
            ..ExportTables::default()
        };
        write_csv(&path, &tables).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("# n_regions=6\n"));
        assert!(text.contains("# method=nmf\n"));
        assert!(text.contains("\nmixmat,0,0,1,1,2\n"));
    }

    #[test]
    fn test_nested_json_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");
        let g = grid();
        let config = SeparationConfig::default();
        let mixmats = vec![array![[1.0]], array![[2.0]]];
        let tables = ExportTables {
            raw: Some(&g),
            result: Some(&g),
            mixmat: Some(&mixmats),
            config: Some(&config),
            ..ExportTables::default()
        };
        write_nested_json(&path, &tables).unwrap();
        let value: serde_json::Value =
            serde_json::from_reader(std::fs::File::open(&path).unwrap()).unwrap();
        assert_eq!(value["raw"]["cell1"]["trial0"][1][2], 5.0);
        assert!(value["result"]["cell0"]["trial0"].is_array());
        assert_eq!(value["mixmat"]["cell1"][0][0], 2.0);
        assert_eq!(value["config"]["alpha"], "0.1");
        assert!(value.get("deltaf_raw").is_none());
    }

    #[test]
    fn test_empty_tables_write_header_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        write_csv(&path, &ExportTables::default()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
