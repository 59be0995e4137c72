//! On-disk cache archives for the two pipeline phases.
//!
//! Each phase writes one JSON archive into the cache folder. Every field
//! is optional on load so an archive written by an older run, or one with
//! phases still missing, deserializes cleanly; a file that exists but does
//! not parse is reported as corrupt and treated by callers as a miss.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use fluorsep_core::{SeparationConfig, SeparationInfo, TraceGrid};

use crate::{Error, Result};

/// File name of the extraction-phase archive.
pub const PREPARED_FILE: &str = "prepared.json";

/// File name of the separation-phase archive.
pub const SEPARATED_FILE: &str = "separated.json";

/// Extraction-phase cache contents.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct PreparedArchive {
    /// Raw traces, cell-major.
    #[serde(default)]
    pub raw: Option<TraceGrid>,
    /// Per-trial mean images.
    #[serde(default)]
    pub means: Option<Vec<Array2<f64>>>,
    /// Neuropil region count the traces were extracted with.
    #[serde(default)]
    pub n_regions: Option<usize>,
    /// Neuropil expansion factor the traces were extracted with.
    #[serde(default)]
    pub expansion: Option<f64>,
}

/// Separation-phase cache contents.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SeparatedArchive {
    /// Matched and rescaled sources, cell-major.
    #[serde(default)]
    pub result: Option<TraceGrid>,
    /// Separated sources before rescaling.
    #[serde(default)]
    pub sep: Option<TraceGrid>,
    /// Per-cell mixing matrices.
    #[serde(default)]
    pub mixmat: Option<Vec<Array2<f64>>>,
    /// Per-cell convergence diagnostics.
    #[serde(default)]
    pub info: Option<Vec<SeparationInfo>>,
    /// df/f0 of the raw traces, if computed.
    #[serde(default)]
    pub deltaf_raw: Option<TraceGrid>,
    /// df/f0 of the separated result, if computed.
    #[serde(default)]
    pub deltaf_result: Option<TraceGrid>,
    /// Configuration the separation was computed with.
    #[serde(default)]
    pub config: Option<SeparationConfig>,
}

fn archive_path(folder: &Path, name: &str) -> PathBuf {
    folder.join(name)
}

fn save<T: Serialize>(folder: &Path, name: &str, archive: &T) -> Result<()> {
    std::fs::create_dir_all(folder)?;
    let path = archive_path(folder, name);
    let writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer(writer, archive).map_err(|e| Error::CacheCorrupt {
        path,
        reason: e.to_string(),
    })
}

fn load<T: for<'de> Deserialize<'de>>(folder: &Path, name: &str) -> Result<Option<T>> {
    let path = archive_path(folder, name);
    let file = match File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    serde_json::from_reader(BufReader::new(file))
        .map(Some)
        .map_err(|e| Error::CacheCorrupt {
            path,
            reason: e.to_string(),
        })
}

/// Writes the extraction-phase archive into `folder`, creating it if needed.
///
/// # Errors
/// Returns an error if the folder cannot be created or the file written.
pub fn save_prepared(folder: &Path, archive: &PreparedArchive) -> Result<()> {
    save(folder, PREPARED_FILE, archive)
}

/// Loads the extraction-phase archive, `None` when it does not exist.
///
/// # Errors
/// Returns [`Error::CacheCorrupt`] when the file exists but cannot be parsed.
pub fn load_prepared(folder: &Path) -> Result<Option<PreparedArchive>> {
    load(folder, PREPARED_FILE)
}

/// Writes the separation-phase archive into `folder`, creating it if needed.
///
/// # Errors
/// Returns an error if the folder cannot be created or the file written.
pub fn save_separated(folder: &Path, archive: &SeparatedArchive) -> Result<()> {
    save(folder, SEPARATED_FILE, archive)
}

/// Loads the separation-phase archive, `None` when it does not exist.
///
/// # Errors
/// Returns [`Error::CacheCorrupt`] when the file exists but cannot be parsed.
pub fn load_separated(folder: &Path) -> Result<Option<SeparatedArchive>> {
    load(folder, SEPARATED_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use tempfile::TempDir;

    fn grid() -> TraceGrid {
        let trial = Array2::from_shape_fn((2, 4), |(r, c)| (r * 4 + c) as f64);
        TraceGrid::new(vec![vec![trial.clone(), trial]]).unwrap()
    }

    #[test]
    fn test_missing_archive_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(load_prepared(dir.path()).unwrap().is_none());
        assert!(load_separated(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_prepared_round_trip() {
        let dir = TempDir::new().unwrap();
        let archive = PreparedArchive {
            raw: Some(grid()),
            means: Some(vec![Array2::zeros((3, 3))]),
            n_regions: Some(4),
            expansion: Some(1.0),
        };
        save_prepared(dir.path(), &archive).unwrap();
        let loaded = load_prepared(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.raw, archive.raw);
        assert_eq!(loaded.n_regions, Some(4));
    }

    #[test]
    fn test_separated_round_trip() {
        let dir = TempDir::new().unwrap();
        let archive = SeparatedArchive {
            result: Some(grid()),
            sep: Some(grid()),
            ..SeparatedArchive::default()
        };
        save_separated(dir.path(), &archive).unwrap();
        let loaded = load_separated(dir.path()).unwrap().unwrap();
        assert_eq!(loaded.result, archive.result);
        assert!(loaded.deltaf_raw.is_none());
    }

    #[test]
    fn test_missing_keys_default_to_none() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(PREPARED_FILE), b"{}").unwrap();
        let loaded = load_prepared(dir.path()).unwrap().unwrap();
        assert!(loaded.raw.is_none());
        assert!(loaded.expansion.is_none());
    }

    #[test]
    fn test_corrupt_archive_is_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(SEPARATED_FILE), b"not json {").unwrap();
        assert!(matches!(
            load_separated(dir.path()),
            Err(Error::CacheCorrupt { .. })
        ));
    }
}
