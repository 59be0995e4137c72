//! Loading ROI definitions from disk.
//!
//! An ROI archive is a JSON file holding one polygon per cell, each polygon
//! an array of `[x, y]` vertices in pixel coordinates.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use fluorsep_core::{RoiShape, RoiSpec};

use crate::{Error, Result};

/// Reads a polygon archive into one [`RoiShape`] per cell.
///
/// # Errors
/// Returns an error if the file cannot be read, is not valid JSON, or any
/// vertex is not a two-element coordinate pair.
pub fn load_rois(path: &Path) -> Result<Vec<RoiShape>> {
    let file = File::open(path)
        .map_err(|e| Error::InvalidFormat(format!("ROI archive {}: {e}", path.display())))?;
    let polygons: Vec<Vec<[f64; 2]>> =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            Error::InvalidFormat(format!("ROI archive {}: {e}", path.display()))
        })?;
    if polygons.is_empty() {
        return Err(Error::InvalidFormat(format!(
            "ROI archive {} contains no cells",
            path.display()
        )));
    }
    Ok(polygons.into_iter().map(RoiShape::Polygon).collect())
}

/// Resolves an ROI specification to concrete shapes, reading from disk
/// for the archive-path variant.
///
/// # Errors
/// Returns an error if an archive path cannot be loaded.
pub fn resolve_rois(spec: &RoiSpec) -> Result<Vec<RoiShape>> {
    match spec {
        RoiSpec::Cells(cells) => Ok(cells.clone()),
        RoiSpec::ArchivePath(path) => load_rois(path),
    }
}
