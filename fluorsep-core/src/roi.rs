//! ROI input representations.

use crate::error::{Error, Result};
use ndarray::Array2;
use std::path::PathBuf;

/// One cell's region of interest, as a polygon outline or a boolean mask.
///
/// Polygon points are `[row, column]` pairs in pixel coordinates.
#[derive(Clone, Debug)]
pub enum RoiShape {
    /// Closed polygon outline, at least 3 points.
    Polygon(Vec<[f64; 2]>),
    /// Boolean mask matching the image shape.
    Mask(Array2<bool>),
}

impl RoiShape {
    /// Validates the geometry against an image shape.
    ///
    /// # Errors
    /// Returns [`Error::Shape`] for a polygon with fewer than 3 points or a
    /// mask whose shape does not match the image.
    pub fn validate(&self, image_shape: (usize, usize)) -> Result<()> {
        match self {
            Self::Polygon(points) => {
                if points.len() < 3 {
                    return Err(Error::Shape(format!(
                        "polygon has {} points, need at least 3",
                        points.len()
                    )));
                }
                Ok(())
            }
            Self::Mask(mask) => {
                if mask.dim() != image_shape {
                    return Err(Error::Shape(format!(
                        "ROI mask shape {:?} does not match image shape {:?}",
                        mask.dim(),
                        image_shape
                    )));
                }
                Ok(())
            }
        }
    }
}

/// The full set of ROI definitions supplied to an experiment.
#[derive(Clone, Debug)]
pub enum RoiSpec {
    /// One shape per cell, supplied directly.
    Cells(Vec<RoiShape>),
    /// Path to a polygon archive file.
    ArchivePath(PathBuf),
}

impl RoiSpec {
    /// Short description of the ROI set, for parameter echo output.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Cells(cells) => format!("<{} ROI shapes>", cells.len()),
            Self::ArchivePath(p) => p.display().to_string(),
        }
    }
}
