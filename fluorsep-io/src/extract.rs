//! Per-trial trace extraction.
//!
//! For one trial, builds the somatic and neuropil masks of every cell,
//! reduces the image stack to mean-over-mask traces one frame at a time,
//! and asks the stack handler for the temporal mean image. Neuropil
//! regions exclude the union of all cell ROIs so a neighbouring cell's
//! soma never leaks into the background estimate.

use ndarray::Array2;

use fluorsep_algorithms::masks::{build_masks, CellMasks};
use fluorsep_core::{RoiShape, SeparationConfig, StackSource};

use crate::stack::StackHandler;
use crate::{Error, Result};

/// Extraction output for one trial.
pub struct TrialExtraction {
    /// Per-cell trace grids, shape `(1 + n_regions, n_frames)`; row 0 is
    /// the somatic trace, the remaining rows the neuropil regions.
    pub traces: Vec<Array2<f64>>,
    /// Per-cell masks used for the extraction.
    pub masks: Vec<CellMasks>,
    /// Temporal mean image of the trial.
    pub mean: Array2<f64>,
}

/// Extracts mean-over-mask traces for every cell in one trial.
///
/// # Errors
/// Returns an error if the stack cannot be read, an ROI is invalid for the
/// image shape, or `rois` is empty.
pub fn extract_trial(
    source: &StackSource,
    rois: &[RoiShape],
    config: &SeparationConfig,
    handler: &dyn StackHandler,
) -> Result<TrialExtraction> {
    if rois.is_empty() {
        return Err(Error::Core(fluorsep_core::Error::Config(
            "no ROIs to extract".into(),
        )));
    }
    let (n_frames, height, width) = handler.shape(source)?;
    let image_shape = (height, width);

    // Union of all cell bodies, excluded from every neuropil region.
    let mut exclude = Array2::from_elem(image_shape, false);
    let mut cell_masks = Vec::with_capacity(rois.len());
    for roi in rois {
        let masks = build_masks(roi, image_shape, config.n_regions, config.expansion, None)?;
        exclude.zip_mut_with(&masks.roi, |e, &r| *e |= r);
        cell_masks.push(masks);
    }
    for (masks, roi) in cell_masks.iter_mut().zip(rois) {
        *masks = build_masks(
            roi,
            image_shape,
            config.n_regions,
            config.expansion,
            Some(&exclude),
        )?;
    }

    // Flat pixel indices per signal row, cheaper to walk than the masks.
    let indices: Vec<Vec<Vec<usize>>> = cell_masks
        .iter()
        .map(|masks| {
            std::iter::once(&masks.roi)
                .chain(masks.neuropil.iter())
                .map(|mask| {
                    mask.iter()
                        .enumerate()
                        .filter_map(|(i, &inside)| inside.then_some(i))
                        .collect()
                })
                .collect()
        })
        .collect();

    let rows = 1 + config.n_regions;
    let mut traces: Vec<Array2<f64>> = rois
        .iter()
        .map(|_| Array2::zeros((rows, n_frames)))
        .collect();

    handler.for_each_frame(source, &mut |frame_idx, frame| {
        let flat = frame.to_owned();
        let pixels = flat
            .as_slice()
            .unwrap_or_else(|| unreachable!("frame copy is standard layout"));
        for (cell, cell_rows) in indices.iter().enumerate() {
            for (row, row_indices) in cell_rows.iter().enumerate() {
                // Empty rows (e.g. zero expansion) stay at zero.
                if row_indices.is_empty() {
                    continue;
                }
                let total: f64 = row_indices.iter().map(|&i| pixels[i]).sum();
                traces[cell][[row, frame_idx]] = total / row_indices.len() as f64;
            }
        }
    })?;

    // The handler owns the mean so reduced-precision readers can trade
    // accuracy for memory here too.
    let mean = handler.mean_image(source)?;

    Ok(TrialExtraction {
        traces,
        masks: cell_masks,
        mean,
    })
}
