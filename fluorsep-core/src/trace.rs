//! Ragged per-(cell, trial) trace containers.
//!
//! Trial lengths differ, so traces cannot live in one rectangular tensor.
//! [`TraceGrid`] stores one matrix per `(cell, trial)` coordinate and offers
//! the concatenate/split operations the separation stage relies on. Splitting
//! a concatenation must reproduce the original per-trial arrays exactly.

use crate::error::{Error, Result};
use ndarray::{concatenate, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Ragged `[cell][trial]` grid of trace matrices.
///
/// Every matrix for a given cell has the same number of rows (signals);
/// column counts vary per trial.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceGrid {
    cells: Vec<Vec<Array2<f64>>>,
}

impl TraceGrid {
    /// Builds a grid from per-cell, per-trial matrices.
    ///
    /// # Errors
    /// Returns [`Error::Shape`] if cells disagree on the trial count, or if
    /// a cell's matrices disagree on the row count.
    pub fn new(cells: Vec<Vec<Array2<f64>>>) -> Result<Self> {
        if let Some(first) = cells.first() {
            let n_trials = first.len();
            for (c, trials) in cells.iter().enumerate() {
                if trials.len() != n_trials {
                    return Err(Error::Shape(format!(
                        "cell {c} has {} trials, expected {n_trials}",
                        trials.len()
                    )));
                }
                if let Some(head) = trials.first() {
                    let rows = head.nrows();
                    for (t, m) in trials.iter().enumerate() {
                        if m.nrows() != rows {
                            return Err(Error::Shape(format!(
                                "cell {c} trial {t} has {} rows, expected {rows}",
                                m.nrows()
                            )));
                        }
                    }
                }
            }
        }
        Ok(Self { cells })
    }

    /// Number of cells.
    #[must_use]
    pub fn n_cells(&self) -> usize {
        self.cells.len()
    }

    /// Number of trials (0 for an empty grid).
    #[must_use]
    pub fn n_trials(&self) -> usize {
        self.cells.first().map_or(0, Vec::len)
    }

    /// Returns true if the grid holds no cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// All trials for one cell.
    #[must_use]
    pub fn cell(&self, c: usize) -> &[Array2<f64>] {
        &self.cells[c]
    }

    /// One `(cell, trial)` matrix.
    #[must_use]
    pub fn get(&self, c: usize, t: usize) -> &Array2<f64> {
        &self.cells[c][t]
    }

    /// Iterates over per-cell trial slices.
    pub fn iter_cells(&self) -> impl Iterator<Item = &[Array2<f64>]> {
        self.cells.iter().map(Vec::as_slice)
    }

    /// Concatenates one cell's trials along time.
    ///
    /// Returns the joined matrix and the per-trial frame counts needed to
    /// invert the operation with [`split_trials`].
    ///
    /// # Errors
    /// Returns [`Error::Shape`] if the cell has no trials or the row counts
    /// disagree.
    pub fn concat_cell(&self, c: usize) -> Result<(Array2<f64>, Vec<usize>)> {
        concat_trials(&self.cells[c])
    }
}

/// Concatenates per-trial matrices along the time axis.
///
/// # Errors
/// Returns [`Error::Shape`] if `trials` is empty or row counts disagree.
pub fn concat_trials(trials: &[Array2<f64>]) -> Result<(Array2<f64>, Vec<usize>)> {
    if trials.is_empty() {
        return Err(Error::Shape("cannot concatenate zero trials".into()));
    }
    let lengths: Vec<usize> = trials.iter().map(Array2::ncols).collect();
    let views: Vec<_> = trials.iter().map(Array2::view).collect();
    let joined = concatenate(Axis(1), &views)
        .map_err(|e| Error::Shape(format!("trial concatenation failed: {e}")))?;
    Ok((joined, lengths))
}

/// Splits a concatenated matrix back into per-trial segments.
///
/// Exactly inverts [`concat_trials`] for the recorded lengths, in the
/// original trial order.
///
/// # Errors
/// Returns [`Error::Shape`] if the lengths do not sum to the column count.
pub fn split_trials(joined: &Array2<f64>, lengths: &[usize]) -> Result<Vec<Array2<f64>>> {
    let total: usize = lengths.iter().sum();
    if total != joined.ncols() {
        return Err(Error::Shape(format!(
            "trial lengths sum to {total} but joined matrix has {} columns",
            joined.ncols()
        )));
    }
    let mut out = Vec::with_capacity(lengths.len());
    let mut start = 0;
    for &len in lengths {
        out.push(joined.slice(ndarray::s![.., start..start + len]).to_owned());
        start += len;
    }
    Ok(out)
}
