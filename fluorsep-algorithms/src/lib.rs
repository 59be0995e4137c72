//! Numeric kernels for fluorescence signal separation.
//!
//! This crate holds the compute-heavy pieces of the pipeline: neuropil
//! mask construction around each ROI, regularized NMF, the per-cell
//! separation routine built on top of it, and df/f0 baseline estimation.
//! Orchestration, caching, and I/O live in the companion crates.

pub mod deltaf;
pub mod masks;
pub mod nmf;
pub mod separation;

pub use deltaf::{baseline_f0, deltaf, percentile, smooth};
pub use masks::{build_masks, mask_outline, rasterize_polygon, CellMasks};
pub use nmf::{NmfFit, NmfParams};
pub use separation::{separate_trials, CellSeparation};
