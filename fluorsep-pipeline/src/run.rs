//! One-call front door for the full pipeline.

use fluorsep_core::{RoiSpec, SeparationConfig, StackSource, TraceGrid};

use crate::experiment::Experiment;
use crate::{Error, Result};

/// Options for [`run_separation`] beyond the data itself.
pub struct RunOptions {
    /// Working folder for cache archives; no caching when unset.
    pub folder: Option<std::path::PathBuf>,
    /// Separation configuration.
    pub config: SeparationConfig,
    /// Frame rate in Hz, required when `return_deltaf` is set.
    pub freq: Option<f64>,
    /// Return df/f0 of the separated traces instead of the traces.
    pub return_deltaf: bool,
    /// Also export everything computed as long-form CSV to this path.
    pub export_csv: Option<std::path::PathBuf>,
    /// Verbosity of the stdout reporter.
    pub verbosity: u8,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            folder: None,
            config: SeparationConfig::default(),
            freq: None,
            return_deltaf: false,
            export_csv: None,
            verbosity: fluorsep_core::report::DEFAULT_VERBOSITY,
        }
    }
}

/// Runs extraction, separation, and optionally df/f0 in one call and
/// returns the separated trace grid (or its df/f0).
///
/// # Errors
/// Returns a configuration error when `return_deltaf` is requested without
/// a frame rate, or any error the underlying phases produce.
pub fn run_separation(
    stacks: Vec<StackSource>,
    rois: RoiSpec,
    options: RunOptions,
) -> Result<TraceGrid> {
    if options.return_deltaf && options.freq.is_none() {
        return Err(Error::config(
            "the frame rate freq is required to return df/f0",
        ));
    }
    let mut builder = Experiment::builder(stacks, rois)
        .with_config(options.config)
        .with_verbosity(options.verbosity);
    if let Some(folder) = options.folder {
        builder = builder.with_folder(folder);
    }
    let mut experiment = builder.build()?;
    experiment.separate(false, false)?;
    if let Some(freq) = options.freq {
        experiment.calc_deltaf(freq, true, true)?;
    }
    if let Some(path) = options.export_csv {
        experiment.to_csv(Some(&path))?;
    }
    let grid = if options.return_deltaf {
        experiment.deltaf_result()
    } else {
        experiment.result()
    };
    grid.cloned()
        .ok_or_else(|| Error::config("separation produced no result"))
}
