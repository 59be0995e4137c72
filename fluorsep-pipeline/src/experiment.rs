//! Checkpointed two-phase experiment orchestration.
//!
//! An [`Experiment`] owns the image stacks, the ROI definitions, and the
//! results of each pipeline phase. Phases are cache-first: when a working
//! folder is set, finished phases are written there as JSON archives and
//! reloaded eagerly when an experiment is built over the same folder, and
//! again whenever a phase starts without its results in memory, so a
//! crashed or restarted run resumes from the last checkpoint instead of
//! recomputing.

use std::path::{Path, PathBuf};
use std::time::Instant;

use ndarray::Array2;

use fluorsep_algorithms::{baseline_f0, separate_trials};
use fluorsep_core::{
    Reporter, RoiSpec, SeparationConfig, SeparationInfo, StackSource, TraceGrid,
};
use fluorsep_io::{
    default_handler, extract_trial, load_prepared, load_separated, resolve_rois, save_prepared,
    save_separated, write_csv, write_nested_json, ExportTables, PreparedArchive, SeparatedArchive,
    StackHandler, PREPARED_FILE, SEPARATED_FILE,
};

use crate::pool;
use crate::{Error, Result};

/// Builder for [`Experiment`].
pub struct ExperimentBuilder {
    stacks: Vec<StackSource>,
    rois: RoiSpec,
    folder: Option<PathBuf>,
    config: SeparationConfig,
    ncores_preparation: Option<usize>,
    ncores_separation: Option<usize>,
    verbosity: u8,
    reporter: Option<Reporter>,
    handler: Option<Box<dyn StackHandler>>,
    low_memory: bool,
}

impl ExperimentBuilder {
    /// Starts a builder over one stack per trial and the shared ROI set.
    #[must_use]
    pub fn new(stacks: Vec<StackSource>, rois: RoiSpec) -> Self {
        Self {
            stacks,
            rois,
            folder: None,
            config: SeparationConfig::default(),
            ncores_preparation: None,
            ncores_separation: None,
            verbosity: fluorsep_core::report::DEFAULT_VERBOSITY,
            reporter: None,
            handler: None,
            low_memory: false,
        }
    }

    /// Sets the working folder used for cache archives.
    #[must_use]
    pub fn with_folder<P: Into<PathBuf>>(mut self, folder: P) -> Self {
        self.folder = Some(folder.into());
        self
    }

    /// Sets the separation configuration.
    #[must_use]
    pub fn with_config(mut self, config: SeparationConfig) -> Self {
        self.config = config;
        self
    }

    /// Caps the worker count for the extraction phase. One means fully
    /// sequential; unset uses the process-wide pool.
    #[must_use]
    pub fn with_ncores_preparation(mut self, ncores: usize) -> Self {
        self.ncores_preparation = Some(ncores);
        self
    }

    /// Caps the worker count for the separation phase.
    #[must_use]
    pub fn with_ncores_separation(mut self, ncores: usize) -> Self {
        self.ncores_separation = Some(ncores);
        self
    }

    /// Sets the verbosity of the default stdout reporter.
    #[must_use]
    pub fn with_verbosity(mut self, verbosity: u8) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Replaces the reporter entirely, e.g. to capture output in tests.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Supplies a custom stack handler. Mutually exclusive with
    /// [`with_low_memory`](Self::with_low_memory).
    #[must_use]
    pub fn with_handler(mut self, handler: Box<dyn StackHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Streams frames from disk instead of loading whole stacks.
    #[must_use]
    pub fn with_low_memory(mut self, low_memory: bool) -> Self {
        self.low_memory = low_memory;
        self
    }

    /// Builds the experiment, eagerly reloading any cache archives found
    /// in the working folder.
    ///
    /// # Errors
    /// Returns a configuration error when no stacks are given or when both
    /// a custom handler and low-memory mode are requested.
    pub fn build(self) -> Result<Experiment> {
        if self.stacks.is_empty() {
            return Err(Error::config("at least one image stack is required"));
        }
        if self.handler.is_some() && self.low_memory {
            return Err(Error::config(
                "a custom stack handler and low_memory mode are mutually exclusive",
            ));
        }
        let reporter = self
            .reporter
            .unwrap_or_else(|| Reporter::new(self.verbosity));
        let handler = self
            .handler
            .unwrap_or_else(|| default_handler(self.low_memory));

        let mut experiment = Experiment {
            stacks: self.stacks,
            rois: self.rois,
            folder: self.folder,
            config: self.config,
            ncores_preparation: self.ncores_preparation,
            ncores_separation: self.ncores_separation,
            reporter,
            handler,
            raw: None,
            means: None,
            sep: None,
            result: None,
            mixmat: None,
            info: None,
            deltaf_raw: None,
            deltaf_result: None,
        };
        experiment.reload_caches();
        Ok(experiment)
    }
}

/// A signal separation experiment over a set of trials.
pub struct Experiment {
    stacks: Vec<StackSource>,
    rois: RoiSpec,
    folder: Option<PathBuf>,
    config: SeparationConfig,
    ncores_preparation: Option<usize>,
    ncores_separation: Option<usize>,
    reporter: Reporter,
    handler: Box<dyn StackHandler>,

    raw: Option<TraceGrid>,
    means: Option<Vec<Array2<f64>>>,
    sep: Option<TraceGrid>,
    result: Option<TraceGrid>,
    mixmat: Option<Vec<Array2<f64>>>,
    info: Option<Vec<SeparationInfo>>,
    deltaf_raw: Option<TraceGrid>,
    deltaf_result: Option<TraceGrid>,
}

impl Experiment {
    /// Starts a builder over one stack per trial and the shared ROI set.
    #[must_use]
    pub fn builder(stacks: Vec<StackSource>, rois: RoiSpec) -> ExperimentBuilder {
        ExperimentBuilder::new(stacks, rois)
    }

    /// Reloads whatever phase archives exist in the working folder. Any
    /// unreadable archive is reported and treated as a cache miss.
    fn reload_caches(&mut self) {
        if self.try_load_prepared() {
            self.try_load_separated();
        }
    }

    /// Attempts to reload the prepared archive, returning whether raw
    /// traces were restored. An unreadable archive is reported and counts
    /// as a miss, as does one produced with different extraction
    /// parameters.
    fn try_load_prepared(&mut self) -> bool {
        let Some(folder) = self.folder.clone() else {
            return false;
        };
        let path = folder.join(PREPARED_FILE);
        match load_prepared(&folder) {
            Ok(Some(archive)) => {
                let stale = archive.n_regions.is_some_and(|n| n != self.config.n_regions)
                    || archive
                        .expansion
                        .is_some_and(|e| (e - self.config.expansion).abs() > f64::EPSILON);
                if stale {
                    self.reporter.detail(
                        "Cached extraction used different parameters, recomputing instead",
                    );
                    return false;
                }
                self.reporter.cache_reload(&path);
                self.raw = archive.raw;
                self.means = archive.means;
                self.raw.is_some()
            }
            Ok(None) => false,
            Err(e) => {
                self.reporter.cache_error(&path, &e.to_string());
                false
            }
        }
    }

    /// Attempts to reload the separated archive, returning whether results
    /// were restored. Staleness follows the same policy as the prepared
    /// archive: a result computed with a different configuration counts as
    /// a miss.
    fn try_load_separated(&mut self) -> bool {
        let Some(folder) = self.folder.clone() else {
            return false;
        };
        let path = folder.join(SEPARATED_FILE);
        match load_separated(&folder) {
            Ok(Some(archive)) => {
                if archive.config.as_ref().is_some_and(|c| c != &self.config) {
                    self.reporter.detail(
                        "Cached separation used different parameters, recomputing instead",
                    );
                    return false;
                }
                self.reporter.cache_reload(&path);
                self.sep = archive.sep;
                self.result = archive.result;
                self.mixmat = archive.mixmat;
                self.info = archive.info;
                self.deltaf_raw = archive.deltaf_raw;
                self.deltaf_result = archive.deltaf_result;
                self.result.is_some()
            }
            Ok(None) => false,
            Err(e) => {
                self.reporter.cache_error(&path, &e.to_string());
                false
            }
        }
    }

    /// Runs the extraction phase: builds masks and pulls raw traces out of
    /// every trial. Unless `redo` is set, traces already in memory are
    /// reused and the working folder is checked for a usable archive
    /// before anything is recomputed.
    ///
    /// Recomputing invalidates all downstream phase results.
    ///
    /// # Errors
    /// Returns an error if a stack cannot be read, an ROI is invalid, or
    /// the prepared archive cannot be written.
    pub fn separation_prep(&mut self, redo: bool) -> Result<()> {
        if !redo {
            if self.raw.is_some() {
                self.reporter
                    .detail("Raw traces already present, skipping extraction");
                return Ok(());
            }
            if self.try_load_prepared() {
                return Ok(());
            }
        }
        let start = Instant::now();
        self.reporter
            .phase_start("Doing region growing and trace extraction");
        self.reporter
            .param("n_regions", &self.config.n_regions.to_string());
        self.reporter
            .param("expansion", &self.config.expansion.to_string());

        self.reporter.param("rois", &self.rois.describe());
        let rois = resolve_rois(&self.rois)?;
        let total = self.stacks.len();
        let reporter = self.reporter.clone();
        let config = &self.config;
        let handler = &*self.handler;
        let sources: Vec<&StackSource> = self.stacks.iter().collect();
        let extractions = pool::map_indexed(self.ncores_preparation, sources, |i, source| {
            reporter.progress("Extraction", i + 1, total);
            let extraction = extract_trial(source, &rois, config, handler);
            if extraction.is_ok() {
                reporter.detail(&format!("Extraction of trial {i} finished"));
            }
            extraction
        })?;

        let mut cells: Vec<Vec<Array2<f64>>> = vec![Vec::with_capacity(total); rois.len()];
        let mut means = Vec::with_capacity(total);
        for extraction in extractions {
            let extraction = extraction?;
            means.push(extraction.mean);
            for (cell, trace) in extraction.traces.into_iter().enumerate() {
                cells[cell].push(trace);
            }
        }
        self.raw = Some(TraceGrid::new(cells)?);
        self.means = Some(means);
        self.sep = None;
        self.result = None;
        self.mixmat = None;
        self.info = None;
        self.deltaf_raw = None;
        self.deltaf_result = None;

        if self.folder.is_some() {
            self.save_prep(None)?;
        }
        self.reporter.phase_finish(
            &format!("extracting traces from {total} trials"),
            start.elapsed(),
        );
        Ok(())
    }

    /// Runs the separation phase, extracting first if needed. Unless the
    /// corresponding redo flag is set, in-memory results are reused and
    /// the working folder is checked for a usable archive before anything
    /// is recomputed.
    ///
    /// # Errors
    /// Returns an error if extraction fails, a cell has no signal rows, or
    /// the separated archive cannot be written.
    pub fn separate(&mut self, redo_prep: bool, redo_sep: bool) -> Result<()> {
        if self.raw.is_none() || redo_prep {
            self.separation_prep(redo_prep)?;
        }
        if !redo_sep {
            if self.result.is_some() {
                self.reporter
                    .detail("Separated traces already present, skipping separation");
                return Ok(());
            }
            if self.try_load_separated() {
                return Ok(());
            }
        }
        let start = Instant::now();
        self.reporter.phase_start("Doing signal separation");
        self.reporter
            .param("method", &self.config.method.to_string());
        self.reporter.param("alpha", &self.config.alpha.to_string());
        self.reporter
            .param("max_iter", &self.config.max_iter.to_string());

        let raw = self
            .raw
            .as_ref()
            .ok_or_else(|| Error::config("extraction produced no traces"))?;
        let total = raw.n_cells();
        let reporter = self.reporter.clone();
        let config = &self.config;
        let cells: Vec<&[Array2<f64>]> = (0..total).map(|c| raw.cell(c)).collect();
        let outputs = pool::map_indexed(self.ncores_separation, cells, |i, trials| {
            reporter.progress("Separation", i + 1, total);
            separate_trials(trials, config, &format!("cell {i}"), &reporter)
        })?;

        let mut sep = Vec::with_capacity(total);
        let mut result = Vec::with_capacity(total);
        let mut mixmat = Vec::with_capacity(total);
        let mut info = Vec::with_capacity(total);
        for output in outputs {
            let output = output?;
            sep.push(output.sep);
            result.push(output.matched);
            mixmat.push(output.mixmat);
            info.push(output.info);
        }
        self.sep = Some(TraceGrid::new(sep)?);
        self.result = Some(TraceGrid::new(result)?);
        self.mixmat = Some(mixmat);
        self.info = Some(info);
        self.deltaf_raw = None;
        self.deltaf_result = None;

        if self.folder.is_some() {
            self.save_separated(None)?;
        }
        self.reporter
            .phase_finish(&format!("separating {total} cells"), start.elapsed());
        Ok(())
    }

    /// Computes df/f0 for the raw and separated traces.
    ///
    /// `freq` is the frame rate in Hz. With `use_raw_f0` the separated
    /// traces are normalized by the raw trace's baseline instead of their
    /// own; with `across_trials` one baseline per signal row is fitted on
    /// the concatenation of all trials and shared between them.
    ///
    /// # Errors
    /// Returns a configuration error when `freq` is not positive or when
    /// separation has not been run yet.
    pub fn calc_deltaf(&mut self, freq: f64, use_raw_f0: bool, across_trials: bool) -> Result<()> {
        if !(freq > 0.0) {
            return Err(Error::config("frame rate freq must be positive"));
        }
        let raw = self
            .raw
            .clone()
            .ok_or_else(|| Error::config("extraction must be run before calculating df/f0"))?;
        let result = self
            .result
            .clone()
            .ok_or_else(|| Error::config("separation must be run before calculating df/f0"))?;

        let start = Instant::now();
        self.reporter
            .phase_start("Calculating df/f0 for raw and separated traces");
        if across_trials {
            self.reporter
                .detail("Using the same f0 throughout all trials of each cell");
        }

        let mut deltaf_raw = Vec::with_capacity(raw.n_cells());
        let mut deltaf_result = Vec::with_capacity(raw.n_cells());
        for cell in 0..raw.n_cells() {
            let raw_trials = raw.cell(cell);
            let raw_f0 = row_baselines(raw_trials, freq, across_trials);
            deltaf_raw.push(apply_deltaf(raw_trials, &raw_f0));

            let result_trials = result.cell(cell);
            let result_f0 = if use_raw_f0 {
                raw_f0
            } else {
                row_baselines(result_trials, freq, across_trials)
            };
            deltaf_result.push(apply_deltaf(result_trials, &result_f0));
        }
        let deltaf_raw = TraceGrid::new(deltaf_raw)?;
        let deltaf_result = TraceGrid::new(deltaf_result)?;
        if has_non_finite(&deltaf_raw) || has_non_finite(&deltaf_result) {
            self.reporter.warn(
                "Found non-finite values in df/f0; a baseline fluorescence of zero produces these",
            );
        }
        self.deltaf_raw = Some(deltaf_raw);
        self.deltaf_result = Some(deltaf_result);

        if self.folder.is_some() {
            self.save_separated(None)?;
        }
        self.reporter.phase_finish(
            &format!("calculating df/f0 for {} cells", raw.n_cells()),
            start.elapsed(),
        );
        Ok(())
    }

    /// Writes the prepared archive to `destination` or the working folder.
    ///
    /// # Errors
    /// Returns a configuration error when there is nothing extracted yet
    /// or no destination is available.
    pub fn save_prep(&self, destination: Option<&Path>) -> Result<()> {
        let folder = destination
            .or(self.folder.as_deref())
            .ok_or_else(|| Error::config("no destination folder for the prepared archive"))?;
        if self.raw.is_none() {
            return Err(Error::config("nothing extracted yet, nothing to save"));
        }
        let archive = PreparedArchive {
            raw: self.raw.clone(),
            means: self.means.clone(),
            n_regions: Some(self.config.n_regions),
            expansion: Some(self.config.expansion),
        };
        save_prepared(folder, &archive)?;
        Ok(())
    }

    /// Writes the separated archive to `destination` or the working folder.
    ///
    /// # Errors
    /// Returns a configuration error when there is nothing separated yet
    /// or no destination is available.
    pub fn save_separated(&self, destination: Option<&Path>) -> Result<()> {
        let folder = destination
            .or(self.folder.as_deref())
            .ok_or_else(|| Error::config("no destination folder for the separated archive"))?;
        if self.result.is_none() {
            return Err(Error::config("nothing separated yet, nothing to save"));
        }
        let archive = SeparatedArchive {
            result: self.result.clone(),
            sep: self.sep.clone(),
            mixmat: self.mixmat.clone(),
            info: self.info.clone(),
            deltaf_raw: self.deltaf_raw.clone(),
            deltaf_result: self.deltaf_result.clone(),
            config: Some(self.config.clone()),
        };
        save_separated(folder, &archive)?;
        Ok(())
    }

    /// Reloads phase archives from `folder` or the working folder. Unlike
    /// the eager reload at construction, an unreadable archive is an error
    /// here since the caller asked for it explicitly.
    ///
    /// # Errors
    /// Returns a configuration error when no folder is available, or a
    /// cache error when an archive exists but cannot be parsed.
    pub fn load(&mut self, folder: Option<&Path>) -> Result<()> {
        let folder = folder
            .or(self.folder.as_deref())
            .ok_or_else(|| Error::config("no folder to load archives from"))?
            .to_path_buf();
        if let Some(archive) = load_prepared(&folder)? {
            self.reporter.cache_reload(&folder.join(PREPARED_FILE));
            self.raw = archive.raw;
            self.means = archive.means;
        }
        if let Some(archive) = load_separated(&folder)? {
            self.reporter.cache_reload(&folder.join(SEPARATED_FILE));
            self.sep = archive.sep;
            self.result = archive.result;
            self.mixmat = archive.mixmat;
            self.info = archive.info;
            self.deltaf_raw = archive.deltaf_raw;
            self.deltaf_result = archive.deltaf_result;
        }
        Ok(())
    }

    /// Exports everything computed so far as long-form CSV. Without an
    /// explicit path the file lands in the working folder as `traces.csv`.
    ///
    /// # Errors
    /// Returns a configuration error when nothing has been computed yet or
    /// no destination is available.
    pub fn to_csv(&self, path: Option<&Path>) -> Result<()> {
        let path = self.export_path(path, "traces.csv")?;
        write_csv(&path, &self.export_tables()?)?;
        Ok(())
    }

    /// Exports everything computed so far as nested JSON. Without an
    /// explicit path the file lands in the working folder as `traces.json`.
    ///
    /// # Errors
    /// Returns a configuration error when nothing has been computed yet or
    /// no destination is available.
    pub fn to_json(&self, path: Option<&Path>) -> Result<()> {
        let path = self.export_path(path, "traces.json")?;
        write_nested_json(&path, &self.export_tables()?)?;
        Ok(())
    }

    fn export_path(&self, path: Option<&Path>, default_name: &str) -> Result<PathBuf> {
        match (path, self.folder.as_deref()) {
            (Some(path), _) => Ok(path.to_path_buf()),
            (None, Some(folder)) => Ok(folder.join(default_name)),
            (None, None) => Err(Error::config("no destination for the export")),
        }
    }

    fn export_tables(&self) -> Result<ExportTables<'_>> {
        if self.raw.is_none() {
            return Err(Error::config("nothing computed yet, nothing to export"));
        }
        Ok(ExportTables {
            raw: self.raw.as_ref(),
            sep: self.sep.as_ref(),
            result: self.result.as_ref(),
            deltaf_raw: self.deltaf_raw.as_ref(),
            deltaf_result: self.deltaf_result.as_ref(),
            mixmat: self.mixmat.as_deref(),
            config: Some(&self.config),
        })
    }

    /// Raw extracted traces, if the extraction phase has run.
    #[must_use]
    pub fn raw(&self) -> Option<&TraceGrid> {
        self.raw.as_ref()
    }

    /// Per-trial mean images, if the extraction phase has run.
    #[must_use]
    pub fn means(&self) -> Option<&[Array2<f64>]> {
        self.means.as_deref()
    }

    /// Separated sources before rescaling.
    #[must_use]
    pub fn sep(&self) -> Option<&TraceGrid> {
        self.sep.as_ref()
    }

    /// Matched and rescaled separation results.
    #[must_use]
    pub fn result(&self) -> Option<&TraceGrid> {
        self.result.as_ref()
    }

    /// Per-cell mixing matrices.
    #[must_use]
    pub fn mixmat(&self) -> Option<&[Array2<f64>]> {
        self.mixmat.as_deref()
    }

    /// Per-cell convergence diagnostics.
    #[must_use]
    pub fn info(&self) -> Option<&[SeparationInfo]> {
        self.info.as_deref()
    }

    /// df/f0 of the raw traces.
    #[must_use]
    pub fn deltaf_raw(&self) -> Option<&TraceGrid> {
        self.deltaf_raw.as_ref()
    }

    /// df/f0 of the separation results.
    #[must_use]
    pub fn deltaf_result(&self) -> Option<&TraceGrid> {
        self.deltaf_result.as_ref()
    }

    /// The separation configuration.
    #[must_use]
    pub fn config(&self) -> &SeparationConfig {
        &self.config
    }

    /// The working folder, when caching is enabled.
    #[must_use]
    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }

    /// Number of trials in the experiment.
    #[must_use]
    pub fn n_trials(&self) -> usize {
        self.stacks.len()
    }

    /// Number of cells, known once extraction has run.
    #[must_use]
    pub fn n_cells(&self) -> Option<usize> {
        self.raw.as_ref().map(TraceGrid::n_cells)
    }
}

/// Per-trial, per-row baseline values. With `across` set the baseline is
/// fitted on the concatenated trials and repeated for each trial.
fn row_baselines(trials: &[Array2<f64>], freq: f64, across: bool) -> Vec<Vec<f64>> {
    if across {
        let rows = trials.first().map_or(0, |t| t.nrows());
        let shared: Vec<f64> = (0..rows)
            .map(|r| {
                let joined: ndarray::Array1<f64> = trials
                    .iter()
                    .flat_map(|t| t.row(r).to_owned())
                    .collect();
                baseline_f0(&joined, freq)
            })
            .collect();
        trials.iter().map(|_| shared.clone()).collect()
    } else {
        trials
            .iter()
            .map(|trial| {
                (0..trial.nrows())
                    .map(|r| baseline_f0(&trial.row(r).to_owned(), freq))
                    .collect()
            })
            .collect()
    }
}

fn apply_deltaf(trials: &[Array2<f64>], baselines: &[Vec<f64>]) -> Vec<Array2<f64>> {
    trials
        .iter()
        .zip(baselines)
        .map(|(trial, f0s)| {
            let mut out = trial.clone();
            for (mut row, &f0) in out.rows_mut().into_iter().zip(f0s) {
                row.mapv_inplace(|x| (x - f0) / f0);
            }
            out
        })
        .collect()
}

fn has_non_finite(grid: &TraceGrid) -> bool {
    grid.iter_cells()
        .flatten()
        .any(|trial| trial.iter().any(|x| !x.is_finite()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fluorsep_core::{RoiShape, RoiSpec};
    use ndarray::{array, Array3};

    fn triangle() -> RoiSpec {
        RoiSpec::Cells(vec![RoiShape::Polygon(vec![
            [1.0, 1.0],
            [4.0, 1.0],
            [4.0, 4.0],
        ])])
    }

    #[test]
    fn test_build_requires_stacks() {
        let built = Experiment::builder(vec![], triangle()).build();
        assert!(built.is_err());
    }

    #[test]
    fn test_handler_and_low_memory_conflict() {
        let stacks = vec![StackSource::Frames(Array3::zeros((2, 8, 8)))];
        let built = Experiment::builder(stacks, triangle())
            .with_handler(Box::new(fluorsep_io::EagerReader))
            .with_low_memory(true)
            .build();
        assert!(built.is_err());
    }

    #[test]
    fn test_deltaf_requires_separation() {
        let stacks = vec![StackSource::Frames(Array3::zeros((2, 8, 8)))];
        let mut experiment = Experiment::builder(stacks, triangle()).build().unwrap();
        assert!(experiment.calc_deltaf(10.0, true, true).is_err());
    }

    #[test]
    fn test_save_without_folder_is_error() {
        let stacks = vec![StackSource::Frames(Array3::zeros((2, 8, 8)))];
        let experiment = Experiment::builder(stacks, triangle()).build().unwrap();
        assert!(experiment.save_prep(None).is_err());
    }

    #[test]
    fn test_row_baselines_shared_across_trials() {
        let trials = vec![array![[1.0, 1.0, 5.0]], array![[3.0, 3.0, 3.0]]];
        let f0 = row_baselines(&trials, 1.0, true);
        assert_eq!(f0[0], f0[1]);
        let per_trial = row_baselines(&trials, 1.0, false);
        assert_ne!(per_trial[0], per_trial[1]);
    }
}
