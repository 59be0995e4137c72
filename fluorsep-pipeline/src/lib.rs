//! fluorsep-pipeline: checkpointed orchestration of trace extraction and
//! signal separation.
//!
//! The [`Experiment`] type ties the other crates together: it fans trial
//! extraction and per-cell separation out over a worker pool, checkpoints
//! each finished phase into a cache folder, and resumes from those
//! checkpoints on reconstruction. [`run_separation`] wraps the common
//! extract-separate(-df/f0) sequence in a single call.

mod error;
mod experiment;
mod pool;
mod run;

pub use error::{Error, Result};
pub use experiment::{Experiment, ExperimentBuilder};
pub use pool::map_indexed;
pub use run::{run_separation, RunOptions};
