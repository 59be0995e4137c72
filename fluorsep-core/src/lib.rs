//! fluorsep-core: Core types for fluorescence signal separation.
//!
//! This crate provides the shared vocabulary of the pipeline: input source
//! representations, ragged trace containers, separation configuration and
//! diagnostics, the error taxonomy, and verbosity-gated reporting.
//!

pub mod error;
pub mod report;
pub mod roi;
pub mod separation;
pub mod stack;
pub mod trace;

pub use error::{Error, Result};
pub use report::{pretty_duration, BufferSink, Reporter};
pub use roi::{RoiShape, RoiSpec};
pub use separation::{SeparationConfig, SeparationInfo, SeparationMethod};
pub use stack::StackSource;
pub use trace::{concat_trials, split_trials, TraceGrid};
