//! fluorsep-io: stack readers, ROI loading, caching, and exports.
//!
//! This crate handles everything that touches the filesystem: the binary
//! image stack container and its memory-mapped readers, ROI polygon
//! archives, the per-phase JSON cache, trace extraction over a stack, and
//! result export to CSV or nested JSON.

mod cache;
mod error;
mod export;
mod extract;
mod roi_source;
mod stack;

pub use cache::{
    load_prepared, load_separated, save_prepared, save_separated, PreparedArchive,
    SeparatedArchive, PREPARED_FILE, SEPARATED_FILE,
};
pub use error::{Error, Result};
pub use export::{write_csv, write_nested_json, ExportTables};
pub use extract::{extract_trial, TrialExtraction};
pub use roi_source::{load_rois, resolve_rois};
pub use stack::{
    default_handler, write_stack, EagerReader, MappedReader, PixelType, ReducedReader,
    StackHandler, StackHeader, STACK_MAGIC,
};
