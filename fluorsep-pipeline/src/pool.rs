//! Worker pool helper for the per-trial and per-cell task fans.
//!
//! `ncores` follows the convention used throughout the pipeline:
//! `Some(1)` runs sequentially on the calling thread, `Some(n)` builds a
//! dedicated pool of `n` threads, and `None` uses the process-wide rayon
//! pool. Output order always matches input order.

use rayon::prelude::*;

use crate::{Error, Result};

/// Maps `f` over `items` with the requested parallelism, preserving order.
///
/// # Errors
/// Returns [`Error::Pool`] if a dedicated thread pool cannot be built.
pub fn map_indexed<T, R, F>(ncores: Option<usize>, items: Vec<T>, f: F) -> Result<Vec<R>>
where
    T: Send,
    R: Send,
    F: Fn(usize, T) -> R + Send + Sync,
{
    match ncores {
        Some(1) => Ok(items
            .into_iter()
            .enumerate()
            .map(|(i, item)| f(i, item))
            .collect()),
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| Error::Pool(e.to_string()))?;
            Ok(pool.install(|| {
                items
                    .into_par_iter()
                    .enumerate()
                    .map(|(i, item)| f(i, item))
                    .collect()
            }))
        }
        None => Ok(items
            .into_par_iter()
            .enumerate()
            .map(|(i, item)| f(i, item))
            .collect()),
    }
}
