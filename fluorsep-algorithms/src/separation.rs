//! Blind source separation of one cell's signal grid.
//!
//! Takes the per-trial traces of a single cell (somatic row plus neuropil
//! rows), concatenates them along time, factorizes with NMF, matches the
//! recovered component that best correlates with the somatic trace, and
//! rescales it back to the amplitude of the raw signal.

use std::time::Instant;

use ndarray::{Array2, Axis};

use fluorsep_core::{
    concat_trials, split_trials, Error, Reporter, Result, SeparationConfig, SeparationInfo,
};

use crate::nmf::{self, NmfParams};

/// Separation output for one cell.
#[derive(Clone, Debug)]
pub struct CellSeparation {
    /// Separated sources per trial, component-matched order, unscaled.
    pub sep: Vec<Array2<f64>>,
    /// Separated sources per trial, rescaled to the raw signal amplitude.
    pub matched: Vec<Array2<f64>>,
    /// Mixing matrix, columns in matched order.
    pub mixmat: Array2<f64>,
    /// Convergence and timing diagnostics.
    pub info: SeparationInfo,
}

/// Separates one cell's trials into signal and contaminant components.
///
/// Every trial must have the same number of rows, with row 0 the somatic
/// trace. `label` only appears in log output. Fitting restarts with a fresh
/// seed up to `config.max_tries` times and keeps the first converged fit;
/// if no attempt converges the last fit is kept and a warning is emitted.
pub fn separate_trials(
    trials: &[Array2<f64>],
    config: &SeparationConfig,
    label: &str,
    reporter: &Reporter,
) -> Result<CellSeparation> {
    let (grid, splits) = concat_trials(trials)?;
    let n_signals = grid.nrows();
    if n_signals == 0 {
        return Err(Error::Shape(format!("{label}: no signal rows to separate")));
    }

    let mut clipped = grid.clone();
    let below_zero = clipped.iter().filter(|&&x| x < 0.0).count();
    if below_zero > 0 {
        reporter.warn(&format!(
            "{label}: found {below_zero} values below zero in the signal matrix, \
             clipping to zero before separation"
        ));
        clipped.mapv_inplace(|x| x.max(0.0));
    }

    let start = Instant::now();
    let mut best = None;
    let mut attempts = 0;
    for attempt in 0..config.max_tries {
        attempts = attempt + 1;
        let fit = nmf::fit(
            &clipped,
            &NmfParams {
                n_components: n_signals,
                alpha: config.alpha,
                max_iter: config.max_iter,
                tol: config.tol,
                seed: attempt as u64,
            },
        );
        let converged = fit.converged;
        best = Some(fit);
        if converged {
            break;
        }
        reporter.detail(&format!(
            "{label}: attempt {attempts}/{} did not converge, retrying with a new seed",
            config.max_tries
        ));
    }
    let fit = best.ok_or_else(|| Error::Config("max_tries must be at least one".into()))?;
    if fit.converged {
        reporter.detail(&format!(
            "{label}: converged after {} iterations",
            fit.iterations
        ));
    } else {
        reporter.convergence_failure(label, fit.iterations);
    }

    let order = match_order(&fit.sources, &clipped.row(0).to_owned());
    let sources = reorder_rows(&fit.sources, &order);
    let mixmat = reorder_cols(&fit.mixing, &order);

    let mut scaled = sources.clone();
    if sources.nrows() > 0 {
        let raw = grid.row(0);
        let top = sources.row(0);
        let (scale, offset) = affine_fit(&top.to_owned(), &raw.to_owned());
        scaled.mapv_inplace(|x| x * scale);
        for x in scaled.row_mut(0) {
            *x += offset;
        }
    }

    let info = SeparationInfo {
        converged: fit.converged,
        iterations: fit.iterations,
        attempts,
        elapsed_secs: start.elapsed().as_secs_f64(),
    };

    Ok(CellSeparation {
        sep: split_trials(&sources, &splits)?,
        matched: split_trials(&scaled, &splits)?,
        mixmat,
        info,
    })
}

/// Component indices sorted by descending correlation with the raw trace.
fn match_order(sources: &Array2<f64>, raw: &ndarray::Array1<f64>) -> Vec<usize> {
    let mut scored: Vec<(usize, f64)> = sources
        .axis_iter(Axis(0))
        .enumerate()
        .map(|(i, row)| (i, correlation(&row.to_owned(), raw)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.into_iter().map(|(i, _)| i).collect()
}

fn reorder_rows(a: &Array2<f64>, order: &[usize]) -> Array2<f64> {
    let mut out = Array2::zeros(a.raw_dim());
    for (dst, &src) in order.iter().enumerate() {
        out.row_mut(dst).assign(&a.row(src));
    }
    out
}

fn reorder_cols(a: &Array2<f64>, order: &[usize]) -> Array2<f64> {
    let mut out = Array2::zeros(a.raw_dim());
    for (dst, &src) in order.iter().enumerate() {
        out.column_mut(dst).assign(&a.column(src));
    }
    out
}

/// Pearson correlation, zero when either side has no variance.
fn correlation(x: &ndarray::Array1<f64>, y: &ndarray::Array1<f64>) -> f64 {
    let n = x.len();
    if n == 0 || n != y.len() {
        return 0.0;
    }
    let mx = x.mean().unwrap_or(0.0);
    let my = y.mean().unwrap_or(0.0);
    let mut cov = 0.0;
    let mut vx = 0.0;
    let mut vy = 0.0;
    for (&a, &b) in x.iter().zip(y.iter()) {
        cov += (a - mx) * (b - my);
        vx += (a - mx) * (a - mx);
        vy += (b - my) * (b - my);
    }
    if vx <= 0.0 || vy <= 0.0 {
        return 0.0;
    }
    cov / (vx.sqrt() * vy.sqrt())
}

/// Least-squares `scale * x + offset ~ y`.
fn affine_fit(x: &ndarray::Array1<f64>, y: &ndarray::Array1<f64>) -> (f64, f64) {
    let n = x.len();
    if n == 0 || n != y.len() {
        return (1.0, 0.0);
    }
    let mx = x.mean().unwrap_or(0.0);
    let my = y.mean().unwrap_or(0.0);
    let mut cov = 0.0;
    let mut var = 0.0;
    for (&a, &b) in x.iter().zip(y.iter()) {
        cov += (a - mx) * (b - my);
        var += (a - mx) * (a - mx);
    }
    if var <= 0.0 {
        return (1.0, my - mx);
    }
    let scale = cov / var;
    (scale, my - scale * mx)
}
