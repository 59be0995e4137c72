//! Regularized non-negative matrix factorization.
//!
//! Coordinate-descent (HALS) NMF specialized for the separation stage: a
//! fixed small component count, an L1 penalty on both factors, seeded random
//! initialization so fits are reproducible, and convergence declared only
//! once the objective stops decreasing between checks.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const EPS: f64 = 1e-12;
const CHECK_INTERVAL: usize = 10;

/// Parameters for one factorization attempt.
#[derive(Clone, Debug)]
pub struct NmfParams {
    /// Number of components (rows of H, columns of W).
    pub n_components: usize,
    /// L1 penalty applied to both factors.
    pub alpha: f64,
    /// Iteration cap.
    pub max_iter: usize,
    /// Convergence tolerance on the objective decrease between checks,
    /// relative to the previous objective value.
    pub tol: f64,
    /// RNG seed for the initialization.
    pub seed: u64,
}

/// Result of one factorization attempt, `V ~ mixing . sources`.
#[derive(Clone, Debug)]
pub struct NmfFit {
    /// Mixing matrix W, shape `(n_signals, n_components)`, non-negative.
    pub mixing: Array2<f64>,
    /// Source matrix H, shape `(n_components, n_frames)`, non-negative.
    pub sources: Array2<f64>,
    /// Iterations performed.
    pub iterations: usize,
    /// Whether the objective decrease stalled below tolerance.
    pub converged: bool,
    /// Final objective value.
    pub objective: f64,
}

/// Fits `v ~ W . H` with HALS coordinate descent and an L1 penalty.
///
/// Each iteration block-minimizes one component row of H at a time (then
/// one column of W), which makes far better per-iteration progress than
/// multiplicative updates on the near-collinear matrices the separation
/// stage produces. Convergence is declared when the objective decrease
/// between checks falls below `tol` relative to the previous value, so a
/// fit is only flagged converged once progress has genuinely stalled.
///
/// `v` must be non-negative (the separation stage clips beforehand). The
/// fit is deterministic for a given seed. Degenerate inputs (empty matrix,
/// zero components, all-zero data) yield a well-defined zero factorization
/// flagged as converged rather than an error.
#[must_use]
pub fn fit(v: &Array2<f64>, params: &NmfParams) -> NmfFit {
    let (m, n) = v.dim();
    let k = params.n_components;

    if m == 0 || n == 0 || k == 0 || objective(v, None, params.alpha) <= EPS {
        return NmfFit {
            mixing: Array2::zeros((m, k)),
            sources: Array2::zeros((k, n)),
            iterations: 0,
            converged: true,
            objective: 0.0,
        };
    }

    let mut rng = StdRng::seed_from_u64(params.seed);
    let scale = (v.mean().unwrap_or(0.0).max(EPS) / k as f64).sqrt();
    let mut w = Array2::from_shape_fn((m, k), |_| scale * (rng.random::<f64>() + 0.01));
    let mut h = Array2::from_shape_fn((k, n), |_| scale * (rng.random::<f64>() + 0.01));

    let mut previous = objective(v, Some((&w, &h)), params.alpha);
    let mut converged = false;
    let mut iterations = 0;
    let mut current = previous;

    for iter in 1..=params.max_iter {
        // H rows, one component at a time (Gauss-Seidel):
        // H[j] <- max(0, H[j] + (W^T V - W^T W H - alpha)[j] / (W^T W)[jj])
        let gram_w = w.t().dot(&w);
        let wt_v = w.t().dot(v);
        for j in 0..k {
            let denom = gram_w[[j, j]];
            if denom <= EPS {
                // Dead component; nothing to redistribute.
                continue;
            }
            let projection = gram_w.row(j).dot(&h);
            let mut row = h.row_mut(j);
            for (t, x) in row.iter_mut().enumerate() {
                *x = (*x + (wt_v[[j, t]] - projection[t] - params.alpha) / denom).max(0.0);
            }
        }

        // Same update on W columns with H held fixed.
        let gram_h = h.dot(&h.t());
        let v_ht = v.dot(&h.t());
        for j in 0..k {
            let denom = gram_h[[j, j]];
            if denom <= EPS {
                continue;
            }
            let projection = w.dot(&gram_h.column(j));
            let mut col = w.column_mut(j);
            for (i, x) in col.iter_mut().enumerate() {
                *x = (*x + (v_ht[[i, j]] - projection[i] - params.alpha) / denom).max(0.0);
            }
        }

        iterations = iter;
        if iter % CHECK_INTERVAL == 0 || iter == params.max_iter {
            current = objective(v, Some((&w, &h)), params.alpha);
            if previous - current <= params.tol * previous.max(EPS) {
                converged = true;
                break;
            }
            previous = current;
        }
    }

    NmfFit {
        mixing: w,
        sources: h,
        iterations,
        converged,
        objective: current,
    }
}

fn objective(v: &Array2<f64>, factors: Option<(&Array2<f64>, &Array2<f64>)>, alpha: f64) -> f64 {
    match factors {
        None => 0.5 * v.iter().map(|&x| x * x).sum::<f64>(),
        Some((w, h)) => {
            let reconstruction = w.dot(h);
            let residual: f64 = v
                .iter()
                .zip(reconstruction.iter())
                .map(|(&a, &b)| (a - b) * (a - b))
                .sum();
            0.5 * residual + alpha * (w.sum() + h.sum())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn rank_two_matrix(m: usize, n: usize) -> Array2<f64> {
        // Product of two strictly positive factors, so an exact rank-2
        // non-negative factorization exists.
        let w = Array2::from_shape_fn((m, 2), |(i, j)| 0.5 + ((i * 3 + j * 7) % 11) as f64);
        let h = Array2::from_shape_fn((2, n), |(i, j)| 0.2 + ((i * 5 + j * 2) % 7) as f64);
        w.dot(&h)
    }

    #[test]
    fn test_factors_stay_non_negative() {
        let v = rank_two_matrix(5, 40);
        let fit = fit(
            &v,
            &NmfParams {
                n_components: 3,
                alpha: 0.1,
                max_iter: 200,
                tol: 1e-4,
                seed: 7,
            },
        );
        assert!(fit.mixing.iter().all(|&x| x >= 0.0));
        assert!(fit.sources.iter().all(|&x| x >= 0.0));
    }

    #[test]
    fn test_reconstruction_improves() {
        let v = rank_two_matrix(5, 60);
        let short = fit(
            &v,
            &NmfParams {
                n_components: 2,
                alpha: 0.0,
                max_iter: 5,
                tol: 1e-12,
                seed: 3,
            },
        );
        let long = fit(
            &v,
            &NmfParams {
                n_components: 2,
                alpha: 0.0,
                max_iter: 2000,
                tol: 1e-12,
                seed: 3,
            },
        );
        assert!(long.objective < short.objective);
        let norm: f64 = v.iter().map(|&x| x * x).sum::<f64>();
        assert!(long.objective / norm < 1e-3);
    }

    #[test]
    fn test_converges_on_easy_input() {
        let v = rank_two_matrix(4, 50);
        let fit = fit(
            &v,
            &NmfParams {
                n_components: 2,
                alpha: 0.0,
                max_iter: 10_000,
                tol: 1e-4,
                seed: 11,
            },
        );
        assert!(fit.converged);
        assert!(fit.iterations < 10_000);
    }

    #[test]
    fn test_default_tolerance_stops_near_strict_optimum() {
        // A lax stopping rule would flag convergence on a shallow plateau
        // far from the minimum; the fit at the default tolerance must land
        // within a hair of the one driven to numerical exhaustion.
        let v = rank_two_matrix(5, 80);
        let norm: f64 = v.iter().map(|&x| x * x).sum::<f64>();
        let base = NmfParams {
            n_components: 2,
            alpha: 0.0,
            max_iter: 20_000,
            tol: 1e-4,
            seed: 9,
        };
        let loose = fit(&v, &base);
        let strict = fit(&v, &NmfParams { tol: 1e-12, ..base.clone() });
        assert!(loose.converged);
        assert!((loose.objective - strict.objective) / norm < 1e-6);
    }

    #[test]
    fn test_single_iteration_does_not_converge() {
        let v = rank_two_matrix(5, 40);
        let fit = fit(
            &v,
            &NmfParams {
                n_components: 3,
                alpha: 0.1,
                max_iter: 1,
                tol: 1e-9,
                seed: 1,
            },
        );
        assert!(!fit.converged);
        assert_eq!(fit.iterations, 1);
    }

    #[test]
    fn test_zero_matrix_degenerate() {
        let v = Array2::<f64>::zeros((4, 30));
        let fit = fit(
            &v,
            &NmfParams {
                n_components: 4,
                alpha: 0.1,
                max_iter: 100,
                tol: 1e-4,
                seed: 0,
            },
        );
        assert!(fit.converged);
        assert_eq!(fit.iterations, 0);
        assert!(fit.sources.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_deterministic_for_seed() {
        let v = rank_two_matrix(5, 40);
        let params = NmfParams {
            n_components: 3,
            alpha: 0.05,
            max_iter: 300,
            tol: 1e-6,
            seed: 42,
        };
        let a = fit(&v, &params);
        let b = fit(&v, &params);
        assert_eq!(a.iterations, b.iterations);
        assert_eq!(a.mixing, b.mixing);
        assert_eq!(a.sources, b.sources);
    }
}
