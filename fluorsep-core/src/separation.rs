//! Separation configuration and diagnostics.

use serde::{Deserialize, Serialize};

/// Source separation method.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeparationMethod {
    /// Regularized non-negative matrix factorization.
    #[default]
    Nmf,
}

impl std::fmt::Display for SeparationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Nmf => write!(f, "nmf"),
        }
    }
}

/// Configuration for the separation pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeparationConfig {
    /// Number of neuropil regions around each ROI.
    pub n_regions: usize,
    /// Neuropil dilation radius as a factor of `sqrt(ROI area)`.
    pub expansion: f64,
    /// L1 regularization strength for the factorization.
    pub alpha: f64,
    /// Iteration cap per factorization attempt.
    pub max_iter: usize,
    /// Convergence tolerance on the relative objective decrease.
    pub tol: f64,
    /// Number of factorization attempts before giving up on convergence.
    pub max_tries: usize,
    /// Separation method.
    pub method: SeparationMethod,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            n_regions: 4,
            expansion: 1.0,
            alpha: 0.1,
            max_iter: 20_000,
            tol: 1e-4,
            max_tries: 1,
            method: SeparationMethod::Nmf,
        }
    }
}

impl SeparationConfig {
    /// Set the number of neuropil regions.
    #[must_use]
    pub fn with_n_regions(mut self, n_regions: usize) -> Self {
        self.n_regions = n_regions;
        self
    }

    /// Set the neuropil expansion factor.
    #[must_use]
    pub fn with_expansion(mut self, expansion: f64) -> Self {
        self.expansion = expansion;
        self
    }

    /// Set the regularization strength.
    #[must_use]
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set the iteration cap.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the convergence tolerance.
    #[must_use]
    pub fn with_tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    /// Set the retry cap for non-converging fits.
    #[must_use]
    pub fn with_max_tries(mut self, max_tries: usize) -> Self {
        self.max_tries = max_tries.max(1);
        self
    }

    /// Set the separation method.
    #[must_use]
    pub fn with_method(mut self, method: SeparationMethod) -> Self {
        self.method = method;
        self
    }
}

/// Convergence diagnostics for one cell's separation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeparationInfo {
    /// Whether any attempt converged within tolerance.
    pub converged: bool,
    /// Iterations used by the kept attempt.
    pub iterations: usize,
    /// Attempts made (first converged attempt is kept).
    pub attempts: usize,
    /// Wall time spent separating this cell, in seconds.
    pub elapsed_secs: f64,
}
