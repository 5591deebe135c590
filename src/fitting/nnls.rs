//! Non-negative least squares against the fit matrix.
//!
//! Active-set solver of Lawson and Hanson working on the normal equations.
//! `AᵀA` is fixed for a run so it is computed once in `initialize`; each pixel
//! only forms `Aᵀb`.

use super::fit_matrix::{FitMatrix, MatrixFitBase};
use super::traits::{sanitize, zero_counts, FitCounts, FitRoutine, RoutineKind, NUM_ITR};
use crate::data::{EnergyRange, FitElements, Spectrum};
use crate::model::SpectraModel;
use nalgebra::{DMatrix, DVector};
use std::sync::Arc;
use tracing::debug;

/// Solver limits.
#[derive(Debug, Clone)]
pub struct NnlsConfig {
    /// Cap on outer (variable admission) iterations.
    pub max_iter: usize,
    /// Gradient threshold relative to `max |Aᵀb|`.
    pub tolerance: f64,
}

impl Default for NnlsConfig {
    fn default() -> Self {
        Self {
            max_iter: 100,
            tolerance: 1e-10,
        }
    }
}

/// Solution of one NNLS problem.
#[derive(Debug, Clone)]
pub struct NnlsSolution {
    pub x: DVector<f64>,
    pub iterations: usize,
    /// False when the iteration cap was hit first.
    pub converged: bool,
}

/// Minimize `‖Ax − b‖` subject to `x ≥ 0`, given `gram = AᵀA` and `atb = Aᵀb`.
pub fn solve_normal(gram: &DMatrix<f64>, atb: &DVector<f64>, config: &NnlsConfig) -> NnlsSolution {
    let n = atb.len();
    let mut x = DVector::zeros(n);
    let mut passive = vec![false; n];

    let scale = atb.amax();
    if n == 0 || scale <= 0.0 || !scale.is_finite() {
        return NnlsSolution {
            x,
            iterations: 0,
            converged: true,
        };
    }
    let tol = config.tolerance * scale;

    let mut w = atb - gram * &x;
    let mut iterations = 0;

    loop {
        let candidate = (0..n)
            .filter(|&i| !passive[i] && w[i] > tol)
            .max_by(|&a, &b| w[a].total_cmp(&w[b]));
        let Some(j) = candidate else {
            return NnlsSolution {
                x,
                iterations,
                converged: true,
            };
        };
        if iterations >= config.max_iter {
            return NnlsSolution {
                x,
                iterations,
                converged: false,
            };
        }
        iterations += 1;
        passive[j] = true;

        // Each pass removes at least one variable from the passive set.
        for _ in 0..=n {
            let s = solve_passive(gram, atb, &passive);
            let infeasible: Vec<usize> = (0..n).filter(|&i| passive[i] && s[i] <= 0.0).collect();
            if infeasible.is_empty() {
                x = s;
                break;
            }

            let alpha = infeasible
                .iter()
                .map(|&i| {
                    let denom = x[i] - s[i];
                    if denom > 0.0 {
                        x[i] / denom
                    } else {
                        0.0
                    }
                })
                .fold(f64::INFINITY, f64::min);
            x += (&s - &x) * alpha;

            for i in 0..n {
                if passive[i] && x[i] <= tol * f64::EPSILON.sqrt() {
                    passive[i] = false;
                    x[i] = 0.0;
                }
            }
            // The admitted index may have been dropped straight away.
            if !passive.iter().any(|&p| p) {
                break;
            }
        }

        w = atb - gram * &x;
        // Guard against cycling on a variable the inner loop just rejected.
        if !passive[j] && w[j] > tol {
            w[j] = 0.0;
        }
    }
}

/// Unconstrained solve restricted to the passive set; zeros elsewhere.
fn solve_passive(gram: &DMatrix<f64>, atb: &DVector<f64>, passive: &[bool]) -> DVector<f64> {
    let index: Vec<usize> = (0..passive.len()).filter(|&i| passive[i]).collect();
    let k = index.len();
    let sub = DMatrix::from_fn(k, k, |r, c| gram[(index[r], index[c])]);
    let rhs = DVector::from_fn(k, |r, _| atb[index[r]]);

    let solved = match sub.clone().cholesky() {
        Some(chol) => Some(chol.solve(&rhs)),
        None => sub.svd(true, true).solve(&rhs, 1e-12).ok(),
    };

    let mut out = DVector::zeros(passive.len());
    if let Some(z) = solved {
        for (r, &i) in index.iter().enumerate() {
            out[i] = z[r];
        }
    }
    out
}

/// Non-negative amplitudes per element.
#[derive(Default)]
pub struct NnlsFitRoutine {
    base: MatrixFitBase,
    gram: Option<Arc<DMatrix<f64>>>,
    config: NnlsConfig,
}

impl NnlsFitRoutine {
    pub fn new(config: NnlsConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn fit_matrix(&self) -> Option<&Arc<FitMatrix>> {
        self.base.matrix()
    }
}

fn gram_of(matrix: &FitMatrix) -> DMatrix<f64> {
    matrix.matrix().tr_mul(matrix.matrix())
}

impl FitRoutine for NnlsFitRoutine {
    fn kind(&self) -> RoutineKind {
        RoutineKind::Nnls
    }

    fn initialize(&mut self, model: &SpectraModel, elements: &FitElements, range: EnergyRange) {
        let rebuilt = self.base.initialize(model, elements, range);
        if rebuilt || self.gram.is_none() {
            self.gram = self.base.matrix().map(|m| Arc::new(gram_of(m)));
        }
    }

    fn fit_spectra(
        &self,
        model: &SpectraModel,
        spectrum: &Spectrum,
        elements: &FitElements,
    ) -> FitCounts {
        let mut counts = zero_counts(elements);
        if elements.is_empty() {
            return counts;
        }

        let (matrix, reused) = self.base.matrix_for(model, elements, spectrum);
        let local;
        let gram = match (&self.gram, reused) {
            (Some(gram), true) => gram.as_ref(),
            _ => {
                local = gram_of(&matrix);
                &local
            }
        };

        let atb = matrix.matrix().tr_mul(&matrix.rhs(spectrum));
        let solution = solve_normal(gram, &atb, &self.config);
        if !solution.converged {
            debug!(iterations = solution.iterations, "nnls hit iteration cap");
        }

        for (col, name) in matrix.names().iter().enumerate() {
            counts.insert(name.clone(), solution.x[col]);
        }
        counts.insert(NUM_ITR.to_string(), solution.iterations as f64);
        sanitize(&mut counts);
        counts
    }
}
