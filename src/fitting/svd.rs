//! Linear decomposition of a spectrum onto the fit matrix by SVD.

use super::fit_matrix::{FitMatrix, MatrixFitBase};
use super::traits::{sanitize, zero_counts, FitCounts, FitRoutine, RoutineKind};
use crate::data::{EnergyRange, FitElements, Spectrum};
use crate::model::SpectraModel;
use nalgebra::linalg::SVD;
use nalgebra::{DVector, Dyn};
use std::sync::Arc;
use tracing::debug;

type Decomposition = SVD<f64, Dyn, Dyn>;

/// Singular values below this fraction of the largest are truncated.
const DEFAULT_RCOND: f64 = 1e-10;

/// Least-squares amplitudes via a decomposition computed once per matrix.
pub struct SvdFitRoutine {
    base: MatrixFitBase,
    decomposition: Option<Arc<Decomposition>>,
    rcond: f64,
}

impl Default for SvdFitRoutine {
    fn default() -> Self {
        Self {
            base: MatrixFitBase::default(),
            decomposition: None,
            rcond: DEFAULT_RCOND,
        }
    }
}

impl SvdFitRoutine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fit matrix built by the last `initialize`.
    pub fn fit_matrix(&self) -> Option<&Arc<FitMatrix>> {
        self.base.matrix()
    }
}

fn decompose(matrix: &FitMatrix) -> Decomposition {
    matrix.matrix().clone().svd(true, true)
}

/// Least-squares coefficients, zeroing singular values under `rcond · σ_max`.
fn solve(svd: &Decomposition, rhs: &DVector<f64>, rcond: f64) -> Option<DVector<f64>> {
    let sigma_max = svd.singular_values.max();
    if sigma_max <= 0.0 {
        return None;
    }
    svd.solve(rhs, sigma_max * rcond).ok()
}

impl FitRoutine for SvdFitRoutine {
    fn kind(&self) -> RoutineKind {
        RoutineKind::Svd
    }

    fn initialize(&mut self, model: &SpectraModel, elements: &FitElements, range: EnergyRange) {
        let rebuilt = self.base.initialize(model, elements, range);
        if rebuilt || self.decomposition.is_none() {
            self.decomposition = self
                .base
                .matrix()
                .filter(|m| m.ncols() > 0 && m.nrows() > 0)
                .map(|m| Arc::new(decompose(m)));
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
        if matrix.nrows() == 0 {
            return counts;
        }
        let local;
        let svd = match (&self.decomposition, reused) {
            (Some(svd), true) => svd.as_ref(),
            _ => {
                local = decompose(&matrix);
                &local
            }
        };

        let rhs = matrix.rhs(spectrum);
        let Some(coefficients) = solve(svd, &rhs, self.rcond) else {
            debug!("rank-deficient fit matrix, returning zeros");
            return counts;
        };

        for (col, name) in matrix.names().iter().enumerate() {
            counts.insert(name.clone(), coefficients[col]);
        }
        sanitize(&mut counts);
        counts
    }
}
