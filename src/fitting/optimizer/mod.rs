//! Nonlinear least-squares backends for the Gaussian fit routines.
//!
//! Both backends minimize the Poisson-weighted chi-square of the spectral
//! model against a measured spectrum over the free parameters of a
//! [`FitParameters`] set. They share the problem definition, the
//! finite-difference Jacobian and the damped normal-equation solve below and
//! differ in how they steer the damping and handle bounds.

pub mod lmfit;
pub mod mpfit;

pub use lmfit::LmfitOptimizer;
pub use mpfit::MpfitOptimizer;

use crate::data::{EnergyRange, FitElements, Spectrum};
use crate::model::{evaluate, FitParam, FitParameters};
use nalgebra::{DMatrix, DVector};
use std::str::FromStr;
use std::sync::Arc;

/// Selects an optimizer backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OptimizerKind {
    #[default]
    Lmfit,
    Mpfit,
}

impl OptimizerKind {
    pub fn name(&self) -> &'static str {
        match self {
            OptimizerKind::Lmfit => "lmfit",
            OptimizerKind::Mpfit => "mpfit",
        }
    }
}

impl FromStr for OptimizerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lmfit" => Ok(OptimizerKind::Lmfit),
            "mpfit" => Ok(OptimizerKind::Mpfit),
            other => Err(other.to_string()),
        }
    }
}

/// Termination settings shared by both backends.
#[derive(Debug, Clone)]
pub struct OptimizerOptions {
    pub max_iter: usize,
    /// Relative chi-square reduction below which the fit is done.
    pub ftol: f64,
    /// Relative parameter change below which the fit is done.
    pub xtol: f64,
    /// Relative precision of the model; sets the finite-difference step.
    pub epsfcn: f64,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        Self {
            max_iter: 100,
            ftol: 1e-10,
            xtol: 1e-10,
            epsfcn: 1e-10,
        }
    }
}

/// How a minimization ended.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerOutcome {
    pub converged: bool,
    pub iterations: usize,
    pub chi_square: f64,
}

/// A nonlinear least-squares backend.
pub trait Optimizer: Send + Sync {
    fn kind(&self) -> OptimizerKind;

    /// Fit the free parameters of `params` to `spectrum` over `range`.
    ///
    /// `params` always ends up holding the best point found, within bounds,
    /// whether or not the fit converged.
    fn minimize(
        &self,
        params: &mut FitParameters,
        elements: &FitElements,
        spectrum: &Spectrum,
        range: EnergyRange,
    ) -> OptimizerOutcome;
}

/// Build the backend for `kind`.
pub fn create_optimizer(kind: OptimizerKind, options: OptimizerOptions) -> Arc<dyn Optimizer> {
    match kind {
        OptimizerKind::Lmfit => Arc::new(LmfitOptimizer::new(options)),
        OptimizerKind::Mpfit => Arc::new(MpfitOptimizer::new(options)),
    }
}

/// The least-squares problem seen by a backend: free parameters in, weighted
/// residuals out.
pub(crate) struct Problem<'a> {
    template: FitParameters,
    free: Vec<FitParam>,
    elements: &'a FitElements,
    range: EnergyRange,
    observed: Vec<f64>,
    weights: Vec<f64>,
}

impl<'a> Problem<'a> {
    pub(crate) fn new(
        params: &FitParameters,
        elements: &'a FitElements,
        spectrum: &Spectrum,
        range: EnergyRange,
    ) -> Self {
        let slice = spectrum.sub_spectrum(range);
        let observed: Vec<f64> = (0..range.count())
            .map(|i| slice.get(i).copied().unwrap_or(0.0))
            .collect();
        let weights = observed.iter().map(|y| 1.0 / y.max(1.0).sqrt()).collect();
        let free = params.iter().filter(|p| p.is_free()).cloned().collect();
        Self {
            template: params.clone(),
            free,
            elements,
            range,
            observed,
            weights,
        }
    }

    pub(crate) fn dim(&self) -> usize {
        self.free.len()
    }

    pub(crate) fn bounds(&self) -> &[FitParam] {
        &self.free
    }

    /// Current free values, projected onto their bounds.
    pub(crate) fn start(&self) -> DVector<f64> {
        DVector::from_iterator(self.dim(), self.free.iter().map(|p| p.clamp(p.value)))
    }

    pub(crate) fn project(&self, x: &mut DVector<f64>) {
        for (value, param) in x.iter_mut().zip(&self.free) {
            *value = param.clamp(*value);
        }
    }

    /// Write `x` into `params`.
    pub(crate) fn apply(&self, x: &DVector<f64>, params: &mut FitParameters) {
        for (value, param) in x.iter().zip(&self.free) {
            params.set_value(&param.name, *value);
        }
    }

    /// Weighted residuals `(y − m) / σ`.
    pub(crate) fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        let mut params = self.template.clone();
        self.apply(x, &mut params);
        let model = evaluate(&params, self.elements, self.range);
        DVector::from_iterator(
            self.observed.len(),
            self.observed
                .iter()
                .zip(&model)
                .zip(&self.weights)
                .map(|((y, m), w)| {
                    let r = (y - m) * w;
                    if r.is_finite() {
                        r
                    } else {
                        0.0
                    }
                }),
        )
    }

    /// Forward-difference Jacobian of the residuals at `x`.
    ///
    /// Steps away from a bound the parameter sits on.
    pub(crate) fn jacobian(&self, x: &DVector<f64>, r: &DVector<f64>, epsfcn: f64) -> DMatrix<f64> {
        let eps = epsfcn.max(f64::EPSILON).sqrt();
        let mut jac = DMatrix::zeros(r.len(), self.dim());
        for (j, param) in self.free.iter().enumerate() {
            let mut h = eps * x[j].abs();
            if h == 0.0 {
                h = eps;
            }
            if x[j] + h > param.clamp(x[j] + h) {
                h = -h;
            }
            let mut stepped = x.clone();
            stepped[j] += h;
            let rh = self.residuals(&stepped);
            jac.set_column(j, &((rh - r) / h));
        }
        jac
    }
}

/// Solve `(JᵀJ + λ·D) δ = −Jᵀr`.
pub(crate) fn damped_step(
    jtj: &DMatrix<f64>,
    gradient: &DVector<f64>,
    diag: &DVector<f64>,
    lambda: f64,
) -> Option<DVector<f64>> {
    let mut a = jtj.clone();
    for i in 0..a.nrows() {
        a[(i, i)] += lambda * diag[i];
    }
    let rhs = -gradient;
    match a.clone().cholesky() {
        Some(chol) => Some(chol.solve(&rhs)),
        None => a.svd(true, true).solve(&rhs, 1e-14).ok(),
    }
    .filter(|step| step.iter().all(|v| v.is_finite()))
}

/// Whether the step is small relative to the parameters.
pub(crate) fn small_step(x: &DVector<f64>, step: &DVector<f64>, xtol: f64) -> bool {
    step.norm() <= xtol * (x.norm() + xtol)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::data::{EnergyRange, FitElement, FitElements, Spectrum};
    use crate::model::{FitParameters, FitParamsPreset, SpectraModel, ENERGY_OFFSET};

    pub fn elements() -> FitElements {
        let mut set = FitElements::new();
        set.insert(FitElement::new("Fe", 26, &[("ka1", 6.404, 0.58), ("kb1", 7.058, 0.13)]));
        set.insert(FitElement::new("Cu", 29, &[("ka1", 8.048, 0.58), ("kb1", 8.905, 0.13)]));
        set
    }

    /// Spectrum with Fe 2000 and Cu 700 on a calibration shifted by `offset`.
    pub fn measured(offset: f64) -> Spectrum {
        let mut params = FitParameters::new();
        params.set_value(ENERGY_OFFSET, offset);
        params.set_value("Fe", 2000.0);
        params.set_value("Cu", 700.0);
        SpectraModel::new(params).model_spectrum(&elements(), EnergyRange::full(2048))
    }

    pub fn start(preset: FitParamsPreset) -> FitParameters {
        let mut params = FitParameters::new();
        params.apply_preset(preset, &elements());
        params.set_value("Fe", 1000.0);
        params.set_value("Cu", 1000.0);
        params
    }
}
