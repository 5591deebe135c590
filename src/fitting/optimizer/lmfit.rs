//! Classic Levenberg–Marquardt with multiplicative damping.

use super::{damped_step, small_step, Optimizer, OptimizerKind, OptimizerOptions, OptimizerOutcome, Problem};
use crate::data::{EnergyRange, FitElements, Spectrum};
use crate::model::FitParameters;
use nalgebra::DVector;

const LAMBDA_START: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e12;

/// Marquardt damping on `diag(JᵀJ)`: ×10 after a rejected step, ÷10 after an
/// accepted one. Steps are projected back onto the parameter bounds.
#[derive(Debug, Clone, Default)]
pub struct LmfitOptimizer {
    options: OptimizerOptions,
}

impl LmfitOptimizer {
    pub fn new(options: OptimizerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &OptimizerOptions {
        &self.options
    }
}

impl Optimizer for LmfitOptimizer {
    fn kind(&self) -> OptimizerKind {
        OptimizerKind::Lmfit
    }

    fn minimize(
        &self,
        params: &mut FitParameters,
        elements: &FitElements,
        spectrum: &Spectrum,
        range: EnergyRange,
    ) -> OptimizerOutcome {
        let problem = Problem::new(params, elements, spectrum, range);
        let mut x = problem.start();
        let mut r = problem.residuals(&x);
        let mut chi = r.norm_squared();

        if problem.dim() == 0 {
            return OptimizerOutcome {
                converged: true,
                iterations: 0,
                chi_square: chi,
            };
        }

        let opts = &self.options;
        let mut lambda = LAMBDA_START;
        let mut converged = false;
        let mut iterations = 0;

        while iterations < opts.max_iter {
            iterations += 1;
            let jac = problem.jacobian(&x, &r, opts.epsfcn);
            let jtj = jac.tr_mul(&jac);
            let gradient = jac.tr_mul(&r);
            let diag = DVector::from_fn(jtj.nrows(), |i, _| jtj[(i, i)].max(f64::MIN_POSITIVE));

            let mut accepted = None;
            while lambda <= LAMBDA_MAX {
                let Some(step) = damped_step(&jtj, &gradient, &diag, lambda) else {
                    lambda *= 10.0;
                    continue;
                };
                let mut trial = &x + &step;
                problem.project(&mut trial);
                let trial_r = problem.residuals(&trial);
                let trial_chi = trial_r.norm_squared();
                if trial_chi < chi {
                    lambda = (lambda / 10.0).max(f64::EPSILON);
                    accepted = Some((trial, trial_r, trial_chi));
                    break;
                }
                lambda *= 10.0;
            }

            let Some((trial, trial_r, trial_chi)) = accepted else {
                // No downhill step at any damping: already at the minimum.
                converged = true;
                break;
            };

            let reduction = (chi - trial_chi) / chi.max(f64::MIN_POSITIVE);
            let moved = &trial - &x;
            x = trial;
            r = trial_r;
            chi = trial_chi;
            if reduction <= opts.ftol || small_step(&x, &moved, opts.xtol) || chi == 0.0 {
                converged = true;
                break;
            }
        }

        problem.apply(&x, params);
        OptimizerOutcome {
            converged,
            iterations,
            chi_square: chi,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::model::{FitParamsPreset, SpectraModel, ENERGY_OFFSET};

    #[test]
    fn test_recovers_amplitudes() {
        let optimizer = LmfitOptimizer::default();
        let mut params = start(FitParamsPreset::MatrixBatchFit);
        let outcome = optimizer.minimize(
            &mut params,
            &elements(),
            &measured(0.0),
            EnergyRange::new(100, 1200),
        );
        assert!(outcome.converged);
        assert!(outcome.iterations >= 1);
        assert!((params.value("Fe") - 2000.0).abs() < 1e-3, "Fe {}", params.value("Fe"));
        assert!((params.value("Cu") - 700.0).abs() < 1e-3, "Cu {}", params.value("Cu"));
        assert!(outcome.chi_square < 1e-6);
    }

    #[test]
    fn test_recovers_energy_offset() {
        let optimizer = LmfitOptimizer::default();
        let mut params = start(FitParamsPreset::BatchFitNoTails);
        let outcome = optimizer.minimize(
            &mut params,
            &elements(),
            &measured(0.015),
            EnergyRange::new(100, 1200),
        );
        assert!((params.value(ENERGY_OFFSET) - 0.015).abs() < 1e-4, "offset {}", params.value(ENERGY_OFFSET));
        assert!((params.value("Fe") - 2000.0).abs() < 2.0);
        assert!(outcome.chi_square < 1.0);
    }

    #[test]
    fn test_amplitudes_stay_non_negative() {
        let optimizer = LmfitOptimizer::default();
        let mut params = start(FitParamsPreset::MatrixBatchFit);
        // Cu is fitted against a spectrum containing no Cu.
        let mut truth = FitParameters::new();
        truth.set_value("Fe", 2000.0);
        let mut only_fe = FitElements::new();
        only_fe.insert(elements().get("Fe").unwrap().clone());
        let spectrum = SpectraModel::new(truth).model_spectrum(&only_fe, EnergyRange::full(2048));

        optimizer.minimize(&mut params, &elements(), &spectrum, EnergyRange::new(100, 1200));
        assert!(params.value("Cu") >= 0.0);
        assert!(params.value("Cu") < 1.0);
        assert!((params.value("Fe") - 2000.0).abs() < 1e-2);
    }

    #[test]
    fn test_iteration_cap_keeps_last_iterate() {
        let optimizer = LmfitOptimizer::new(OptimizerOptions {
            max_iter: 1,
            ..OptimizerOptions::default()
        });
        let mut params = start(FitParamsPreset::BatchFitWithTails);
        let outcome = optimizer.minimize(&mut params, &elements(), &measured(0.015), EnergyRange::new(100, 1200));
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.chi_square.is_finite());
        for name in ["Fe", "Cu"] {
            assert!(params.value(name).is_finite() && params.value(name) >= 0.0, "{name} {}", params.value(name));
        }
    }

    #[test]
    fn test_no_free_parameters() {
        let optimizer = LmfitOptimizer::default();
        let mut params = FitParameters::new();
        let before = params.clone();
        let outcome = optimizer.minimize(&mut params, &elements(), &measured(0.0), EnergyRange::new(100, 1200));
        assert_eq!(outcome.iterations, 0);
        assert_eq!(params, before);
    }
}
