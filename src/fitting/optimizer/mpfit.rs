//! Bound-aware Levenberg–Marquardt in the style of MINPACK `lmdif`.
//!
//! Differences from [`super::LmfitOptimizer`]: the damping scale is the running
//! maximum of `diag(JᵀJ)`, parameters pegged at a bound with the gradient
//! pointing outward are frozen for the step, and λ follows the gain ratio
//! between actual and predicted chi-square reduction.

use super::{damped_step, small_step, Optimizer, OptimizerKind, OptimizerOptions, OptimizerOutcome, Problem};
use crate::data::{EnergyRange, FitElements, Spectrum};
use crate::model::{BoundType, FitParameters};
use nalgebra::{DMatrix, DVector};

const LAMBDA_START: f64 = 1e-3;
const MAX_REJECTS: usize = 30;

#[derive(Debug, Clone, Default)]
pub struct MpfitOptimizer {
    options: OptimizerOptions,
}

impl MpfitOptimizer {
    pub fn new(options: OptimizerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &OptimizerOptions {
        &self.options
    }
}

/// Parameters on a bound whose descent direction points out of the box.
fn pegged(problem: &Problem, x: &DVector<f64>, gradient: &DVector<f64>) -> Vec<bool> {
    problem
        .bounds()
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let at_lo = matches!(p.bound_type, BoundType::LimitedLo | BoundType::LimitedLoHi)
                && x[i] <= p.min;
            let at_hi = matches!(p.bound_type, BoundType::LimitedHi | BoundType::LimitedLoHi)
                && x[i] >= p.max;
            // descent direction is −gradient
            (at_lo && gradient[i] > 0.0) || (at_hi && gradient[i] < 0.0)
        })
        .collect()
}

/// Zero the rows and columns of frozen parameters; unit diagonal keeps the
/// system solvable and the frozen step at 0.
fn freeze(jtj: &mut DMatrix<f64>, gradient: &mut DVector<f64>, frozen: &[bool]) {
    for (i, &f) in frozen.iter().enumerate() {
        if !f {
            continue;
        }
        jtj.row_mut(i).fill(0.0);
        jtj.column_mut(i).fill(0.0);
        jtj[(i, i)] = 1.0;
        gradient[i] = 0.0;
    }
}

impl Optimizer for MpfitOptimizer {
    fn kind(&self) -> OptimizerKind {
        OptimizerKind::Mpfit
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
        let mut scale = DVector::from_element(problem.dim(), f64::MIN_POSITIVE);
        let mut lambda = LAMBDA_START;
        let mut nu = 2.0;
        let mut converged = false;
        let mut iterations = 0;

        'outer: while iterations < opts.max_iter {
            iterations += 1;
            let jac = problem.jacobian(&x, &r, opts.epsfcn);
            let mut jtj = jac.tr_mul(&jac);
            let mut gradient = jac.tr_mul(&r);
            for i in 0..scale.len() {
                scale[i] = scale[i].max(jtj[(i, i)]);
            }

            let frozen = pegged(&problem, &x, &gradient);
            freeze(&mut jtj, &mut gradient, &frozen);
            if gradient.amax() == 0.0 {
                converged = true;
                break;
            }

            for _ in 0..MAX_REJECTS {
                let Some(step) = damped_step(&jtj, &gradient, &scale, lambda) else {
                    lambda *= nu;
                    nu *= 2.0;
                    continue;
                };
                let mut trial = &x + &step;
                problem.project(&mut trial);
                let taken = &trial - &x;

                // linear model of the residuals along the projected step
                let predicted = chi - (&r + &jac * &taken).norm_squared();
                let trial_r = problem.residuals(&trial);
                let trial_chi = trial_r.norm_squared();
                let actual = chi - trial_chi;

                if predicted > 0.0 && actual > 0.0 {
                    let rho = actual / predicted;
                    lambda *= (1.0 / 3.0f64).max(1.0 - (2.0 * rho - 1.0).powi(3));
                    nu = 2.0;

                    let reduction = actual / chi.max(f64::MIN_POSITIVE);
                    x = trial;
                    r = trial_r;
                    chi = trial_chi;
                    if reduction <= opts.ftol || small_step(&x, &taken, opts.xtol) || chi == 0.0 {
                        converged = true;
                        break 'outer;
                    }
                    continue 'outer;
                }

                lambda *= nu;
                nu *= 2.0;
            }

            // Every damping level was rejected.
            converged = true;
            break;
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
        let optimizer = MpfitOptimizer::default();
        let mut params = start(FitParamsPreset::MatrixBatchFit);
        let outcome = optimizer.minimize(
            &mut params,
            &elements(),
            &measured(0.0),
            EnergyRange::new(100, 1200),
        );
        assert!(outcome.converged);
        assert!((params.value("Fe") - 2000.0).abs() < 1e-3, "Fe {}", params.value("Fe"));
        assert!((params.value("Cu") - 700.0).abs() < 1e-3, "Cu {}", params.value("Cu"));
    }

    #[test]
    fn test_recovers_energy_offset() {
        let optimizer = MpfitOptimizer::default();
        let mut params = start(FitParamsPreset::BatchFitNoTails);
        optimizer.minimize(&mut params, &elements(), &measured(0.015), EnergyRange::new(100, 1200));
        assert!((params.value(ENERGY_OFFSET) - 0.015).abs() < 1e-4, "offset {}", params.value(ENERGY_OFFSET));
        assert!((params.value("Cu") - 700.0).abs() < 1.0);
    }

    #[test]
    fn test_pegged_amplitude_stays_on_bound() {
        let optimizer = MpfitOptimizer::default();
        let mut params = start(FitParamsPreset::MatrixBatchFit);
        params.set_value("Cu", 0.0);
        let mut truth = FitParameters::new();
        truth.set_value("Fe", 2000.0);
        let mut only_fe = FitElements::new();
        only_fe.insert(elements().get("Fe").unwrap().clone());
        let spectrum = SpectraModel::new(truth).model_spectrum(&only_fe, EnergyRange::full(2048));

        optimizer.minimize(&mut params, &elements(), &spectrum, EnergyRange::new(100, 1200));
        assert!(params.value("Cu") >= 0.0 && params.value("Cu") < 1e-6);
        assert!((params.value("Fe") - 2000.0).abs() < 1e-2);
    }

    #[test]
    fn test_iteration_cap_keeps_last_iterate() {
        let optimizer = MpfitOptimizer::new(OptimizerOptions {
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
    fn test_pegged_detection() {
        let elements = elements();
        let mut params = start(FitParamsPreset::MatrixBatchFit);
        params.set_value("Cu", 0.0);
        let problem = Problem::new(&params, &elements, &measured(0.0), EnergyRange::new(100, 1200));
        let x = problem.start();
        // positive gradient on Cu at its lower bound means descent points below 0
        let frozen = pegged(&problem, &x, &DVector::from_vec(vec![1.0, 1.0]));
        assert_eq!(frozen, vec![true, false]);
        let frozen = pegged(&problem, &x, &DVector::from_vec(vec![-1.0, 1.0]));
        assert_eq!(frozen, vec![false, false]);
    }
}
