//! Nonlinear Gaussian fits: every free model parameter is refined per pixel.

use super::optimizer::{create_optimizer, Optimizer, OptimizerKind, OptimizerOptions};
use super::roi::RoiFitRoutine;
use super::traits::{sanitize, zero_counts, FitCounts, FitRoutine, RoutineKind, NUM_ITR};
use crate::data::{EnergyRange, FitElements, Spectrum};
use crate::model::{FitParameters, FitParamsPreset, SpectraModel};
use std::sync::Arc;
use tracing::debug;

/// Gauss-Matrix (amplitudes only) or Gauss-Tails (width, step and tail free).
pub struct GaussFitRoutine {
    kind: RoutineKind,
    preset: FitParamsPreset,
    optimizer: Arc<dyn Optimizer>,
    range: Option<EnergyRange>,
}

impl GaussFitRoutine {
    /// Amplitudes free, shape locked to the model.
    pub fn matrix(optimizer: Arc<dyn Optimizer>) -> Self {
        Self::with_preset(RoutineKind::GaussMatrix, FitParamsPreset::MatrixBatchFit, optimizer)
    }

    /// Amplitudes plus calibration, width, step and tail free.
    pub fn tails(optimizer: Arc<dyn Optimizer>) -> Self {
        Self::with_preset(RoutineKind::GaussTails, FitParamsPreset::BatchFitWithTails, optimizer)
    }

    fn with_preset(kind: RoutineKind, preset: FitParamsPreset, optimizer: Arc<dyn Optimizer>) -> Self {
        Self {
            kind,
            preset,
            optimizer,
            range: None,
        }
    }

    /// Same routine with the default options of another backend.
    pub fn with_optimizer_kind(kind: RoutineKind, optimizer: OptimizerKind) -> Option<Self> {
        let optimizer = create_optimizer(optimizer, OptimizerOptions::default());
        match kind {
            RoutineKind::GaussMatrix => Some(Self::matrix(optimizer)),
            RoutineKind::GaussTails => Some(Self::tails(optimizer)),
            _ => None,
        }
    }

    pub fn preset(&self) -> FitParamsPreset {
        self.preset
    }

    pub fn optimizer_kind(&self) -> OptimizerKind {
        self.optimizer.kind()
    }
}

/// Starting point for one pixel: the model's parameters under `preset`,
/// amplitudes guessed from ROI sums.
fn initial_params(
    model: &SpectraModel,
    spectrum: &Spectrum,
    elements: &FitElements,
    preset: FitParamsPreset,
) -> FitParameters {
    let mut params = model.params().clone();
    params.apply_preset(preset, elements);

    let roi = RoiFitRoutine::default();
    let shape = model.shape();
    for element in elements.iter() {
        let guess = match (roi.window(&shape, element, spectrum.len()), element.primary_line()) {
            (Some(window), Some(line)) if line.ratio > 0.0 => {
                spectrum.sub_spectrum(window).iter().sum::<f64>() / line.ratio
            }
            _ => 0.0,
        };
        params.set_value(&element.name, guess.max(0.0));
    }
    params
}

impl FitRoutine for GaussFitRoutine {
    fn kind(&self) -> RoutineKind {
        self.kind
    }

    fn initialize(&mut self, _model: &SpectraModel, _elements: &FitElements, range: EnergyRange) {
        self.range = Some(range);
    }

    fn fit_spectra(
        &self,
        model: &SpectraModel,
        spectrum: &Spectrum,
        elements: &FitElements,
    ) -> FitCounts {
        let mut counts = zero_counts(elements);
        if elements.is_empty() || spectrum.is_empty() {
            return counts;
        }

        let range = self
            .range
            .unwrap_or_else(|| EnergyRange::full(spectrum.len()));
        let mut params = initial_params(model, spectrum, elements, self.preset);
        let outcome = self.optimizer.minimize(&mut params, elements, spectrum, range);
        if !outcome.converged {
            debug!(
                routine = self.kind.name(),
                iterations = outcome.iterations,
                chi_square = outcome.chi_square,
                "fit did not converge, keeping best point"
            );
        }

        for name in elements.names() {
            counts.insert(name.to_string(), params.value(name));
        }
        counts.insert(NUM_ITR.to_string(), outcome.iterations as f64);
        sanitize(&mut counts);
        counts
    }
}

/// Fit `spectrum` with every parameter `preset` frees and return the fitted
/// parameter set. Used to calibrate defaults on integrated spectra.
pub fn fit_parameters(
    model: &SpectraModel,
    spectrum: &Spectrum,
    elements: &FitElements,
    range: EnergyRange,
    preset: FitParamsPreset,
    optimizer: &dyn Optimizer,
) -> FitParameters {
    let mut params = initial_params(model, spectrum, elements, preset);
    let outcome = optimizer.minimize(&mut params, elements, spectrum, range);
    debug!(
        converged = outcome.converged,
        iterations = outcome.iterations,
        chi_square = outcome.chi_square,
        "parameter fit finished"
    );
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FitElement;
    use crate::fitting::optimizer::LmfitOptimizer;
    use crate::model::{ENERGY_OFFSET, F_TAIL};

    fn elements() -> FitElements {
        let mut set = FitElements::new();
        set.insert(FitElement::new("Fe", 26, &[("ka1", 6.404, 0.58), ("kb1", 7.058, 0.13)]));
        set.insert(FitElement::new("Zn", 30, &[("ka1", 8.639, 0.58), ("kb1", 9.572, 0.13)]));
        set
    }

    fn synthetic(params: FitParameters) -> Spectrum {
        SpectraModel::new(params).model_spectrum(&elements(), EnergyRange::full(2048))
    }

    fn truth() -> FitParameters {
        let mut params = FitParameters::new();
        params.set_value("Fe", 5000.0);
        params.set_value("Zn", 1200.0);
        params
    }

    #[test]
    fn test_matrix_recovers_amplitudes() {
        let model = SpectraModel::default();
        for kind in [OptimizerKind::Lmfit, OptimizerKind::Mpfit] {
            let mut routine = GaussFitRoutine::with_optimizer_kind(RoutineKind::GaussMatrix, kind).unwrap();
            routine.initialize(&model, &elements(), EnergyRange::new(100, 1200));
            let counts = routine.fit_spectra(&model, &synthetic(truth()), &elements());
            assert!((counts["Fe"] - 5000.0).abs() < 0.5, "{:?} Fe {}", kind, counts["Fe"]);
            assert!((counts["Zn"] - 1200.0).abs() < 0.5, "{:?} Zn {}", kind, counts["Zn"]);
            assert!(counts[NUM_ITR] >= 1.0);
        }
    }

    #[test]
    fn test_tails_absorbs_tail_shape() {
        let mut shaped = truth();
        shaped.set_value(F_TAIL, 0.1);
        let spectrum = synthetic(shaped);

        let model = SpectraModel::default();
        let mut routine = GaussFitRoutine::tails(Arc::new(LmfitOptimizer::default()));
        routine.initialize(&model, &elements(), EnergyRange::new(100, 1200));
        let counts = routine.fit_spectra(&model, &spectrum, &elements());
        assert_eq!(routine.kind(), RoutineKind::GaussTails);
        assert!(counts.values().all(|v| v.is_finite() && *v >= 0.0));
        assert!(counts["Fe"] > 4000.0 && counts["Fe"] < 6500.0, "Fe {}", counts["Fe"]);
    }

    #[test]
    fn test_iteration_cap_returns_best_effort_counts() {
        let mut shaped = truth();
        shaped.set_value(F_TAIL, 0.2);
        let spectrum = synthetic(shaped);
        let model = SpectraModel::default();
        let options = OptimizerOptions {
            max_iter: 1,
            ..OptimizerOptions::default()
        };

        for kind in [OptimizerKind::Lmfit, OptimizerKind::Mpfit] {
            let mut routine = GaussFitRoutine::tails(create_optimizer(kind, options.clone()));
            routine.initialize(&model, &elements(), EnergyRange::new(100, 1200));
            let counts = routine.fit_spectra(&model, &spectrum, &elements());
            assert_eq!(counts[NUM_ITR], 1.0, "{kind:?}");
            assert!(counts.values().all(|v| v.is_finite() && *v >= 0.0), "{kind:?} {counts:?}");
            assert!(counts["Fe"] > 0.0 && counts["Zn"] > 0.0, "{kind:?} {counts:?}");
        }
    }

    #[test]
    fn test_zero_spectrum() {
        let model = SpectraModel::default();
        let mut routine = GaussFitRoutine::with_optimizer_kind(RoutineKind::GaussMatrix, OptimizerKind::Lmfit).unwrap();
        routine.initialize(&model, &elements(), EnergyRange::new(100, 1200));
        let counts = routine.fit_spectra(&model, &Spectrum::zeros(2048), &elements());
        assert_eq!(counts["Fe"], 0.0);
        assert_eq!(counts["Zn"], 0.0);
    }

    #[test]
    fn test_rejects_linear_kinds() {
        assert!(GaussFitRoutine::with_optimizer_kind(RoutineKind::Svd, OptimizerKind::Lmfit).is_none());
    }

    #[test]
    fn test_fit_parameters_calibrates_offset() {
        let mut shifted = truth();
        shifted.set_value(ENERGY_OFFSET, 0.01);
        let spectrum = synthetic(shifted);
        let model = SpectraModel::default();
        let fitted = fit_parameters(
            &model,
            &spectrum,
            &elements(),
            EnergyRange::new(100, 1200),
            FitParamsPreset::BatchFitNoTails,
            &LmfitOptimizer::default(),
        );
        assert!((fitted.value(ENERGY_OFFSET) - 0.01).abs() < 1e-4);
    }
}
