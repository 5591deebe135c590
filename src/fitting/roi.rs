//! Region-of-interest routine: raw counts summed around each element's
//! strongest line.

use super::traits::{zero_counts, FitCounts, FitRoutine, RoutineKind};
use crate::data::{EnergyRange, FitElement, FitElements, Spectrum};
use crate::model::{PeakShape, SpectraModel};

/// Configuration for ROI summation.
#[derive(Debug, Clone)]
pub struct RoiConfig {
    /// Half window width in units of the line FWHM.
    pub width_multiplier: f64,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            width_multiplier: 1.0,
        }
    }
}

/// Sums the spectrum over a fixed window per element. No iterative solve.
#[derive(Default)]
pub struct RoiFitRoutine {
    config: RoiConfig,
}

impl RoiFitRoutine {
    pub fn new(config: RoiConfig) -> Self {
        Self { config }
    }

    /// Inclusive channel window of `element`'s primary line.
    pub fn window(
        &self,
        shape: &PeakShape,
        element: &FitElement,
        channels: usize,
    ) -> Option<EnergyRange> {
        let line = element.primary_line()?;
        let half = shape.fwhm(line.energy) * self.config.width_multiplier;
        let lo = shape.energy_to_channel(line.energy - half)?;
        let hi = shape.energy_to_channel(line.energy + half)?;
        let last = channels.checked_sub(1)? as f64;
        if hi < 0.0 || lo > last {
            return None;
        }
        Some(EnergyRange::new(
            lo.round().clamp(0.0, last) as usize,
            hi.round().clamp(0.0, last) as usize,
        ))
    }
}

impl FitRoutine for RoiFitRoutine {
    fn kind(&self) -> RoutineKind {
        RoutineKind::Roi
    }

    fn initialize(&mut self, _model: &SpectraModel, _elements: &FitElements, _range: EnergyRange) {}

    fn fit_spectra(
        &self,
        model: &SpectraModel,
        spectrum: &Spectrum,
        elements: &FitElements,
    ) -> FitCounts {
        let shape = model.shape();
        let mut counts = zero_counts(elements);

        for element in elements.iter() {
            let Some(window) = self.window(&shape, element, spectrum.len()) else {
                continue;
            };
            let total: f64 = spectrum.sub_spectrum(window).iter().sum();
            counts.insert(element.name.clone(), total);
        }

        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitting::NUM_ITR;

    fn elements() -> FitElements {
        let mut set = FitElements::new();
        set.insert(FitElement::new("Fe", 26, &[("ka1", 6.404, 0.58), ("kb1", 7.058, 0.13)]));
        set.insert(FitElement::new("Zn", 30, &[("ka1", 8.639, 1.0)]));
        set.insert(FitElement::new("Pa", 91, &[("ka1", 95.0, 1.0)]));
        set
    }

    fn spectrum() -> Spectrum {
        let mut counts = vec![1.0; 1024];
        counts[640] = 100.0;
        counts[864] = 50.0;
        Spectrum::new(counts)
    }

    #[test]
    fn test_roi_sums_window() {
        let routine = RoiFitRoutine::default();
        let model = SpectraModel::default();
        let counts = routine.fit_spectra(&model, &spectrum(), &elements());

        let window = routine
            .window(&model.shape(), elements().get("Fe").unwrap(), 1024)
            .unwrap();
        assert!(window.contains(640));
        assert_eq!(counts["Fe"], 100.0 + (window.count() - 1) as f64);
        assert!(counts["Zn"] > 50.0);
        // line beyond the spectrum
        assert_eq!(counts["Pa"], 0.0);
        assert_eq!(counts[NUM_ITR], 0.0);
    }

    #[test]
    fn test_roi_is_idempotent() {
        let routine = RoiFitRoutine::default();
        let model = SpectraModel::default();
        let input = spectrum();
        let first = routine.fit_spectra(&model, &input, &elements());
        let second = routine.fit_spectra(&model, &input, &elements());
        assert_eq!(first, second);
        assert_eq!(input, spectrum());
    }
}
