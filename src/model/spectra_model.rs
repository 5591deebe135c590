//! Synthetic fluorescence spectra from fit parameters.

use super::params::{
    FitParameters, ENERGY_OFFSET, ENERGY_QUADRATIC, ENERGY_SLOPE, FWHM_FANOPRIME, FWHM_OFFSET,
    F_STEP, F_TAIL, GAMMA,
};
use super::peak::{gauss_peak, gauss_step, gauss_tail};
use crate::data::constants::{SIGMA_TO_FWHM, SI_PAIR_ENERGY};
use crate::data::{EnergyRange, FitElement, FitElements, Spectrum};

/// The calibration and shape values that position and size peaks.
///
/// Two equal shapes over the same channel window produce identical model
/// spectra, which is what fit matrices are keyed on.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PeakShape {
    pub energy_offset: f64,
    pub energy_slope: f64,
    pub energy_quadratic: f64,
    pub fwhm_offset: f64,
    pub fwhm_fanoprime: f64,
    pub f_step: f64,
    pub f_tail: f64,
    pub gamma: f64,
}

impl PeakShape {
    pub fn from_params(params: &FitParameters) -> Self {
        Self {
            energy_offset: params.value(ENERGY_OFFSET),
            energy_slope: params.value(ENERGY_SLOPE),
            energy_quadratic: params.value(ENERGY_QUADRATIC),
            fwhm_offset: params.value(FWHM_OFFSET),
            fwhm_fanoprime: params.value(FWHM_FANOPRIME),
            f_step: params.value(F_STEP),
            f_tail: params.value(F_TAIL),
            gamma: params.value(GAMMA),
        }
    }

    /// Energy (keV) at a channel.
    #[inline]
    pub fn channel_energy(&self, channel: f64) -> f64 {
        self.energy_offset + self.energy_slope * channel + self.energy_quadratic * channel * channel
    }

    /// Energy width of a channel.
    #[inline]
    pub fn channel_width(&self, channel: f64) -> f64 {
        (self.energy_slope + 2.0 * self.energy_quadratic * channel).abs()
    }

    /// Fractional channel at `energy`; `None` for a degenerate calibration.
    pub fn energy_to_channel(&self, energy: f64) -> Option<f64> {
        let (a, b, c) = (
            self.energy_quadratic,
            self.energy_slope,
            self.energy_offset - energy,
        );
        if a.abs() < f64::EPSILON {
            return (b != 0.0).then(|| -c / b);
        }
        let disc = b * b - 4.0 * a * c;
        if disc < 0.0 {
            return None;
        }
        let root = disc.sqrt();
        let r1 = (-b + root) / (2.0 * a);
        let r2 = (-b - root) / (2.0 * a);
        Some(if r1 >= 0.0 { r1 } else { r2 })
    }

    /// Gaussian σ (keV) of a line at `energy`.
    #[inline]
    pub fn sigma(&self, energy: f64) -> f64 {
        let noise = self.fwhm_offset / SIGMA_TO_FWHM;
        (noise * noise + energy * SI_PAIR_ENERGY * self.fwhm_fanoprime)
            .max(0.0)
            .sqrt()
    }

    /// Peak FWHM (keV) of a line at `energy`.
    pub fn fwhm(&self, energy: f64) -> f64 {
        self.sigma(energy) * SIGMA_TO_FWHM
    }

    /// Channel window covering `[min_kev, max_kev]` in a spectrum of `channels`.
    pub fn energy_range(&self, min_kev: f64, max_kev: f64, channels: usize) -> EnergyRange {
        let last = channels.saturating_sub(1);
        let to_index = |energy: f64, round: fn(f64) -> f64| {
            self.energy_to_channel(energy)
                .map(|c| round(c).clamp(0.0, last as f64) as usize)
        };
        let min = to_index(min_kev, f64::floor).unwrap_or(0);
        let max = to_index(max_kev, f64::ceil).unwrap_or(last);
        EnergyRange::new(min, max)
    }
}

/// Add `amplitude` worth of `element` into `out`, which covers `range`.
pub fn accumulate_element(
    shape: &PeakShape,
    element: &FitElement,
    amplitude: f64,
    range: EnergyRange,
    out: &mut [f64],
) {
    if amplitude == 0.0 {
        return;
    }
    for line in &element.lines {
        let gain = amplitude * line.ratio;
        let sigma = shape.sigma(line.energy);
        for (i, value) in out.iter_mut().enumerate().take(range.count()) {
            let channel = (range.min + i) as f64;
            let delta = shape.channel_energy(channel) - line.energy;
            let mut counts = gauss_peak(gain, sigma, delta);
            if shape.f_step > 0.0 {
                counts += shape.f_step * gauss_step(gain, sigma, delta, line.energy);
            }
            if shape.f_tail > 0.0 {
                counts += shape.f_tail * gauss_tail(gain, sigma, delta, shape.gamma);
            }
            *value += counts * shape.channel_width(channel);
        }
    }
}

/// Model counts over `range` for all `elements`, amplitudes taken from `params`.
pub fn evaluate(params: &FitParameters, elements: &FitElements, range: EnergyRange) -> Vec<f64> {
    let shape = PeakShape::from_params(params);
    let mut out = vec![0.0; range.count()];
    for element in elements.iter() {
        accumulate_element(&shape, element, params.value(&element.name), range, &mut out);
    }
    out
}

/// Spectral model: a parameter set plus the operations that turn it into
/// per-element spectra.
#[derive(Clone, Debug, Default)]
pub struct SpectraModel {
    params: FitParameters,
}

impl SpectraModel {
    pub fn new(params: FitParameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &FitParameters {
        &self.params
    }

    pub fn params_mut(&mut self) -> &mut FitParameters {
        &mut self.params
    }

    pub fn set_params(&mut self, params: FitParameters) {
        self.params = params;
    }

    pub fn shape(&self) -> PeakShape {
        PeakShape::from_params(&self.params)
    }

    /// See [`PeakShape::energy_range`].
    pub fn energy_range(&self, min_kev: f64, max_kev: f64, channels: usize) -> EnergyRange {
        self.shape().energy_range(min_kev, max_kev, channels)
    }

    /// Unit-amplitude spectrum of one element over `range`.
    pub fn generate(&self, element: &FitElement, range: EnergyRange) -> Spectrum {
        self.generate_with_amplitude(element, range, 1.0)
    }

    pub fn generate_with_amplitude(
        &self,
        element: &FitElement,
        range: EnergyRange,
        amplitude: f64,
    ) -> Spectrum {
        let mut out = vec![0.0; range.count()];
        accumulate_element(&self.shape(), element, amplitude, range, &mut out);
        Spectrum::new(out)
    }

    /// Sum of every element at its current amplitude.
    pub fn model_spectrum(&self, elements: &FitElements, range: EnergyRange) -> Spectrum {
        Spectrum::new(evaluate(&self.params, elements, range))
    }
}
