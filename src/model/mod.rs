//! Spectral model: fit parameters, peak shapes and synthetic spectra.

pub mod params;
pub mod peak;
pub mod spectra_model;

pub use params::{
    BoundType, FitParam, FitParameters, FitParamsPreset, ENERGY_OFFSET, ENERGY_QUADRATIC,
    ENERGY_SLOPE, FWHM_FANOPRIME, FWHM_OFFSET, F_STEP, F_TAIL, GAMMA, SHAPE_PARAMS,
};
pub use peak::{gauss_peak, gauss_step, gauss_tail};
pub use spectra_model::{accumulate_element, evaluate, PeakShape, SpectraModel};
