//! Fit parameters, their bounds, and the batch-fit presets.

use crate::data::FitElements;
use std::collections::BTreeMap;
use std::str::FromStr;

pub const ENERGY_OFFSET: &str = "ENERGY_OFFSET";
pub const ENERGY_SLOPE: &str = "ENERGY_SLOPE";
pub const ENERGY_QUADRATIC: &str = "ENERGY_QUADRATIC";
pub const FWHM_OFFSET: &str = "FWHM_OFFSET";
pub const FWHM_FANOPRIME: &str = "FWHM_FANOPRIME";
pub const F_STEP: &str = "F_STEP";
pub const F_TAIL: &str = "F_TAIL";
pub const GAMMA: &str = "GAMMA";

/// Every non-amplitude parameter, in a fixed order.
pub const SHAPE_PARAMS: [&str; 8] = [
    ENERGY_OFFSET,
    ENERGY_SLOPE,
    ENERGY_QUADRATIC,
    FWHM_OFFSET,
    FWHM_FANOPRIME,
    F_STEP,
    F_TAIL,
    GAMMA,
];

/// How the optimizer may move a parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoundType {
    Fixed,
    Fit,
    LimitedLo,
    LimitedHi,
    LimitedLoHi,
}

/// One named scalar parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct FitParam {
    pub name: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub bound_type: BoundType,
}

impl FitParam {
    pub fn fixed(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            bound_type: BoundType::Fixed,
        }
    }

    /// Whether the optimizer may change this parameter.
    pub fn is_free(&self) -> bool {
        self.bound_type != BoundType::Fixed
    }

    /// Project `value` onto the parameter's bounds.
    pub fn clamp(&self, value: f64) -> f64 {
        match self.bound_type {
            BoundType::Fixed => self.value,
            BoundType::Fit => value,
            BoundType::LimitedLo => value.max(self.min),
            BoundType::LimitedHi => value.min(self.max),
            BoundType::LimitedLoHi => value.clamp(self.min, self.max),
        }
    }

    fn limit(&mut self, min: f64, max: f64) {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        self.min = min;
        self.max = max;
        self.bound_type = BoundType::LimitedLoHi;
        self.value = self.value.clamp(min, max);
    }
}

/// Parameter sets used when calibrating defaults on integrated spectra.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FitParamsPreset {
    /// Amplitudes only.
    MatrixBatchFit,
    /// Amplitudes, energy calibration and peak width.
    BatchFitNoTails,
    /// As above plus step and tail.
    BatchFitWithTails,
    /// Amplitudes and the full energy calibration.
    BatchFitWithFreeEnergy,
}

impl FromStr for FitParamsPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(Self::MatrixBatchFit),
            "2" => Ok(Self::BatchFitNoTails),
            "3" => Ok(Self::BatchFitWithTails),
            "4" => Ok(Self::BatchFitWithFreeEnergy),
            other => Err(other.to_string()),
        }
    }
}

/// Named parameter table. Amplitude parameters are keyed by element name.
#[derive(Clone, Debug, PartialEq)]
pub struct FitParameters {
    params: BTreeMap<String, FitParam>,
}

impl Default for FitParameters {
    fn default() -> Self {
        let mut params = BTreeMap::new();
        for (name, value) in [
            (ENERGY_OFFSET, 0.0),
            (ENERGY_SLOPE, 0.01),
            (ENERGY_QUADRATIC, 0.0),
            (FWHM_OFFSET, 0.12),
            (FWHM_FANOPRIME, 0.114),
            (F_STEP, 0.0),
            (F_TAIL, 0.0),
            (GAMMA, 2.5),
        ] {
            params.insert(name.to_string(), FitParam::fixed(name, value));
        }
        Self { params }
    }
}

impl FitParameters {
    /// Default calibration: 10 eV per channel starting at 0 keV.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&FitParam> {
        self.params.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FitParam> {
        self.params.get_mut(name)
    }

    /// Parameter value, 0 when absent.
    pub fn value(&self, name: &str) -> f64 {
        self.params.get(name).map(|p| p.value).unwrap_or(0.0)
    }

    /// Set a value, inserting a fixed parameter if needed.
    pub fn set_value(&mut self, name: &str, value: f64) {
        self.params
            .entry(name.to_string())
            .and_modify(|p| p.value = value)
            .or_insert_with(|| FitParam::fixed(name, value));
    }

    pub fn insert(&mut self, param: FitParam) {
        self.params.insert(param.name.clone(), param);
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FitParam> {
        self.params.values()
    }

    /// Names of the parameters the optimizer may move, in name order.
    pub fn free_names(&self) -> Vec<String> {
        self.params
            .values()
            .filter(|p| p.is_free())
            .map(|p| p.name.clone())
            .collect()
    }

    /// Add a non-negative amplitude per element, keeping existing values.
    pub fn add_element_amplitudes(&mut self, elements: &FitElements, initial: f64) {
        for element in elements.iter() {
            self.params
                .entry(element.name.clone())
                .or_insert_with(|| FitParam {
                    name: element.name.clone(),
                    value: initial,
                    min: 0.0,
                    max: f64::INFINITY,
                    bound_type: BoundType::LimitedLo,
                });
        }
    }

    /// Copy every calibration and shape value from `other`.
    pub fn update_shape_from(&mut self, other: &FitParameters) {
        for name in SHAPE_PARAMS {
            if let Some(param) = other.get(name) {
                self.set_value(name, param.value);
            }
        }
    }

    /// Lock everything, then free what `preset` needs for `elements`.
    pub fn apply_preset(&mut self, preset: FitParamsPreset, elements: &FitElements) {
        for param in self.params.values_mut() {
            param.bound_type = BoundType::Fixed;
        }
        self.add_element_amplitudes(elements, 1.0);
        for element in elements.iter() {
            if let Some(p) = self.params.get_mut(&element.name) {
                p.min = 0.0;
                p.max = f64::INFINITY;
                p.bound_type = BoundType::LimitedLo;
            }
        }

        let free: &[&str] = match preset {
            FitParamsPreset::MatrixBatchFit => &[],
            FitParamsPreset::BatchFitNoTails => {
                &[ENERGY_OFFSET, ENERGY_SLOPE, FWHM_OFFSET, FWHM_FANOPRIME]
            }
            FitParamsPreset::BatchFitWithTails => &[
                ENERGY_OFFSET,
                ENERGY_SLOPE,
                FWHM_OFFSET,
                FWHM_FANOPRIME,
                F_STEP,
                F_TAIL,
                GAMMA,
            ],
            FitParamsPreset::BatchFitWithFreeEnergy => {
                &[ENERGY_OFFSET, ENERGY_SLOPE, ENERGY_QUADRATIC]
            }
        };

        for &name in free {
            let Some(p) = self.params.get_mut(name) else {
                continue;
            };
            let v = p.value;
            match name {
                ENERGY_OFFSET => p.limit(v - 0.2, v + 0.2),
                ENERGY_SLOPE => p.limit(v * 0.9, v * 1.1),
                ENERGY_QUADRATIC => p.limit(v - 1e-6, v + 1e-6),
                FWHM_OFFSET => p.limit(0.005, 0.5),
                FWHM_FANOPRIME => p.limit(0.0, 1.0),
                F_STEP => p.limit(0.0, 1.0),
                F_TAIL => p.limit(0.0, 1.0),
                GAMMA => p.limit(0.1, 10.0),
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::FitElement;

    fn elements() -> FitElements {
        let mut set = FitElements::new();
        set.insert(FitElement::new("Fe", 26, &[("ka1", 6.404, 1.0)]));
        set.insert(FitElement::new("Cu", 29, &[("ka1", 8.048, 1.0)]));
        set
    }

    #[test]
    fn test_defaults_are_fixed() {
        let params = FitParameters::new();
        assert_eq!(params.len(), SHAPE_PARAMS.len());
        assert!(params.free_names().is_empty());
        assert_eq!(params.value(ENERGY_SLOPE), 0.01);
        assert_eq!(params.value("missing"), 0.0);
    }

    #[test]
    fn test_matrix_preset_frees_amplitudes_only() {
        let mut params = FitParameters::new();
        params.apply_preset(FitParamsPreset::MatrixBatchFit, &elements());
        assert_eq!(params.free_names(), vec!["Cu".to_string(), "Fe".to_string()]);
        assert_eq!(params.get("Fe").unwrap().clamp(-3.0), 0.0);
    }

    #[test]
    fn test_tails_preset() {
        let mut params = FitParameters::new();
        params.apply_preset(FitParamsPreset::BatchFitWithTails, &elements());
        let free = params.free_names();
        assert!(free.contains(&F_TAIL.to_string()));
        assert!(free.contains(&GAMMA.to_string()));
        assert!(!free.contains(&ENERGY_QUADRATIC.to_string()));

        // re-applying a smaller preset locks the extras again
        params.apply_preset(FitParamsPreset::BatchFitWithFreeEnergy, &elements());
        let free = params.free_names();
        assert!(free.contains(&ENERGY_QUADRATIC.to_string()));
        assert!(!free.contains(&F_TAIL.to_string()));
    }

    #[test]
    fn test_clamp() {
        let mut p = FitParam::fixed("x", 1.0);
        assert_eq!(p.clamp(5.0), 1.0);
        p.limit(0.0, 2.0);
        assert_eq!(p.clamp(5.0), 2.0);
        assert_eq!(p.clamp(-1.0), 0.0);
    }

    #[test]
    fn test_preset_parse() {
        assert_eq!("3".parse::<FitParamsPreset>(), Ok(FitParamsPreset::BatchFitWithTails));
        assert!("9".parse::<FitParamsPreset>().is_err());
    }

    #[test]
    fn test_update_shape_keeps_amplitudes() {
        let mut a = FitParameters::new();
        a.add_element_amplitudes(&elements(), 7.0);
        let mut b = FitParameters::new();
        b.set_value(ENERGY_OFFSET, 0.05);
        a.update_shape_from(&b);
        assert_eq!(a.value(ENERGY_OFFSET), 0.05);
        assert_eq!(a.value("Fe"), 7.0);
    }
}
