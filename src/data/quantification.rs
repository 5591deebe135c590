//! Conversion of fitted counts into concentrations using a measured standard.

use crate::fitting::{FitCounts, RoutineKind};
use std::collections::BTreeMap;
use tracing::warn;

/// A reference sample with known areal concentrations.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantificationStandard {
    /// Dataset file holding the standard's spectra.
    pub file: String,
    /// Element name to concentration (µg/cm²).
    pub concentrations: BTreeMap<String, f64>,
}

impl QuantificationStandard {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            concentrations: BTreeMap::new(),
        }
    }

    pub fn with_concentration(mut self, element: &str, concentration: f64) -> Self {
        self.concentrations.insert(element.to_string(), concentration);
        self
    }

    pub fn element_names(&self) -> impl Iterator<Item = &str> {
        self.concentrations.keys().map(String::as_str)
    }
}

/// Concentration per count, per routine and element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuantificationFactors {
    factors: BTreeMap<RoutineKind, BTreeMap<String, f64>>,
}

impl QuantificationFactors {
    pub fn insert(&mut self, kind: RoutineKind, element: &str, factor: f64) {
        self.factors
            .entry(kind)
            .or_default()
            .insert(element.to_string(), factor);
    }

    pub fn factor(&self, kind: RoutineKind, element: &str) -> Option<f64> {
        self.factors.get(&kind)?.get(element).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }

    /// Derive factors for one routine from the standard's fitted counts.
    ///
    /// `factor = concentration / counts`; 0 when the standard shows no counts.
    pub fn compute(&mut self, kind: RoutineKind, standard: &QuantificationStandard, counts: &FitCounts) {
        for (element, &concentration) in &standard.concentrations {
            let fitted = counts.get(element).copied().unwrap_or(0.0);
            let factor = if fitted > 0.0 && fitted.is_finite() {
                concentration / fitted
            } else {
                warn!(
                    routine = kind.name(),
                    element = element.as_str(),
                    "standard has no counts for element, factor set to 0"
                );
                0.0
            };
            self.insert(kind, element, factor);
        }
    }
}
