//! Fit routine trait definitions.

use crate::data::{EnergyRange, FitElements, Spectrum};
use crate::model::SpectraModel;
use std::collections::HashMap;
use std::str::FromStr;

/// Key of the iteration count entry in every [`FitCounts`].
pub const NUM_ITR: &str = "Num_Iter";

/// Fitted intensity per element name, plus the [`NUM_ITR`] entry.
pub type FitCounts = HashMap<String, f64>;

/// Identifier for a fit routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoutineKind {
    /// Region-of-interest summation.
    Roi,
    /// Linear decomposition against the fit matrix by SVD.
    Svd,
    /// Non-negative least squares against the fit matrix.
    Nnls,
    /// Nonlinear fit with shape parameters locked.
    GaussMatrix,
    /// Nonlinear fit with width and tail parameters free.
    GaussTails,
}

impl RoutineKind {
    pub const ALL: [RoutineKind; 5] = [
        RoutineKind::Roi,
        RoutineKind::Svd,
        RoutineKind::Nnls,
        RoutineKind::GaussMatrix,
        RoutineKind::GaussTails,
    ];

    /// Get the string name of this routine.
    pub fn name(&self) -> &'static str {
        match self {
            RoutineKind::Roi => "roi",
            RoutineKind::Svd => "svd",
            RoutineKind::Nnls => "nnls",
            RoutineKind::GaussMatrix => "matrix",
            RoutineKind::GaussTails => "tails",
        }
    }
}

impl FromStr for RoutineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches("--").to_ascii_lowercase().as_str() {
            "roi" => Ok(RoutineKind::Roi),
            "svd" | "roi_plus" => Ok(RoutineKind::Svd),
            "nnls" => Ok(RoutineKind::Nnls),
            "matrix" | "gauss_matrix" => Ok(RoutineKind::GaussMatrix),
            "tails" | "gauss_tails" => Ok(RoutineKind::GaussTails),
            other => Err(other.to_string()),
        }
    }
}

/// Fitted counts with every element of `elements` at zero.
pub fn zero_counts(elements: &FitElements) -> FitCounts {
    let mut counts: FitCounts = elements.names().map(|n| (n.to_string(), 0.0)).collect();
    counts.insert(NUM_ITR.to_string(), 0.0);
    counts
}

/// Replace non-finite and negative intensities by 0.
pub fn sanitize(counts: &mut FitCounts) {
    for value in counts.values_mut() {
        if !value.is_finite() || *value < 0.0 {
            *value = 0.0;
        }
    }
}

/// Trait for fitting algorithms.
///
/// `initialize` runs once per file and detector on a single thread;
/// `fit_spectra` then runs concurrently for every pixel and must leave both
/// the routine and its inputs untouched.
pub trait FitRoutine: Send + Sync {
    /// Get the routine identifier.
    fn kind(&self) -> RoutineKind;

    /// Prepare per-run state such as the fit matrix.
    fn initialize(&mut self, model: &SpectraModel, elements: &FitElements, range: EnergyRange);

    /// Fit one spectrum. Every element of `elements` gets a finite,
    /// non-negative value; [`NUM_ITR`] holds the iterations used.
    fn fit_spectra(
        &self,
        model: &SpectraModel,
        spectrum: &Spectrum,
        elements: &FitElements,
    ) -> FitCounts;

    /// Get the routine name.
    fn name(&self) -> &'static str {
        self.kind().name()
    }
}
