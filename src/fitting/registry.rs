//! Routine registry for the routines configured on a job.

use super::gauss::GaussFitRoutine;
use super::nnls::NnlsFitRoutine;
use super::optimizer::{create_optimizer, OptimizerKind, OptimizerOptions};
use super::roi::RoiFitRoutine;
use super::svd::SvdFitRoutine;
use super::traits::{FitCounts, FitRoutine, RoutineKind};
use crate::data::{EnergyRange, FitElements, Spectrum};
use crate::model::SpectraModel;
use std::collections::BTreeMap;
use tracing::debug;

/// Build a fresh, uninitialized routine of `kind`.
pub fn create_routine(kind: RoutineKind, optimizer: OptimizerKind) -> Box<dyn FitRoutine> {
    match kind {
        RoutineKind::Roi => Box::new(RoiFitRoutine::default()),
        RoutineKind::Svd => Box::new(SvdFitRoutine::default()),
        RoutineKind::Nnls => Box::new(NnlsFitRoutine::default()),
        RoutineKind::GaussMatrix => Box::new(GaussFitRoutine::matrix(create_optimizer(
            optimizer,
            OptimizerOptions::default(),
        ))),
        RoutineKind::GaussTails => Box::new(GaussFitRoutine::tails(create_optimizer(
            optimizer,
            OptimizerOptions::default(),
        ))),
    }
}

/// Registry of fit routines, one per kind.
///
/// Mutated only while initializing; afterwards it is shared read-only across
/// the pixel workers.
pub struct RoutineRegistry {
    routines: BTreeMap<RoutineKind, Box<dyn FitRoutine>>,
}

impl RoutineRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            routines: BTreeMap::new(),
        }
    }

    /// Create a registry holding one routine per entry of `kinds`.
    pub fn with_kinds(kinds: &[RoutineKind], optimizer: OptimizerKind) -> Self {
        let mut registry = Self::new();
        for &kind in kinds {
            registry.register_boxed(create_routine(kind, optimizer));
        }
        registry
    }

    /// Register a routine, replacing any routine of the same kind.
    pub fn register<R: FitRoutine + 'static>(&mut self, routine: R) {
        self.routines.insert(routine.kind(), Box::new(routine));
    }

    pub fn register_boxed(&mut self, routine: Box<dyn FitRoutine>) {
        self.routines.insert(routine.kind(), routine);
    }

    /// Get a routine by kind.
    pub fn get(&self, kind: RoutineKind) -> Option<&dyn FitRoutine> {
        self.routines.get(&kind).map(|r| r.as_ref())
    }

    /// Check if a routine is registered.
    pub fn contains(&self, kind: RoutineKind) -> bool {
        self.routines.contains_key(&kind)
    }

    /// Registered kinds in a fixed order.
    pub fn kinds(&self) -> Vec<RoutineKind> {
        self.routines.keys().copied().collect()
    }

    pub fn remove(&mut self, kind: RoutineKind) -> Option<Box<dyn FitRoutine>> {
        self.routines.remove(&kind)
    }

    pub fn clear(&mut self) {
        self.routines.clear();
    }

    pub fn len(&self) -> usize {
        self.routines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routines.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn FitRoutine> {
        self.routines.values().map(|r| r.as_ref())
    }

    /// Initialize every routine for one file and detector.
    pub fn initialize_all(&mut self, model: &SpectraModel, elements: &FitElements, range: EnergyRange) {
        for routine in self.routines.values_mut() {
            debug!(routine = routine.name(), "initializing");
            routine.initialize(model, elements, range);
        }
    }

    /// Fit one spectrum with every routine.
    pub fn fit_all(
        &self,
        model: &SpectraModel,
        spectrum: &Spectrum,
        elements: &FitElements,
    ) -> Vec<(RoutineKind, FitCounts)> {
        self.routines
            .iter()
            .map(|(kind, routine)| (*kind, routine.fit_spectra(model, spectrum, elements)))
            .collect()
    }
}

impl Default for RoutineRegistry {
    fn default() -> Self {
        Self::new()
    }
}
