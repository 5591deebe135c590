//! Analysis job configuration and validation.

use super::source::SpectraSource;
use crate::data::{
    ElementRegistry, EnergyRange, FitElements, QuantificationFactors, QuantificationStandard,
};
use crate::error::{JobError, Result};
use crate::fitting::{OptimizerKind, RoutineKind, RoutineRegistry};
use crate::model::{FitParameters, FitParamsPreset, SpectraModel};
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

/// Threads kept free for the reader and the main thread.
const RESERVED_THREADS: usize = 2;

/// Worker count used when none is configured.
pub fn default_thread_count() -> usize {
    num_cpus::get().saturating_sub(RESERVED_THREADS).max(1)
}

/// Inclusive detector index range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorRange {
    pub start: usize,
    pub end: usize,
}

impl DetectorRange {
    pub fn new(start: usize, end: usize) -> std::result::Result<Self, JobError> {
        if start > end {
            return Err(JobError::InvalidDetectorRange(format!("{start}:{end}")));
        }
        Ok(Self { start, end })
    }

    pub fn single(detector: usize) -> Self {
        Self {
            start: detector,
            end: detector,
        }
    }

    pub fn iter(&self) -> RangeInclusive<usize> {
        self.start..=self.end
    }

    /// Number of detectors; never 0.
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }
}

impl Default for DetectorRange {
    fn default() -> Self {
        Self { start: 0, end: 3 }
    }
}

impl FromStr for DetectorRange {
    type Err = JobError;

    /// `"a:b"` or a single index `"a"`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let invalid = || JobError::InvalidDetectorRange(s.to_string());
        let parse = |part: &str| part.trim().parse::<usize>().map_err(|_| invalid());
        match s.split_once(':') {
            Some((start, end)) => Self::new(parse(start)?, parse(end)?),
            None => Ok(Self::single(parse(s)?)),
        }
    }
}

/// Configuration for an analysis job.
#[derive(Clone, Debug)]
pub struct JobConfig {
    /// Dataset directory; checked to exist when set.
    pub dataset_dir: Option<PathBuf>,
    /// Files to process. Empty means every file the source reports.
    pub dataset_files: Vec<String>,
    pub detectors: DetectorRange,
    pub routines: Vec<RoutineKind>,
    pub optimizer: OptimizerKind,
    /// Element names to fit, e.g. `Fe` or `Pb_L`.
    pub elements: Vec<String>,
    /// Starting fit parameters.
    pub fit_params: FitParameters,
    pub quantification_standard: Option<QuantificationStandard>,
    pub threads: usize,
    /// Feed pixels through a bounded queue while the file is read.
    pub stream: bool,
    /// Sum detectors before fitting.
    pub quick_and_dirty: bool,
    /// Also write detector-averaged maps.
    pub generate_average: bool,
    /// Calibrate `fit_params` on the largest files before the run.
    pub optimize_fit_params: Option<FitParamsPreset>,
    /// Number of largest files integrated for calibration.
    pub optimize_file_count: usize,
    /// Stream blocks buffered between reader and workers.
    pub queue_capacity: usize,
    /// Fitted energy window (keV).
    pub energy_min_kev: f64,
    pub energy_max_kev: f64,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            dataset_dir: None,
            dataset_files: Vec::new(),
            detectors: DetectorRange::default(),
            routines: Vec::new(),
            optimizer: OptimizerKind::default(),
            elements: Vec::new(),
            fit_params: FitParameters::default(),
            quantification_standard: None,
            threads: default_thread_count(),
            stream: false,
            quick_and_dirty: false,
            generate_average: false,
            optimize_fit_params: None,
            optimize_file_count: 9,
            queue_capacity: 1024,
            energy_min_kev: 1.0,
            energy_max_kev: 12.0,
        }
    }
}

impl JobConfig {
    /// Parse routine names such as `roi`, `nnls` or `--tails`.
    pub fn with_routine_names<S: AsRef<str>>(mut self, names: &[S]) -> Result<Self> {
        for name in names {
            let kind = name
                .as_ref()
                .parse::<RoutineKind>()
                .map_err(JobError::UnknownRoutine)?;
            if !self.routines.contains(&kind) {
                self.routines.push(kind);
            }
        }
        Ok(self)
    }

    pub fn with_optimizer_name(mut self, name: &str) -> Result<Self> {
        self.optimizer = name.parse().map_err(JobError::UnknownOptimizer)?;
        Ok(self)
    }
}

/// A configured run over a dataset.
pub struct AnalysisJob {
    config: JobConfig,
    registry: Arc<ElementRegistry>,
    elements: Option<Arc<FitElements>>,
    model: SpectraModel,
    files: Vec<String>,
    quantification: QuantificationFactors,
}

impl AnalysisJob {
    pub fn new(config: JobConfig, registry: Arc<ElementRegistry>) -> Self {
        let model = SpectraModel::new(config.fit_params.clone());
        Self {
            config,
            registry,
            elements: None,
            model,
            files: Vec::new(),
            quantification: QuantificationFactors::default(),
        }
    }

    /// Validate the configuration and resolve files and elements.
    pub fn init(&mut self, source: &dyn SpectraSource) -> Result<()> {
        if self.config.routines.is_empty() && self.config.optimize_fit_params.is_none() {
            return Err(JobError::NoFitRoutines);
        }
        if let Some(dir) = &self.config.dataset_dir {
            if !dir.is_dir() {
                return Err(JobError::InvalidDirectory(dir.clone()));
            }
        }
        let detectors = self.config.detectors;
        DetectorRange::new(detectors.start, detectors.end)?;

        self.files = if self.config.dataset_files.is_empty() {
            source.dataset_files()
        } else {
            self.config.dataset_files.clone()
        };
        if self.files.is_empty() {
            return Err(JobError::NoDatasetFiles);
        }

        let elements = FitElements::from_names(&self.registry, &self.config.elements);
        if elements.is_empty() {
            return Err(JobError::NoElements);
        }
        self.elements = Some(Arc::new(elements));
        self.model = SpectraModel::new(self.config.fit_params.clone());

        info!(
            files = self.files.len(),
            detectors = detectors.len(),
            routines = self.config.routines.len(),
            threads = self.config.threads,
            "analysis job initialized"
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.elements.is_some()
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ElementRegistry> {
        &self.registry
    }

    pub fn files(&self) -> &[String] {
        &self.files
    }

    pub fn elements(&self) -> Result<&Arc<FitElements>> {
        self.elements.as_ref().ok_or(JobError::NotInitialized)
    }

    pub fn model(&self) -> &SpectraModel {
        &self.model
    }

    /// Replace the parameters every routine starts from.
    pub fn set_fit_params(&mut self, params: FitParameters) {
        self.model.set_params(params);
    }

    pub fn quantification(&self) -> &QuantificationFactors {
        &self.quantification
    }

    pub fn set_quantification(&mut self, factors: QuantificationFactors) {
        self.quantification = factors;
    }

    /// Whether the job only calibrates fit parameters.
    pub fn is_calibration_only(&self) -> bool {
        self.config.routines.is_empty() && self.config.optimize_fit_params.is_some()
    }

    pub fn threads(&self) -> usize {
        self.config.threads.max(1)
    }

    /// Fitted channel window for spectra of `channels` channels.
    pub fn energy_range(&self, channels: usize) -> EnergyRange {
        self.model
            .energy_range(self.config.energy_min_kev, self.config.energy_max_kev, channels)
    }

    /// Fresh routines for one file and detector, initialized for `channels`.
    pub fn routine_registry(&self, channels: usize) -> Result<RoutineRegistry> {
        let elements = self.elements()?;
        let mut registry = RoutineRegistry::with_kinds(&self.config.routines, self.config.optimizer);
        registry.initialize_all(&self.model, elements, self.energy_range(channels));
        Ok(registry)
    }
}
