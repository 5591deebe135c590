//! XRF Maps - per-pixel X-ray fluorescence spectrum fitting.
//!
//! This crate turns raster scans of fluorescence spectra into per-element
//! count maps:
//!
//! - Element line tables, compound parsing and fit element sets
//! - A Gaussian peak model with step, tail and energy calibration
//! - Fit routines: ROI sums, SVD and NNLS matrix fits, and optimizer-driven
//!   Gaussian fits (Levenberg-Marquardt with or without parameter scaling)
//! - Whole-file fitting on a rayon pool and streaming fitting on tokio
//!   workers, with detector averaging, calibration and quantification
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │   SpectraSource  →  MapWriter       │
//! │   (pixel spectra)   (fitted maps)   │
//! └─────────────────────────────────────┘
//!                   │
//!                   ▼
//! ┌─────────────────────────────────────┐
//! │            Job Runtime              │
//! │  ┌───────────┐  ┌───────────────┐  │
//! │  │ Executor  │  │ Routine       │  │
//! │  │ (rayon)   │  │ Registry      │  │
//! │  └───────────┘  └───────────────┘  │
//! │  ┌───────────┐  ┌───────────────┐  │
//! │  │  Regroup  │  │    Tokio      │  │
//! │  │   Pool    │  │   Workers     │  │
//! │  └───────────┘  └───────────────┘  │
//! └─────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::{Arc, Mutex};
//! use xrfmaps::{
//!     run_job, AnalysisJob, ElementRegistry, ElementTables, InMemorySource, InMemoryWriter,
//!     JobConfig, MapWriter, RoutineKind, SpectraSource,
//! };
//!
//! let registry = Arc::new(ElementRegistry::load(ElementTables::reference_k_lines()).unwrap());
//! let config = JobConfig {
//!     routines: vec![RoutineKind::Roi, RoutineKind::Nnls],
//!     elements: vec!["Fe".into(), "Cu".into()],
//!     ..JobConfig::default()
//! };
//! let mut job = AnalysisJob::new(config, registry);
//!
//! let source: Arc<dyn SpectraSource> = Arc::new(InMemorySource::new());
//! let writer: Arc<Mutex<dyn MapWriter>> = Arc::new(Mutex::new(InMemoryWriter::new()));
//! let summary = run_job(&mut job, source, writer).unwrap();
//! println!("fitted {} pixels", summary.pixels);
//! ```

pub mod data;
pub mod error;
pub mod fitting;
pub mod model;
pub mod runtime;

// Re-export commonly used items
pub use data::{
    ElementRegistry, ElementTables, EnergyRange, FitElement, FitElements, FitMaps,
    QuantificationFactors, QuantificationStandard, SpectraVolume, Spectrum, StreamBlock,
};
pub use error::{JobError, RegistryError, SourceError, StreamBlockError, WriterError};
pub use fitting::{FitCounts, FitRoutine, OptimizerKind, RoutineKind, RoutineRegistry};
pub use model::{FitParameters, FitParamsPreset, SpectraModel};
pub use runtime::{
    run_job, AnalysisJob, DetectorRange, Executor, InMemorySource, InMemoryWriter, JobConfig,
    MapWriter, RunSummary, SpectraSource,
};

/// Install a `tracing` subscriber filtered by `RUST_LOG`, defaulting to `info`.
///
/// Does nothing when a global subscriber is already set.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
