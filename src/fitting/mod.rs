//! Fit routines that turn one spectrum into per-element intensities.

pub mod fit_matrix;
pub mod gauss;
pub mod nnls;
pub mod optimizer;
pub mod registry;
pub mod roi;
pub mod svd;
pub mod traits;

pub use fit_matrix::{FitMatrix, MatrixFitBase};
pub use gauss::{fit_parameters, GaussFitRoutine};
pub use nnls::{NnlsConfig, NnlsFitRoutine};
pub use optimizer::{
    create_optimizer, LmfitOptimizer, MpfitOptimizer, Optimizer, OptimizerKind, OptimizerOptions,
    OptimizerOutcome,
};
pub use registry::{create_routine, RoutineRegistry};
pub use roi::{RoiConfig, RoiFitRoutine};
pub use svd::SvdFitRoutine;
pub use traits::{sanitize, zero_counts, FitCounts, FitRoutine, RoutineKind, NUM_ITR};
