//! Error types for registry loading, dataset I/O and job setup.
//!
//! Only conditions that stop a job from starting are errors. Per-pixel and
//! per-element problems degrade to zero values and a `tracing` warning.

use crate::data::BlockState;
use std::path::PathBuf;
use thiserror::Error;

/// Failures while loading the element tables.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RegistryError {
    #[error("scattering energy grid is empty")]
    EmptyEnergyGrid,
    #[error("scattering energy grid is not strictly ascending at index {index}")]
    NonAscendingEnergyGrid { index: usize },
    #[error("element {element}: expected {expected} scattering factors, got {actual}")]
    ScatteringLengthMismatch {
        element: String,
        expected: usize,
        actual: usize,
    },
    #[error("atomic number {0} is outside the supported range")]
    UnknownAtomicNumber(u32),
}

/// Failures while assembling a stream block.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamBlockError {
    #[error("stream block ({row}, {col}) has no elements to fit")]
    MissingElements { row: usize, col: usize },
    #[error("stream block ({row}, {col}) is not complete")]
    Incomplete { row: usize, col: usize },
    #[error("stream block ({row}, {col}) cannot move from {from:?} to {to:?}")]
    InvalidTransition {
        row: usize,
        col: usize,
        from: BlockState,
        to: BlockState,
    },
}

/// Failures reported by a dataset reader.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("dataset file not found: {0}")]
    FileNotFound(String),
    #[error("detector {detector} not present in {file}")]
    DetectorNotFound { file: String, detector: usize },
    #[error("failed to read {file}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures reported by an output sink.
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("failed to write maps for {file}: {reason}")]
    Write { file: String, reason: String },
}

/// Errors that prevent an analysis job from running.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("no fit routines selected")]
    NoFitRoutines,
    #[error("no dataset files resolved")]
    NoDatasetFiles,
    #[error("invalid dataset directory: {}", .0.display())]
    InvalidDirectory(PathBuf),
    #[error("invalid detector range: {0}")]
    InvalidDetectorRange(String),
    #[error("unknown fit routine: {0}")]
    UnknownRoutine(String),
    #[error("unknown optimizer: {0}")]
    UnknownOptimizer(String),
    #[error("no elements to fit")]
    NoElements,
    #[error("analysis job used before init")]
    NotInitialized,
    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    StreamBlock(#[from] StreamBlockError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Writer(#[from] WriterError),
}

pub type Result<T> = std::result::Result<T, JobError>;
