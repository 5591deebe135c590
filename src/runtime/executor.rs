//! Dataset executor: whole-file fitting on a rayon pool and streaming
//! fitting on a tokio runtime.

use super::job::AnalysisJob;
use super::optimize::generate_optimal_params;
use super::quantify::perform_quantification;
use super::regroup::RegroupPool;
use super::source::SpectraSource;
use super::writer::MapWriter;
use crate::data::{FitMaps, SpectraVolume, StreamBlock};
use crate::error::{JobError, Result, StreamBlockError};
use crate::fitting::{FitCounts, RoutineKind, RoutineRegistry};
use crate::model::SpectraModel;
use rayon::prelude::*;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::runtime::Runtime as TokioRuntime;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

/// What a run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub files: usize,
    /// Map sets handed to the writer, averages excluded.
    pub maps_written: usize,
    pub averages_written: usize,
    pub pixels: usize,
}

/// Runs the fitting of an initialized job.
pub struct Executor {
    threads: usize,
    queue_capacity: usize,
    pool: rayon::ThreadPool,
    /// Tokio runtime for streaming mode.
    tokio_runtime: Option<TokioRuntime>,
}

impl Executor {
    /// Create an executor sized from the job configuration.
    pub fn new(job: &AnalysisJob) -> Result<Self> {
        let threads = job.threads();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("xrf-fit-{i}"))
            .build()
            .map_err(|e| JobError::WorkerPool(e.to_string()))?;

        let tokio_runtime = if job.config().stream {
            Some(
                tokio::runtime::Builder::new_multi_thread()
                    .worker_threads(2)
                    .max_blocking_threads(threads + 1)
                    .enable_all()
                    .build()
                    .map_err(|e| JobError::WorkerPool(e.to_string()))?,
            )
        } else {
            None
        };

        Ok(Self {
            threads,
            queue_capacity: job.config().queue_capacity.max(1),
            pool,
            tokio_runtime,
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Fit every pixel of `volume`, one row range per worker.
    pub fn fit_volume(&self, job: &AnalysisJob, volume: &SpectraVolume) -> Result<FitMaps> {
        let elements = job.elements()?;
        let (rows, cols) = (volume.rows(), volume.cols());
        let mut maps = FitMaps::new(rows, cols, &job.config().routines, elements);
        if rows == 0 || cols == 0 {
            return Ok(maps);
        }

        let registry = job.routine_registry(volume.channels())?;
        let model = job.model();

        let fitted: Vec<Vec<Vec<(RoutineKind, FitCounts)>>> = self.pool.install(|| {
            volume
                .spectra()
                .par_chunks(cols)
                .map(|row| {
                    row.iter()
                        .map(|spectrum| registry.fit_all(model, spectrum, elements))
                        .collect()
                })
                .collect()
        });

        for (row, pixels) in fitted.iter().enumerate() {
            for (col, results) in pixels.iter().enumerate() {
                for (kind, counts) in results {
                    maps.set_counts(*kind, row, col, counts);
                }
            }
        }
        Ok(maps)
    }

    /// Fit one detector of one file while the source is still reading it.
    ///
    /// A reader thread fills a bounded queue with stream blocks, each block is
    /// fitted on the blocking pool with at most `threads` in flight, and a
    /// single aggregator owns the output maps.
    pub fn stream_detector(
        &self,
        job: &AnalysisJob,
        source: Arc<dyn SpectraSource>,
        file: &str,
        detector: usize,
    ) -> Result<FitMaps> {
        let Some(runtime) = &self.tokio_runtime else {
            let volume = source.load_volume(file, detector)?;
            return self.fit_volume(job, &volume);
        };

        let shape = source.scan_shape(file, detector)?;
        let elements = job.elements()?.clone();
        let kinds = job.config().routines.clone();
        let registry = Arc::new(job.routine_registry(shape.channels)?);
        let model = Arc::new(job.model().clone());
        let dataset: Arc<str> = Arc::from(file);

        let mut pool = RegroupPool::new();
        pool.expect(
            file,
            detector,
            FitMaps::new(shape.rows, shape.cols, &kinds, &elements),
        );
        if shape.pixels() == 0 {
            return pool.take(file, detector).ok_or(JobError::NotInitialized);
        }

        let (block_tx, mut block_rx) = mpsc::channel::<StreamBlock>(self.queue_capacity);
        let (done_tx, mut done_rx) =
            mpsc::unbounded_channel::<std::result::Result<StreamBlock, StreamBlockError>>();
        let permits = Arc::new(Semaphore::new(self.threads));

        runtime.block_on(async move {
            let producer = {
                let source = source.clone();
                let dataset = dataset.clone();
                tokio::task::spawn_blocking(move || -> Result<()> {
                    let mut failure = None;
                    source.stream_spectra(&dataset, detector, &mut |row, col, spectrum| {
                        match StreamBlock::new(
                            row,
                            col,
                            detector,
                            dataset.clone(),
                            spectrum,
                            &kinds,
                            Some(elements.clone()),
                        ) {
                            Ok(block) => block_tx.blocking_send(block).is_ok(),
                            Err(e) => {
                                failure = Some(e);
                                false
                            }
                        }
                    })?;
                    match failure {
                        Some(e) => Err(e.into()),
                        None => Ok(()),
                    }
                })
            };

            let dispatcher = tokio::spawn(async move {
                while let Some(mut block) = block_rx.recv().await {
                    let Ok(permit) = permits.clone().acquire_owned().await else {
                        break;
                    };
                    let registry = registry.clone();
                    let model = model.clone();
                    let done_tx = done_tx.clone();
                    tokio::task::spawn_blocking(move || {
                        let result = fit_block(&mut block, &registry, &model).map(|_| block);
                        let _ = done_tx.send(result);
                        drop(permit);
                    });
                }
            });

            let mut finished = None;
            while let Some(result) = done_rx.recv().await {
                if let Some(maps) = pool.add(result?)? {
                    finished = Some(maps);
                }
            }

            producer
                .await
                .map_err(|e| JobError::WorkerPool(e.to_string()))??;
            dispatcher
                .await
                .map_err(|e| JobError::WorkerPool(e.to_string()))?;

            match finished {
                Some(maps) => Ok(maps),
                None => pool.take(&dataset, detector).ok_or(JobError::NotInitialized),
            }
        })
    }

    /// Sum every detector of `file` and fit the result once.
    pub fn fit_detector_sum(
        &self,
        job: &AnalysisJob,
        source: &dyn SpectraSource,
        file: &str,
    ) -> Result<FitMaps> {
        let mut summed: Option<SpectraVolume> = None;
        for detector in job.config().detectors.iter() {
            let volume = source.load_volume(file, detector)?;
            match summed.as_mut() {
                Some(total) => {
                    if !total.accumulate(&volume) {
                        warn!(
                            file,
                            detector,
                            rows = volume.rows(),
                            cols = volume.cols(),
                            "detector raster differs, left out of the sum"
                        );
                    }
                }
                None => summed = Some(volume),
            }
        }
        match summed {
            Some(volume) => self.fit_volume(job, &volume),
            None => Err(JobError::NoDatasetFiles),
        }
    }

    /// Fit every file of the job and hand the maps to `writer`.
    pub fn process_dataset(
        &self,
        job: &AnalysisJob,
        source: Arc<dyn SpectraSource>,
        writer: Arc<Mutex<dyn MapWriter>>,
    ) -> Result<RunSummary> {
        if !job.is_initialized() {
            return Err(JobError::NotInitialized);
        }
        let config = job.config();
        let mut summary = RunSummary::default();

        for file in job.files() {
            let started = Instant::now();

            if config.quick_and_dirty {
                let mut maps = self.fit_detector_sum(job, source.as_ref(), file)?;
                maps.apply_quantification(job.quantification());
                summary.pixels += maps.rows() * maps.cols();
                writer.lock().unwrap().write_maps(file, None, &maps)?;
                summary.maps_written += 1;
            } else {
                let mut per_detector = Vec::new();
                for detector in config.detectors.iter() {
                    let mut maps = if config.stream {
                        self.stream_detector(job, source.clone(), file, detector)?
                    } else {
                        let volume = source.load_volume(file, detector)?;
                        self.fit_volume(job, &volume)?
                    };
                    maps.apply_quantification(job.quantification());
                    summary.pixels += maps.rows() * maps.cols();
                    writer.lock().unwrap().write_maps(file, Some(detector), &maps)?;
                    summary.maps_written += 1;
                    if config.generate_average {
                        per_detector.push(maps);
                    }
                }

                if config.generate_average {
                    match FitMaps::average(&per_detector) {
                        Some(average) => {
                            writer.lock().unwrap().write_average(file, &average)?;
                            summary.averages_written += 1;
                        }
                        None => warn!(file = file.as_str(), "detector maps differ in shape, no average written"),
                    }
                }
            }

            summary.files += 1;
            info!(
                file = file.as_str(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "file fitted"
            );
        }
        Ok(summary)
    }
}

fn fit_block(
    block: &mut StreamBlock,
    registry: &RoutineRegistry,
    model: &SpectraModel,
) -> std::result::Result<(), StreamBlockError> {
    block.fit(registry, model)?;
    debug!(row = block.row(), col = block.col(), "block fitted");
    Ok(())
}

/// Run a job end to end: validate, optionally calibrate and quantify, then
/// fit the dataset.
pub fn run_job(
    job: &mut AnalysisJob,
    source: Arc<dyn SpectraSource>,
    writer: Arc<Mutex<dyn MapWriter>>,
) -> Result<RunSummary> {
    if !job.is_initialized() {
        job.init(source.as_ref())?;
    }
    if job.config().optimize_fit_params.is_some() {
        generate_optimal_params(job, source.as_ref())?;
    }
    if job.is_calibration_only() {
        info!("no fit routines configured, calibration only");
        return Ok(RunSummary::default());
    }
    if job.config().quantification_standard.is_some() {
        perform_quantification(job, source.as_ref())?;
    }

    let started = Instant::now();
    let summary = Executor::new(job)?.process_dataset(job, source, writer)?;
    info!(
        files = summary.files,
        pixels = summary.pixels,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "job finished"
    );
    Ok(summary)
}
