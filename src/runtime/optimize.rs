//! Calibration of the shared fit parameters on the dataset itself.

use super::job::AnalysisJob;
use super::source::SpectraSource;
use crate::data::Spectrum;
use crate::error::{JobError, Result};
use crate::fitting::{create_optimizer, fit_parameters, OptimizerOptions};
use crate::model::FitParameters;
use tracing::{info, warn};

/// Integrate every configured detector of `file` into one spectrum.
pub fn integrate_file(
    job: &AnalysisJob,
    source: &dyn SpectraSource,
    file: &str,
) -> Result<Option<Spectrum>> {
    let mut total: Option<Spectrum> = None;
    for detector in job.config().detectors.iter() {
        let volume = match source.load_volume(file, detector) {
            Ok(volume) => volume,
            Err(e) => {
                warn!(file, detector, error = %e, "detector skipped during integration");
                continue;
            }
        };
        let spectrum = volume.integrated_spectrum();
        match total.as_mut() {
            Some(sum) => sum.accumulate(&spectrum),
            None => total = Some(spectrum),
        }
    }
    Ok(total)
}

/// Names of the `count` largest job files, biggest first.
fn largest_files(job: &AnalysisJob, source: &dyn SpectraSource, count: usize) -> Vec<String> {
    let mut sized: Vec<(u64, &String)> = job
        .files()
        .iter()
        .map(|f| (source.file_size(f).unwrap_or(0), f))
        .collect();
    sized.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(b.1)));
    sized.into_iter().take(count).map(|(_, f)| f.clone()).collect()
}

/// Files integrated for calibration: every explicitly named file, otherwise
/// the largest ones found in the dataset.
fn calibration_files(job: &AnalysisJob, source: &dyn SpectraSource) -> Vec<String> {
    if !job.config().dataset_files.is_empty() {
        return job.files().to_vec();
    }
    largest_files(job, source, job.config().optimize_file_count.max(1))
}

/// Fit the integrated spectrum of the largest files and adopt the fitted
/// calibration and peak shape as the job's starting parameters.
///
/// Element amplitudes of the calibration fit are discarded.
pub fn generate_optimal_params(
    job: &mut AnalysisJob,
    source: &dyn SpectraSource,
) -> Result<FitParameters> {
    let Some(preset) = job.config().optimize_fit_params else {
        return Ok(job.model().params().clone());
    };
    let files = calibration_files(job, source);

    let mut integrated: Option<Spectrum> = None;
    for file in &files {
        if let Some(spectrum) = integrate_file(job, source, file)? {
            match integrated.as_mut() {
                Some(sum) => sum.accumulate(&spectrum),
                None => integrated = Some(spectrum),
            }
        }
    }
    let spectrum = integrated.ok_or(JobError::NoDatasetFiles)?;

    let optimizer = create_optimizer(job.config().optimizer, OptimizerOptions::default());
    let fitted = fit_parameters(
        job.model(),
        &spectrum,
        job.elements()?,
        job.energy_range(spectrum.len()),
        preset,
        optimizer.as_ref(),
    );

    let mut params = job.model().params().clone();
    params.update_shape_from(&fitted);
    job.set_fit_params(params.clone());

    info!(
        files = files.len(),
        preset = ?preset,
        optimizer = optimizer.kind().name(),
        "fit parameters optimized"
    );
    Ok(params)
}
