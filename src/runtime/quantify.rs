//! Quantification against a measured standard.

use super::job::AnalysisJob;
use super::optimize::integrate_file;
use super::source::SpectraSource;
use crate::data::QuantificationFactors;
use crate::error::{JobError, Result, SourceError};
use tracing::info;

/// Fit the standard's integrated spectrum with every configured routine and
/// store the resulting concentration-per-count factors on the job.
pub fn perform_quantification(
    job: &mut AnalysisJob,
    source: &dyn SpectraSource,
) -> Result<QuantificationFactors> {
    let Some(standard) = job.config().quantification_standard.clone() else {
        return Ok(QuantificationFactors::default());
    };
    let spectrum = integrate_file(job, source, &standard.file)?.ok_or_else(|| {
        JobError::Source(SourceError::FileNotFound(standard.file.clone()))
    })?;

    let registry = job.routine_registry(spectrum.len())?;
    let mut factors = QuantificationFactors::default();
    for (kind, counts) in registry.fit_all(job.model(), &spectrum, job.elements()?) {
        factors.compute(kind, &standard, &counts);
    }

    info!(
        standard = standard.file.as_str(),
        elements = standard.concentrations.len(),
        "quantification factors computed"
    );
    job.set_quantification(factors.clone());
    Ok(factors)
}
