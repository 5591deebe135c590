//! Runtime for XRF map fitting jobs.

pub mod executor;
pub mod job;
pub mod optimize;
pub mod quantify;
pub mod regroup;
pub mod source;
pub mod writer;

pub use executor::{run_job, Executor, RunSummary};
pub use job::{default_thread_count, AnalysisJob, DetectorRange, JobConfig};
pub use optimize::{generate_optimal_params, integrate_file};
pub use quantify::perform_quantification;
pub use regroup::RegroupPool;
pub use source::{InMemorySource, ScanShape, SpectraSource};
pub use writer::{InMemoryWriter, MapWriter};
