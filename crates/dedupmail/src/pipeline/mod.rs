pub mod classifier;
pub mod config;
pub mod context;
pub mod error;
pub mod progress;
pub mod purge;
pub mod runner;
pub mod scanner;
pub mod summary;

pub use classifier::{BatchClassifier, Classification, ClassifiedBatch};
pub use config::PipelineConfig;
pub use context::{CancelToken, RunContext};
pub use error::RunError;
pub use progress::{LogProgress, NoopProgress, ProgressEvent, ProgressReporter};
pub use purge::{PurgeController, PurgeState};
pub use runner::Pipeline;
pub use scanner::CandidateScanner;
pub use summary::{RunOutcome, RunReport, RunSummary};
