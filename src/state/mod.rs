//! Run state shared between the scheduler, the executor and observers.

pub mod log_sink;
pub mod run;
pub mod stats;

pub use log_sink::{LineLevel, LogSink, LOG_CAPACITY, LOG_RETAINED};
pub use run::{
    Lifecycle, ProgressSample, RunState, RunStateHandle, INITIAL_LOG_LINE, PROGRESS_SAMPLE_LIMIT,
};
pub use stats::Stats;
