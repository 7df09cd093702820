use std::time::Duration;

use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while building or running a pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Queue capacity must be a positive number of items
    #[error("queue capacity must be at least 1")]
    InvalidCapacity,

    /// Item cap, when configured, must be positive
    #[error("maximum item count must be at least 1 when set")]
    InvalidMaxItems,

    /// A stage panicked while processing; the pipeline was shut down
    #[error("stage '{stage}' panicked while processing")]
    StagePanicked { stage: String },

    /// The pipeline did not terminate within the allowed wait
    #[error("pipeline did not terminate within {0:?}")]
    JoinTimeout(Duration),

    /// A stage thread could not be spawned
    #[error("failed to spawn stage thread: {0}")]
    Spawn(#[from] std::io::Error),
}
