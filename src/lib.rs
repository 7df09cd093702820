//! A bounded-queue concurrent pipeline for produce/transform/consume workloads.
//!
//! This crate provides a fixed three-stage pipeline (source, transform, sink)
//! connected by blocking FIFO queues with a hard capacity limit, so a fast
//! producer can never outrun a slow consumer by more than the configured
//! number of in-flight items.
//!
//! # Features
//!
//! - Blocking bounded queues built on a mutex and two condition variables
//! - In-band end-of-stream propagation via a tagged envelope type
//! - One OS thread per stage; queues are the only shared state
//! - Pipeline-wide shutdown signal that unblocks every pending queue wait
//! - Panic fencing: a failing stage still propagates end-of-stream and is
//!   surfaced as a pipeline error instead of a hang
//! - Per-stage throughput and latency metrics
//!
//! # Example
//!
//! ```ignore
//! use conveyor::{FnConsumer, IterProducer, Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::new("clip.mp4")
//!     .with_capacity(10)
//!     .with_max_items(72);
//!
//! let report = Pipeline::new(config)?.run(
//!     IterProducer::new(frames),
//!     |frame| grayscale(frame),
//!     FnConsumer::new(|frame| display(frame)),
//! )?;
//!
//! println!("{}", report.format());
//! ```

pub mod config;
pub mod envelope;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod shutdown;
pub mod stage;

// Re-exports for convenience
pub use config::{PipelineConfig, DEFAULT_CAPACITY};
pub use envelope::Envelope;
pub use error::{PipelineError, Result};
pub use metrics::{LatencyWindow, MetricsSnapshot, StageMetrics};
pub use pipeline::{Pipeline, PipelineReport, RunningPipeline};
pub use queue::{BoundedQueue, Cancelled};
pub use shutdown::ShutdownSignal;
pub use stage::{
    Consumer, FnConsumer, IterProducer, Producer, SinkStage, SourceStage, StageOutcome,
    StageReport, TransformStage,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
