use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{info, warn};

use crate::config::PipelineConfig;
use crate::envelope::Envelope;
use crate::error::{PipelineError, Result};
use crate::metrics::{MetricsSnapshot, StageMetrics};
use crate::queue::BoundedQueue;
use crate::shutdown::ShutdownSignal;
use crate::stage::{Consumer, Producer, SinkStage, SourceStage, StageReport, TransformStage};

/// A wired three-stage topology awaiting its collaborators.
///
/// Source → queue A → Transform → queue B → Sink. Queues and the shutdown
/// signal are created up front; [`start`](Pipeline::start) launches one
/// thread per stage. The orchestrator takes no part in steady-state flow:
/// its duties are wiring at startup and joining at shutdown. Failed stages
/// are not restarted.
pub struct Pipeline<S, T> {
    config: PipelineConfig,
    source_queue: BoundedQueue<Envelope<S>>,
    sink_queue: BoundedQueue<Envelope<T>>,
    shutdown: ShutdownSignal,
}

impl<S: Send + 'static, T: Send + 'static> Pipeline<S, T> {
    /// Build both hand-off queues from a validated configuration
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let source_queue = BoundedQueue::new(config.capacity())?;
        let sink_queue = BoundedQueue::new(config.capacity())?;

        // a shutdown request must unblock waiters on both queues
        let shutdown = ShutdownSignal::new();
        shutdown.on_request({
            let queue = source_queue.clone();
            move || queue.cancel()
        });
        shutdown.on_request({
            let queue = sink_queue.clone();
            move || queue.cancel()
        });

        Ok(Self {
            config,
            source_queue,
            sink_queue,
            shutdown,
        })
    }

    /// Handle for requesting shutdown from outside the pipeline
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Launch all three stages on their own threads
    pub fn start<P, F, C>(self, producer: P, transform: F, consumer: C) -> Result<RunningPipeline>
    where
        P: Producer<Item = S> + Send + 'static,
        F: FnMut(S) -> T + Send + 'static,
        C: Consumer<Item = T> + Send + 'static,
    {
        info!(
            "starting pipeline for '{}' (capacity {}, max items {:?})",
            self.config.source(),
            self.config.capacity(),
            self.config.max_items(),
        );

        let source = SourceStage::new(
            "source",
            producer,
            self.source_queue.clone(),
            self.config.max_items(),
            self.shutdown.clone(),
        );
        let transform = TransformStage::new(
            "transform",
            self.source_queue,
            self.sink_queue.clone(),
            transform,
            self.config.max_items(),
            self.shutdown.clone(),
        );
        let sink = SinkStage::new("sink", self.sink_queue, consumer, self.shutdown.clone());

        let metrics = vec![source.metrics(), transform.metrics(), sink.metrics()];
        let handles = vec![
            spawn_stage("source", move || source.run())?,
            spawn_stage("transform", move || transform.run())?,
            spawn_stage("sink", move || sink.run())?,
        ];

        Ok(RunningPipeline {
            handles,
            metrics,
            shutdown: self.shutdown,
        })
    }

    /// Start the pipeline and wait for it to terminate
    pub fn run<P, F, C>(self, producer: P, transform: F, consumer: C) -> Result<PipelineReport>
    where
        P: Producer<Item = S> + Send + 'static,
        F: FnMut(S) -> T + Send + 'static,
        C: Consumer<Item = T> + Send + 'static,
    {
        self.start(producer, transform, consumer)?.join()
    }
}

fn spawn_stage(
    name: &str,
    body: impl FnOnce() -> Result<StageReport> + Send + 'static,
) -> Result<JoinHandle<Result<StageReport>>> {
    Ok(thread::Builder::new().name(name.to_string()).spawn(body)?)
}

/// A launched pipeline that can be observed, stopped and joined
pub struct RunningPipeline {
    handles: Vec<JoinHandle<Result<StageReport>>>,
    metrics: Vec<StageMetrics>,
    shutdown: ShutdownSignal,
}

impl RunningPipeline {
    /// Broadcast a shutdown request, unblocking every queue wait
    pub fn shutdown(&self) {
        self.shutdown.request();
    }

    /// Handle for requesting shutdown from another thread
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Whether any stage is still running
    pub fn is_running(&self) -> bool {
        self.handles.iter().any(|handle| !handle.is_finished())
    }

    /// Live counters for a stage, in pipeline order (source, transform, sink)
    pub fn stage_metrics(&self, index: usize) -> Option<&StageMetrics> {
        self.metrics.get(index)
    }

    /// Wait for every stage to terminate and collect their reports.
    ///
    /// The first stage failure is surfaced after all threads are reaped.
    pub fn join(self) -> Result<PipelineReport> {
        let mut reports = Vec::with_capacity(self.handles.len());
        let mut failure = None;
        for handle in self.handles {
            let name = handle.thread().name().unwrap_or("stage").to_string();
            match handle.join() {
                Ok(Ok(report)) => reports.push(report),
                Ok(Err(err)) => {
                    warn!("stage '{}' failed: {}", name, err);
                    failure.get_or_insert(err);
                }
                Err(_) => {
                    // the run-loop fence should make this unreachable
                    failure.get_or_insert(PipelineError::StagePanicked { stage: name });
                }
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }
        Ok(PipelineReport {
            stages: reports,
            metrics: self.metrics.iter().map(StageMetrics::snapshot).collect(),
        })
    }

    /// Like [`join`](RunningPipeline::join), but give up after `timeout`.
    ///
    /// On deadline a shutdown is requested so blocked stages terminate, the
    /// threads are reaped, and `JoinTimeout` is returned.
    pub fn join_timeout(self, timeout: Duration) -> Result<PipelineReport> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.handles.iter().all(|handle| handle.is_finished()) {
                return self.join();
            }
            thread::sleep(Duration::from_millis(5));
        }

        warn!(
            "pipeline still running after {:?}; requesting shutdown",
            timeout
        );
        self.shutdown.request();
        self.join()?;
        Err(PipelineError::JoinTimeout(timeout))
    }
}

/// Aggregated end-of-run accounting for the whole pipeline
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Per-stage reports, in pipeline order
    pub stages: Vec<StageReport>,
    /// Final metrics snapshots, in pipeline order
    pub metrics: Vec<MetricsSnapshot>,
}

impl PipelineReport {
    /// Report for a stage by name
    pub fn stage(&self, name: &str) -> Option<&StageReport> {
        self.stages.iter().find(|report| report.name == name)
    }

    /// Items the sink delivered to its consumer
    pub fn items_delivered(&self) -> u64 {
        self.stage("sink").map(|report| report.items).unwrap_or(0)
    }

    /// Multi-line human-readable summary
    pub fn format(&self) -> String {
        let mut summary = String::from("pipeline summary:\n");
        for (report, snapshot) in self.stages.iter().zip(&self.metrics) {
            summary.push_str(&format!(
                "  {} ({:?}): {}\n",
                report.name,
                report.outcome,
                snapshot.format()
            ));
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::{FnConsumer, IterProducer};

    #[test]
    fn test_invalid_config_fails_fast() {
        let config = PipelineConfig::default().with_capacity(0);
        assert!(matches!(
            Pipeline::<u32, u32>::new(config),
            Err(PipelineError::InvalidCapacity)
        ));
    }

    #[test]
    fn test_shutdown_cancels_both_queues() {
        let pipeline = Pipeline::<u32, u32>::new(PipelineConfig::default()).unwrap();
        let source_queue = pipeline.source_queue.clone();
        let sink_queue = pipeline.sink_queue.clone();

        pipeline.shutdown_signal().request();
        assert!(source_queue.is_cancelled());
        assert!(sink_queue.is_cancelled());
    }

    #[test]
    fn test_run_to_completion() {
        let pipeline = Pipeline::new(PipelineConfig::default()).unwrap();
        let report = pipeline
            .run(
                IterProducer::new(0u32..10),
                |x| x + 1,
                FnConsumer::new(|_| true),
            )
            .unwrap();

        assert_eq!(report.items_delivered(), 10);
        assert!(report.format().contains("sink"));
    }
}
