use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use log::{debug, error, trace};

use crate::envelope::Envelope;
use crate::error::PipelineError;
use crate::metrics::StageMetrics;
use crate::queue::BoundedQueue;
use crate::shutdown::ShutdownSignal;

/// Pull-style collaborator feeding a source stage
pub trait Producer {
    type Item;

    /// Yield the next item, or `None` once the stream is exhausted
    fn next(&mut self) -> Option<Self::Item>;
}

/// Push-style collaborator fed by a sink stage
pub trait Consumer {
    type Item;

    /// Handle one item. Returning `false` requests an early stop of the
    /// whole pipeline.
    fn accept(&mut self, item: Self::Item) -> bool;
}

/// Adapt any iterator into a [`Producer`]
pub struct IterProducer<I> {
    iter: I,
}

impl<I: Iterator> IterProducer<I> {
    pub fn new(iter: I) -> Self {
        Self { iter }
    }
}

impl<I: Iterator> Producer for IterProducer<I> {
    type Item = I::Item;

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next()
    }
}

/// Adapt a closure into a [`Consumer`]
pub struct FnConsumer<T, F> {
    accept: F,
    _marker: PhantomData<fn(T)>,
}

impl<T, F: FnMut(T) -> bool> FnConsumer<T, F> {
    pub fn new(accept: F) -> Self {
        Self {
            accept,
            _marker: PhantomData,
        }
    }
}

impl<T, F: FnMut(T) -> bool> Consumer for FnConsumer<T, F> {
    type Item = T;

    fn accept(&mut self, item: T) -> bool {
        (self.accept)(item)
    }
}

/// Why a stage's run loop exited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    /// Upstream data ran out; the end-of-stream marker was seen or produced
    Exhausted,
    /// The configured item cap was reached
    Capped,
    /// The consumer asked to stop early
    Stopped,
    /// A pipeline-wide shutdown interrupted a queue wait
    Cancelled,
}

/// Final accounting for one stage
#[derive(Debug, Clone)]
pub struct StageReport {
    pub name: String,
    pub items: u64,
    pub outcome: StageOutcome,
}

/// Head of the pipeline: pulls items from a producer into the first queue.
///
/// After the producer reports exhaustion, or the optional item cap is
/// reached, exactly one end-of-stream marker is enqueued and the stage
/// terminates. The marker is also sent on failure paths, so downstream
/// stages never wait on a stream that will not end.
pub struct SourceStage<P: Producer> {
    name: String,
    producer: P,
    output: BoundedQueue<Envelope<P::Item>>,
    cap: Option<u64>,
    metrics: StageMetrics,
    shutdown: ShutdownSignal,
}

impl<P: Producer> SourceStage<P> {
    pub fn new(
        name: impl Into<String>,
        producer: P,
        output: BoundedQueue<Envelope<P::Item>>,
        cap: Option<u64>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            name: name.into(),
            producer,
            output,
            cap,
            metrics: StageMetrics::new(),
            shutdown,
        }
    }

    /// Shared handle to this stage's counters
    pub fn metrics(&self) -> StageMetrics {
        self.metrics.clone()
    }

    /// Run to completion, consuming the stage
    pub fn run(mut self) -> Result<StageReport, PipelineError> {
        debug!("stage '{}' running", self.name);
        let body = catch_unwind(AssertUnwindSafe(|| self.pump()));
        if body.is_err() {
            // unblock peers before the best-effort marker below
            self.shutdown.request();
        }
        let _ = self.output.enqueue(Envelope::End);
        finish(self.name, body)
    }

    fn pump(&mut self) -> (u64, StageOutcome) {
        let mut items = 0u64;
        loop {
            if self.cap.is_some_and(|cap| items >= cap) {
                return (items, StageOutcome::Capped);
            }
            let started = Instant::now();
            let Some(item) = self.producer.next() else {
                return (items, StageOutcome::Exhausted);
            };
            if self.output.enqueue(Envelope::Item(item)).is_err() {
                return (items, StageOutcome::Cancelled);
            }
            self.metrics.record_item(started.elapsed());
            items += 1;
            trace!("stage '{}': item #{} forwarded", self.name, items);
        }
    }
}

/// Middle of the pipeline: applies a transformation between two queues.
///
/// Receiving the end-of-stream marker forwards one marker downstream and
/// terminates the stage. An optional item cap terminates early; items left
/// upstream are abandoned.
pub struct TransformStage<T, U, F> {
    name: String,
    input: BoundedQueue<Envelope<T>>,
    output: BoundedQueue<Envelope<U>>,
    transform: F,
    cap: Option<u64>,
    metrics: StageMetrics,
    shutdown: ShutdownSignal,
}

impl<T, U, F: FnMut(T) -> U> TransformStage<T, U, F> {
    pub fn new(
        name: impl Into<String>,
        input: BoundedQueue<Envelope<T>>,
        output: BoundedQueue<Envelope<U>>,
        transform: F,
        cap: Option<u64>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            name: name.into(),
            input,
            output,
            transform,
            cap,
            metrics: StageMetrics::new(),
            shutdown,
        }
    }

    /// Shared handle to this stage's counters
    pub fn metrics(&self) -> StageMetrics {
        self.metrics.clone()
    }

    /// Run to completion, consuming the stage
    pub fn run(mut self) -> Result<StageReport, PipelineError> {
        debug!("stage '{}' running", self.name);
        let body = catch_unwind(AssertUnwindSafe(|| self.pump()));
        if body.is_err() {
            self.shutdown.request();
        }
        let _ = self.output.enqueue(Envelope::End);
        finish(self.name, body)
    }

    fn pump(&mut self) -> (u64, StageOutcome) {
        let mut items = 0u64;
        loop {
            if self.cap.is_some_and(|cap| items >= cap) {
                return (items, StageOutcome::Capped);
            }
            let envelope = match self.input.dequeue() {
                Ok(envelope) => envelope,
                Err(_) => return (items, StageOutcome::Cancelled),
            };
            let item = match envelope {
                Envelope::Item(item) => item,
                Envelope::End => {
                    debug!("stage '{}': end of stream, draining", self.name);
                    return (items, StageOutcome::Exhausted);
                }
            };
            let started = Instant::now();
            let transformed = (self.transform)(item);
            if self.output.enqueue(Envelope::Item(transformed)).is_err() {
                return (items, StageOutcome::Cancelled);
            }
            self.metrics.record_item(started.elapsed());
            items += 1;
            trace!("stage '{}': item #{} transformed", self.name, items);
        }
    }
}

/// Tail of the pipeline: hands items to a consumer.
///
/// Terminates on the end-of-stream marker, or early when the consumer
/// returns `false`, in which case a pipeline-wide shutdown is requested so
/// upstream stages do not stay blocked on queues nobody drains.
pub struct SinkStage<C: Consumer> {
    name: String,
    input: BoundedQueue<Envelope<C::Item>>,
    consumer: C,
    metrics: StageMetrics,
    shutdown: ShutdownSignal,
}

impl<C: Consumer> SinkStage<C> {
    pub fn new(
        name: impl Into<String>,
        input: BoundedQueue<Envelope<C::Item>>,
        consumer: C,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            name: name.into(),
            input,
            consumer,
            metrics: StageMetrics::new(),
            shutdown,
        }
    }

    /// Shared handle to this stage's counters
    pub fn metrics(&self) -> StageMetrics {
        self.metrics.clone()
    }

    /// Run to completion, consuming the stage
    pub fn run(mut self) -> Result<StageReport, PipelineError> {
        debug!("stage '{}' running", self.name);
        let body = catch_unwind(AssertUnwindSafe(|| self.pump()));
        if body.is_err() {
            self.shutdown.request();
        }
        finish(self.name, body)
    }

    fn pump(&mut self) -> (u64, StageOutcome) {
        let mut items = 0u64;
        loop {
            let envelope = match self.input.dequeue() {
                Ok(envelope) => envelope,
                Err(_) => return (items, StageOutcome::Cancelled),
            };
            let item = match envelope {
                Envelope::Item(item) => item,
                Envelope::End => {
                    debug!("stage '{}': end of stream", self.name);
                    return (items, StageOutcome::Exhausted);
                }
            };
            let started = Instant::now();
            let keep_going = self.consumer.accept(item);
            self.metrics.record_item(started.elapsed());
            items += 1;
            trace!("stage '{}': item #{} delivered", self.name, items);
            if !keep_going {
                debug!("stage '{}': consumer requested stop", self.name);
                self.shutdown.request();
                return (items, StageOutcome::Stopped);
            }
        }
    }
}

/// Translate a fenced run-loop result into the stage's report
fn finish(
    name: String,
    body: std::thread::Result<(u64, StageOutcome)>,
) -> Result<StageReport, PipelineError> {
    match body {
        Ok((items, outcome)) => {
            debug!("stage '{}' terminated after {} items: {:?}", name, items, outcome);
            Ok(StageReport {
                name,
                items,
                outcome,
            })
        }
        Err(_) => {
            error!("stage '{}' panicked; pipeline shutdown requested", name);
            Err(PipelineError::StagePanicked { stage: name })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue<T>(capacity: usize) -> BoundedQueue<Envelope<T>> {
        BoundedQueue::new(capacity).unwrap()
    }

    #[test]
    fn test_source_emits_items_then_end() {
        let out = queue(8);
        let stage = SourceStage::new(
            "source",
            IterProducer::new(0..3),
            out.clone(),
            None,
            ShutdownSignal::new(),
        );

        let report = stage.run().unwrap();
        assert_eq!(report.items, 3);
        assert_eq!(report.outcome, StageOutcome::Exhausted);

        for i in 0..3 {
            assert_eq!(out.dequeue().unwrap(), Envelope::Item(i));
        }
        assert_eq!(out.dequeue().unwrap(), Envelope::End);
    }

    #[test]
    fn test_empty_source_emits_only_end() {
        let out = queue::<u32>(2);
        let stage = SourceStage::new(
            "source",
            IterProducer::new(std::iter::empty()),
            out.clone(),
            None,
            ShutdownSignal::new(),
        );

        let report = stage.run().unwrap();
        assert_eq!(report.items, 0);
        assert_eq!(out.dequeue().unwrap(), Envelope::End);
    }

    #[test]
    fn test_source_cap_stops_an_endless_producer() {
        let out = queue(16);
        let stage = SourceStage::new(
            "source",
            IterProducer::new(0u64..),
            out.clone(),
            Some(5),
            ShutdownSignal::new(),
        );

        let report = stage.run().unwrap();
        assert_eq!(report.items, 5);
        assert_eq!(report.outcome, StageOutcome::Capped);

        let mut drained = Vec::new();
        loop {
            match out.dequeue().unwrap() {
                Envelope::Item(item) => drained.push(item),
                Envelope::End => break,
            }
        }
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_transform_forwards_end_marker() {
        let input = queue(8);
        let output = queue(8);
        for i in 0..4 {
            input.enqueue(Envelope::Item(i)).unwrap();
        }
        input.enqueue(Envelope::End).unwrap();

        let stage = TransformStage::new(
            "transform",
            input,
            output.clone(),
            |x: i32| x * 2,
            None,
            ShutdownSignal::new(),
        );

        let report = stage.run().unwrap();
        assert_eq!(report.items, 4);
        assert_eq!(report.outcome, StageOutcome::Exhausted);

        for i in 0..4 {
            assert_eq!(output.dequeue().unwrap(), Envelope::Item(i * 2));
        }
        assert_eq!(output.dequeue().unwrap(), Envelope::End);
    }

    #[test]
    fn test_transform_cap_abandons_upstream_items() {
        let input = queue(16);
        let output = queue(16);
        for i in 0..10 {
            input.enqueue(Envelope::Item(i)).unwrap();
        }
        input.enqueue(Envelope::End).unwrap();

        let stage = TransformStage::new(
            "transform",
            input.clone(),
            output.clone(),
            |x: i32| x,
            Some(4),
            ShutdownSignal::new(),
        );

        let report = stage.run().unwrap();
        assert_eq!(report.items, 4);
        assert_eq!(report.outcome, StageOutcome::Capped);
        // marker still sent downstream, leftovers still upstream
        assert_eq!(output.len(), 5);
        assert_eq!(input.len(), 7);
    }

    #[test]
    fn test_sink_stop_request_triggers_shutdown() {
        let input = queue(8);
        for i in 0..5 {
            input.enqueue(Envelope::Item(i)).unwrap();
        }
        let shutdown = ShutdownSignal::new();
        let stage = SinkStage::new(
            "sink",
            input,
            FnConsumer::new(|item: i32| item < 1),
            shutdown.clone(),
        );

        let report = stage.run().unwrap();
        assert_eq!(report.items, 2);
        assert_eq!(report.outcome, StageOutcome::Stopped);
        assert!(shutdown.is_requested());
    }

    #[test]
    fn test_panicking_transform_still_sends_end() {
        let input = queue(8);
        let output = queue(8);
        input.enqueue(Envelope::Item(1)).unwrap();

        let shutdown = ShutdownSignal::new();
        let stage = TransformStage::new(
            "transform",
            input,
            output.clone(),
            |_: i32| -> i32 { panic!("collaborator failure") },
            None,
            shutdown.clone(),
        );

        let result = stage.run();
        assert!(matches!(
            result,
            Err(PipelineError::StagePanicked { ref stage }) if stage == "transform"
        ));
        assert!(shutdown.is_requested());
        assert_eq!(output.dequeue().unwrap(), Envelope::End);
    }
}
