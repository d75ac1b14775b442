//! Batch runner.
//!
//! Sequential mode processes items strictly in order. Parallel mode runs
//! chunks of `concurrency` items on scoped threads and forwards each
//! outcome as soon as its worker finishes, so events may arrive out of
//! input order. Every event carries the original index and the stream
//! always ends with one `complete` event.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::events::{CompleteEvent, ErrorEvent, Phase, ProgressEvent, ResultEvent, StreamEvent};
use crate::config::BatchConfig;
use crate::error::{JobError, ValidationError};
use crate::ocr::Recognizer;
use crate::pipeline::{JobOutcome, Pipeline, intake};

/// One image of a batch.
#[derive(Clone, Debug)]
pub struct BatchItem {
    pub index: usize,
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl BatchItem {
    pub fn new(index: usize, filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            index,
            filename: filename.into(),
            bytes,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemState {
    Pending,
    Processing,
    Done,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchMode {
    Sequential,
    Parallel { concurrency: usize },
}

impl BatchMode {
    pub fn from_config(cfg: &BatchConfig) -> Self {
        if cfg.parallel && cfg.concurrency > 1 {
            BatchMode::Parallel {
                concurrency: cfg.concurrency,
            }
        } else {
            BatchMode::Sequential
        }
    }
}

/// Shared stop flag. Set by the consumer, or by the runner when the event
/// receiver has gone away.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub average_accuracy: Option<f64>,
    pub elapsed_seconds: f64,
    pub cancelled: bool,
    /// Final state per input position
    pub states: Vec<ItemState>,
}

/// Event sink plus running counters.
struct Emitter<'a> {
    sender: &'a Sender<StreamEvent>,
    cancel: &'a CancelFlag,
    total: usize,
    completed: usize,
    successful: usize,
    failed: usize,
    accuracy_sum: f64,
    accuracy_count: usize,
    states: Vec<ItemState>,
}

impl<'a> Emitter<'a> {
    fn new(sender: &'a Sender<StreamEvent>, cancel: &'a CancelFlag, total: usize) -> Self {
        Self {
            sender,
            cancel,
            total,
            completed: 0,
            successful: 0,
            failed: 0,
            accuracy_sum: 0.0,
            accuracy_count: 0,
            states: vec![ItemState::Pending; total],
        }
    }

    /// Sends one event; a closed receiver cancels the batch.
    fn send(&self, event: StreamEvent) -> bool {
        if self.sender.send(event).is_err() {
            if !self.cancel.is_cancelled() {
                warn!("Event receiver disconnected, cancelling batch");
            }
            self.cancel.cancel();
            return false;
        }
        true
    }

    fn progress(&self, current: usize, item: &BatchItem, phase: Phase) -> bool {
        self.send(StreamEvent::Progress(ProgressEvent {
            current,
            total: self.total,
            filename: item.filename.clone(),
            phase,
        }))
    }

    /// Counts and emits the outcome of the item at input position `pos`.
    fn outcome(&mut self, pos: usize, item: &BatchItem, result: Result<JobOutcome, JobError>) {
        match result {
            Ok(outcome) => {
                self.successful += 1;
                self.states[pos] = ItemState::Done;
                if let Some(accuracy) = outcome.record.stats.accuracy_pct {
                    self.accuracy_sum += accuracy;
                    self.accuracy_count += 1;
                }
                info!("[{}/{}] {} done", item.index + 1, self.total, item.filename);
                self.send(StreamEvent::Result(ResultEvent {
                    index: item.index,
                    filename: item.filename.clone(),
                    decklist: outcome.record,
                    persistence: outcome.persistence,
                }));
            }
            Err(e) => {
                self.failed += 1;
                self.states[pos] = ItemState::Error;
                warn!("[{}/{}] {} failed: {}", item.index + 1, self.total, item.filename, e);
                self.send(StreamEvent::Error(ErrorEvent {
                    index: item.index,
                    filename: item.filename.clone(),
                    reason: e.reason().to_string(),
                    message: e.to_string(),
                }));
            }
        }
    }

    fn finish(self, start: Instant) -> BatchSummary {
        let average_accuracy = (self.accuracy_count > 0)
            .then(|| round2(self.accuracy_sum / self.accuracy_count as f64));
        let elapsed_seconds = round2(start.elapsed().as_secs_f64());

        let complete = CompleteEvent {
            total: self.total,
            successful: self.successful,
            failed: self.failed,
            average_accuracy,
            elapsed_seconds,
        };
        info!(
            "Batch finished: {} ok, {} failed of {} in {:.2}s",
            complete.successful, complete.failed, complete.total, complete.elapsed_seconds
        );
        self.send(StreamEvent::Complete(complete));

        BatchSummary {
            total: self.total,
            successful: self.successful,
            failed: self.failed,
            average_accuracy,
            elapsed_seconds,
            cancelled: self.cancel.is_cancelled(),
            states: self.states,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Runs one job; a panic inside the pipeline becomes an `Internal` error.
fn run_job<P: Recognizer, S: Recognizer>(pipeline: &Pipeline<P, S>, item: &BatchItem) -> Result<JobOutcome, JobError> {
    panic::catch_unwind(AssertUnwindSafe(|| pipeline.process(&item.bytes, &item.filename)))
        .unwrap_or_else(|payload| {
            let message = panic_message(payload);
            error!("Job {} panicked: {}", item.filename, message);
            Err(JobError::Internal(message))
        })
}

/// Rejects a whole batch that is too large. No event is produced.
pub fn check_batch<P: Recognizer, S: Recognizer>(
    pipeline: &Pipeline<P, S>,
    items: &[BatchItem],
) -> Result<(), ValidationError> {
    intake::validate_batch_size(items.len(), &pipeline.config().intake)
}

/// Processes every item, streaming events to `sender`. Ends with exactly
/// one `complete` event.
pub fn run_batch<P: Recognizer, S: Recognizer>(
    pipeline: &Pipeline<P, S>,
    items: Vec<BatchItem>,
    mode: BatchMode,
    sender: &Sender<StreamEvent>,
    cancel: &CancelFlag,
) -> BatchSummary {
    let start = Instant::now();
    info!("Starting batch of {} image(s), {:?}", items.len(), mode);
    let mut emitter = Emitter::new(sender, cancel, items.len());

    match mode {
        BatchMode::Parallel { concurrency } if concurrency > 1 => {
            run_parallel(pipeline, &items, concurrency, &mut emitter)
        }
        _ => run_sequential(pipeline, &items, &mut emitter),
    }

    emitter.finish(start)
}

fn run_sequential<P: Recognizer, S: Recognizer>(
    pipeline: &Pipeline<P, S>,
    items: &[BatchItem],
    emitter: &mut Emitter<'_>,
) {
    for (pos, item) in items.iter().enumerate() {
        if emitter.cancel.is_cancelled() {
            debug!("Batch cancelled before {}", item.filename);
            break;
        }

        if !emitter.progress(pos + 1, item, Phase::Validating) {
            break;
        }
        if let Err(e) = pipeline.validate(&item.bytes) {
            emitter.outcome(pos, item, Err(e.into()));
            continue;
        }

        if !emitter.progress(pos + 1, item, Phase::Processing) {
            break;
        }
        emitter.states[pos] = ItemState::Processing;
        let result = run_job(pipeline, item);
        emitter.outcome(pos, item, result);
    }
}

fn run_parallel<P: Recognizer, S: Recognizer>(
    pipeline: &Pipeline<P, S>,
    items: &[BatchItem],
    concurrency: usize,
    emitter: &mut Emitter<'_>,
) {
    // Rejections are reported up front and never occupy a worker
    let mut valid = Vec::with_capacity(items.len());
    for (pos, item) in items.iter().enumerate() {
        if emitter.cancel.is_cancelled() {
            return;
        }
        match pipeline.validate(&item.bytes) {
            Ok(_) => valid.push(pos),
            Err(e) => {
                emitter.completed += 1;
                emitter.progress(emitter.completed, item, Phase::Completed);
                emitter.outcome(pos, item, Err(e.into()));
            }
        }
    }

    for chunk in valid.chunks(concurrency) {
        if emitter.cancel.is_cancelled() {
            debug!("Batch cancelled, remaining images not scheduled");
            break;
        }
        for &pos in chunk {
            emitter.states[pos] = ItemState::Processing;
        }

        thread::scope(|scope| {
            let (tx, rx) = channel();
            for &pos in chunk {
                let tx = tx.clone();
                let item = &items[pos];
                scope.spawn(move || {
                    let result = run_job(pipeline, item);
                    // Receiver outlives every worker of the scope
                    let _ = tx.send((pos, result));
                });
            }
            drop(tx);

            for (pos, result) in rx {
                let item = &items[pos];
                if emitter.cancel.is_cancelled() {
                    debug!("Discarding result for {} after cancellation", item.filename);
                    continue;
                }
                emitter.completed += 1;
                emitter.progress(emitter.completed, item, Phase::Completed);
                emitter.outcome(pos, item, result);
            }
        });
    }
}

/// Runs the batch on its own thread and returns the event receiver.
pub fn spawn_batch<P, S>(
    pipeline: Arc<Pipeline<P, S>>,
    items: Vec<BatchItem>,
    mode: BatchMode,
    cancel: CancelFlag,
) -> Result<(Receiver<StreamEvent>, JoinHandle<BatchSummary>), ValidationError>
where
    P: Recognizer + 'static,
    S: Recognizer + 'static,
{
    check_batch(&*pipeline, &items)?;
    let (tx, rx) = channel();
    let handle = thread::spawn(move || run_batch(&*pipeline, items, mode, &tx, &cancel));
    Ok((rx, handle))
}
