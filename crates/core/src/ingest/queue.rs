//! Bounded ingestion queue with a single sequential worker.

use async_trait::async_trait;
use futures::FutureExt;
use serde::Serialize;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::{EnqueueError, IngestError, IngestOutcome, ScrapedItem};
use crate::metrics::{INGEST_DURATION, INGEST_FAILURES, INGEST_OUTCOMES, QUEUE_DEPTH};

/// Processes one item of a pipeline.
#[async_trait]
pub trait ItemHandler: Send + Sync {
    /// Pipeline name, used in logs and metric labels.
    fn name(&self) -> &str;

    async fn process(&self, item: ScrapedItem) -> Result<IngestOutcome, IngestError>;
}

/// Snapshot of queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub enqueued: u64,
    pub processed: u64,
    pub inserted: u64,
    pub replaced: u64,
    pub skipped: u64,
    pub deferred: u64,
    pub dropped: u64,
    /// Items whose handler returned an error.
    pub failed: u64,
    /// Items whose handler panicked.
    pub panicked: u64,
}

#[derive(Debug, Default)]
struct Counters {
    enqueued: AtomicU64,
    processed: AtomicU64,
    inserted: AtomicU64,
    replaced: AtomicU64,
    skipped: AtomicU64,
    deferred: AtomicU64,
    dropped: AtomicU64,
    failed: AtomicU64,
    panicked: AtomicU64,
}

impl Counters {
    fn record(&self, outcome: &IngestOutcome) {
        let counter = match outcome {
            IngestOutcome::Insert => &self.inserted,
            IngestOutcome::Replace { .. } => &self.replaced,
            IngestOutcome::Skip => &self.skipped,
            IngestOutcome::Deferred { .. } => &self.deferred,
            IngestOutcome::Dropped(_) => &self.dropped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> QueueStats {
        QueueStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            inserted: self.inserted.load(Ordering::Relaxed),
            replaced: self.replaced.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            deferred: self.deferred.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
        }
    }
}

/// Buffers items from any number of producers and feeds them, in arrival
/// order, to one worker that runs the handler strictly sequentially.
///
/// Items accepted by `enqueue` are always processed: `shutdown` closes the
/// queue to new items, then waits for the worker to drain the buffer.
pub struct IngestQueue<H: ItemHandler + 'static> {
    handler: Arc<H>,
    sender: Mutex<Option<mpsc::Sender<ScrapedItem>>>,
    receiver: Mutex<Option<mpsc::Receiver<ScrapedItem>>>,
    worker: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
    closing: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
    counters: Arc<Counters>,
}

impl<H: ItemHandler + 'static> IngestQueue<H> {
    pub fn new(handler: H, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            handler: Arc::new(handler),
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            worker: tokio::sync::Mutex::new(None),
            running: AtomicBool::new(false),
            closing: AtomicBool::new(false),
            shutdown_tx,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn name(&self) -> &str {
        self.handler.name()
    }

    /// Hand an item over without waiting. The item is returned when the
    /// buffer is full or the queue is shut down.
    pub fn enqueue(&self, item: ScrapedItem) -> Result<(), EnqueueError<ScrapedItem>> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = sender.as_ref() else {
            return Err(EnqueueError::Closed(item));
        };
        match tx.try_send(item) {
            Ok(()) => {
                self.accepted();
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(item)) => Err(EnqueueError::Full(item)),
            Err(mpsc::error::TrySendError::Closed(item)) => Err(EnqueueError::Closed(item)),
        }
    }

    /// Hand an item over, waiting for buffer space.
    ///
    /// A caller still waiting when `shutdown` begins gets its item back.
    pub async fn enqueue_wait(&self, item: ScrapedItem) -> Result<(), EnqueueError<ScrapedItem>> {
        let tx = {
            let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
            match sender.as_ref() {
                Some(tx) => tx.clone(),
                None => return Err(EnqueueError::Closed(item)),
            }
        };
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if self.closing.load(Ordering::SeqCst) {
            return Err(EnqueueError::Closed(item));
        }

        let permit = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => return Err(EnqueueError::Closed(item)),
            permit = tx.reserve() => match permit {
                Ok(permit) => permit,
                Err(_) => return Err(EnqueueError::Closed(item)),
            },
        };
        if self.closing.load(Ordering::SeqCst) {
            return Err(EnqueueError::Closed(item));
        }
        permit.send(item);
        self.accepted();
        Ok(())
    }

    fn accepted(&self) {
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        QUEUE_DEPTH.with_label_values(&[self.name()]).inc();
    }

    /// Start the worker.
    pub async fn start(&self) {
        // Held until the handle is stored so `shutdown` always finds it.
        let mut worker = self.worker.lock().await;
        if self.running.swap(true, Ordering::SeqCst) {
            warn!(pipeline = %self.name(), "Ingest queue already running");
            return;
        }

        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut rx) = receiver else {
            warn!(pipeline = %self.name(), "Ingest queue was already shut down");
            return;
        };

        let handler = Arc::clone(&self.handler);
        let counters = Arc::clone(&self.counters);

        let handle = tokio::spawn(async move {
            info!(pipeline = %handler.name(), "Ingest worker started");
            while let Some(item) = rx.recv().await {
                process_item(handler.as_ref(), &counters, item).await;
            }
            info!(pipeline = %handler.name(), "Ingest worker stopped");
        });

        *worker = Some(handle);
    }

    /// Stop accepting items, drain the buffer, and join the worker.
    ///
    /// A queue that was never started is started here so buffered items
    /// are still processed.
    pub async fn shutdown(&self) {
        self.closing.store(true, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(());
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if sender.is_none() {
            debug!(pipeline = %self.name(), "Ingest queue already closed");
        }
        drop(sender);

        if !self.running.load(Ordering::SeqCst) {
            self.start().await;
        }

        info!(pipeline = %self.name(), "Draining ingest queue");
        let handle = self.worker.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!(pipeline = %self.name(), error = %e, "Ingest worker terminated abnormally");
            }
        }
        self.running.store(false, Ordering::SeqCst);

        let stats = self.stats();
        info!(
            pipeline = %self.name(),
            processed = stats.processed,
            inserted = stats.inserted,
            replaced = stats.replaced,
            skipped = stats.skipped,
            deferred = stats.deferred,
            dropped = stats.dropped,
            failed = stats.failed,
            panicked = stats.panicked,
            "Ingest queue shut down"
        );
    }

    pub fn stats(&self) -> QueueStats {
        self.counters.snapshot()
    }
}

async fn process_item<H: ItemHandler>(handler: &H, counters: &Counters, item: ScrapedItem) {
    let pipeline = handler.name();
    QUEUE_DEPTH.with_label_values(&[pipeline]).dec();

    let title = item.title.clone().unwrap_or_default();
    let timer = INGEST_DURATION
        .with_label_values(&[pipeline])
        .start_timer();
    let result = AssertUnwindSafe(handler.process(item)).catch_unwind().await;
    timer.observe_duration();
    counters.processed.fetch_add(1, Ordering::Relaxed);

    match result {
        Ok(Ok(outcome)) => {
            counters.record(&outcome);
            INGEST_OUTCOMES
                .with_label_values(&[pipeline, outcome.label()])
                .inc();
            match &outcome {
                IngestOutcome::Dropped(reason) => {
                    warn!(pipeline, title = %title, reason = %reason, "Item dropped")
                }
                IngestOutcome::Deferred { reason } => {
                    info!(pipeline, title = %title, reason = %reason, "Item deferred")
                }
                other => debug!(pipeline, title = %title, outcome = other.label(), "Item processed"),
            }
        }
        Ok(Err(e)) => {
            counters.failed.fetch_add(1, Ordering::Relaxed);
            INGEST_FAILURES.with_label_values(&[pipeline, "error"]).inc();
            error!(pipeline, title = %title, error = %e, "Item processing failed");
        }
        Err(panic) => {
            counters.panicked.fetch_add(1, Ordering::Relaxed);
            INGEST_FAILURES.with_label_values(&[pipeline, "panic"]).inc();
            error!(
                pipeline,
                title = %title,
                panic = %panic_message(panic.as_ref()),
                "Item handler panicked"
            );
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
