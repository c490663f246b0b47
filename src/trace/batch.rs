//! Batching export processor.
//!
//! Finished items are pushed onto a bounded queue by the producing threads
//! and flushed to the exporter in batches, either when the queue crosses the
//! batch threshold, on a periodic timer, or on an explicit flush or
//! shutdown. When the queue is full new items are dropped and counted rather
//! than blocking the producer.

use crate::context::Context;
use crate::error::{TraceError, TraceResult};
use crate::resource::Resource;
use crate::trace::export::{Exporter, SpanData};
use crate::trace::processor::SpanProcessor;
use crate::trace::span::Span;
use futures_timer::Delay;
use futures_util::future::FutureExt;
use futures_util::select;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

/// Maximum queue size for the batch processor.
pub const OTEL_BSP_MAX_QUEUE_SIZE: &str = "OTEL_BSP_MAX_QUEUE_SIZE";
/// Default maximum queue size.
pub const OTEL_BSP_MAX_QUEUE_SIZE_DEFAULT: usize = 2_048;
/// Delay interval, in milliseconds, between two consecutive timer flushes.
pub const OTEL_BSP_SCHEDULE_DELAY: &str = "OTEL_BSP_SCHEDULE_DELAY";
/// Default delay interval between two consecutive timer flushes.
pub const OTEL_BSP_SCHEDULE_DELAY_DEFAULT: u64 = 5_000;
/// Maximum batch size; must be less than or equal to the maximum queue size.
pub const OTEL_BSP_MAX_EXPORT_BATCH_SIZE: &str = "OTEL_BSP_MAX_EXPORT_BATCH_SIZE";
/// Default maximum batch size.
pub const OTEL_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT: usize = 512;
/// Maximum time, in milliseconds, allowed for a single export call.
pub const OTEL_BSP_EXPORT_TIMEOUT: &str = "OTEL_BSP_EXPORT_TIMEOUT";
/// Default maximum allowed export time.
pub const OTEL_BSP_EXPORT_TIMEOUT_DEFAULT: u64 = 30_000;

/// Validated configuration for a [`BatchExportProcessor`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    pub(crate) max_queue_size: usize,
    pub(crate) scheduled_delay: Duration,
    pub(crate) max_export_batch_size: usize,
    pub(crate) max_export_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        // Built-in defaults and sanitized env overrides always validate.
        BatchConfigBuilder::default()
            .build()
            .expect("default batch configuration is valid")
    }
}

/// A builder for [`BatchConfig`].
#[derive(Clone, Debug)]
pub struct BatchConfigBuilder {
    max_queue_size: usize,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
    max_export_timeout: Duration,
}

impl Default for BatchConfigBuilder {
    /// Creates a builder with the built-in defaults, overridden by any
    /// `OTEL_BSP_*` environment variables.
    ///
    /// Env values that do not parse as positive integers are ignored with a
    /// warning, and a batch size above the queue size is clamped down to it.
    fn default() -> Self {
        BatchConfigBuilder {
            max_queue_size: OTEL_BSP_MAX_QUEUE_SIZE_DEFAULT,
            scheduled_delay: Duration::from_millis(OTEL_BSP_SCHEDULE_DELAY_DEFAULT),
            max_export_batch_size: OTEL_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT,
            max_export_timeout: Duration::from_millis(OTEL_BSP_EXPORT_TIMEOUT_DEFAULT),
        }
        .init_from_env_vars()
    }
}

impl BatchConfigBuilder {
    /// Set the maximum number of items buffered before new ones are dropped.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Set the maximum number of items per exported batch.
    pub fn with_max_export_batch_size(mut self, max_export_batch_size: usize) -> Self {
        self.max_export_batch_size = max_export_batch_size;
        self
    }

    /// Set the interval between two consecutive timer flushes.
    pub fn with_scheduled_delay(mut self, scheduled_delay: Duration) -> Self {
        self.scheduled_delay = scheduled_delay;
        self
    }

    /// Set the maximum duration of a single export call.
    pub fn with_max_export_timeout(mut self, max_export_timeout: Duration) -> Self {
        self.max_export_timeout = max_export_timeout;
        self
    }

    /// Validates the settings and builds a [`BatchConfig`].
    pub fn build(self) -> TraceResult<BatchConfig> {
        if self.max_queue_size == 0 {
            return Err(TraceError::InvalidConfig(
                "max_queue_size must be positive".to_string(),
            ));
        }
        if self.max_export_batch_size == 0 {
            return Err(TraceError::InvalidConfig(
                "max_export_batch_size must be positive".to_string(),
            ));
        }
        if self.max_export_batch_size > self.max_queue_size {
            return Err(TraceError::InvalidConfig(format!(
                "max_export_batch_size ({}) cannot exceed max_queue_size ({})",
                self.max_export_batch_size, self.max_queue_size
            )));
        }
        if self.scheduled_delay.is_zero() {
            return Err(TraceError::InvalidConfig(
                "scheduled_delay must be positive".to_string(),
            ));
        }

        Ok(BatchConfig {
            max_queue_size: self.max_queue_size,
            scheduled_delay: self.scheduled_delay,
            max_export_batch_size: self.max_export_batch_size,
            max_export_timeout: self.max_export_timeout,
        })
    }

    fn init_from_env_vars(mut self) -> Self {
        if let Some(max_queue_size) = parse_positive_env(OTEL_BSP_MAX_QUEUE_SIZE) {
            self.max_queue_size = max_queue_size;
        }
        if let Some(scheduled_delay) = parse_positive_env(OTEL_BSP_SCHEDULE_DELAY) {
            self.scheduled_delay = Duration::from_millis(scheduled_delay as u64);
        }
        if let Some(max_export_batch_size) = parse_positive_env(OTEL_BSP_MAX_EXPORT_BATCH_SIZE) {
            self.max_export_batch_size = max_export_batch_size;
        }
        if let Some(max_export_timeout) = parse_positive_env(OTEL_BSP_EXPORT_TIMEOUT) {
            self.max_export_timeout = Duration::from_millis(max_export_timeout as u64);
        }

        if self.max_export_batch_size > self.max_queue_size {
            crate::sdk_warn!(name: "BatchConfig.BatchSizeClamped",
                max_export_batch_size = self.max_export_batch_size,
                max_queue_size = self.max_queue_size);
            self.max_export_batch_size = self.max_queue_size;
        }

        self
    }
}

fn parse_positive_env(name: &str) -> Option<usize> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<usize>() {
        Ok(value) if value > 0 => Some(value),
        _ => {
            crate::sdk_warn!(name: "BatchConfig.InvalidEnvValue", env_var = name, value = raw);
            None
        }
    }
}

#[derive(Debug)]
struct BatchInner<T> {
    sender: Sender<T>,
    receiver: Mutex<Receiver<T>>,
    /// Approximate number of queued items; check-then-increment may
    /// overshoot the limit by a few items under contention.
    queue_size: AtomicUsize,
    dropped_count: AtomicUsize,
    /// Held by whichever thread is currently flushing; opportunistic
    /// flushes skip out instead of queueing behind it.
    export_gate: Mutex<()>,
    exporter: Mutex<Box<dyn Exporter<T>>>,
    config: BatchConfig,
    shutdown_started: AtomicBool,
    is_shutdown: AtomicBool,
}

/// A processor that batches finished items and exports them off the hot
/// path.
///
/// Producers enqueue without blocking. A dedicated timer thread flushes
/// every `scheduled_delay`, and the thread that pushes the queue over the
/// batch threshold flushes inline. Each export call is bounded by
/// `max_export_timeout`, capped by whatever remains of a caller-supplied
/// flush or shutdown deadline; an internal overrun is logged and ends that
/// flush pass without failing the caller, while an exhausted caller
/// deadline surfaces as [`TraceError::Timeout`].
#[derive(Debug)]
pub struct BatchExportProcessor<T: Send + fmt::Debug + 'static> {
    inner: Arc<BatchInner<T>>,
    timer_control: Sender<()>,
    timer_handle: Mutex<Option<thread::JoinHandle<()>>>,
}

/// A [`BatchExportProcessor`] for spans.
pub type BatchSpanProcessor = BatchExportProcessor<SpanData>;

impl<T: Send + fmt::Debug + 'static> BatchExportProcessor<T> {
    /// Create a new batch processor exporting through `exporter`.
    pub fn new<E: Exporter<T> + 'static>(exporter: E, config: BatchConfig) -> Self {
        let (sender, receiver) = mpsc::channel();
        let inner = Arc::new(BatchInner {
            sender,
            receiver: Mutex::new(receiver),
            queue_size: AtomicUsize::new(0),
            dropped_count: AtomicUsize::new(0),
            export_gate: Mutex::new(()),
            exporter: Mutex::new(Box::new(exporter)),
            config,
            shutdown_started: AtomicBool::new(false),
            is_shutdown: AtomicBool::new(false),
        });

        let (timer_control, timer_signal) = mpsc::channel::<()>();
        let timer_inner = Arc::clone(&inner);
        let timer_handle = thread::Builder::new()
            .name("tracekit-batch-timer".to_string())
            .spawn(move || loop {
                match timer_signal.recv_timeout(timer_inner.config.scheduled_delay) {
                    Err(RecvTimeoutError::Timeout) => {
                        let _ = timer_inner.flush(false, None);
                    }
                    // Explicit stop signal, or the processor was dropped.
                    _ => break,
                }
            })
            .expect("Failed to spawn thread");

        BatchExportProcessor {
            inner,
            timer_control,
            timer_handle: Mutex::new(Some(timer_handle)),
        }
    }

    /// Enqueue a finished item without blocking.
    ///
    /// Drops the item if the queue is full or the processor has shut down.
    pub fn emit(&self, item: T) {
        self.inner.emit(item)
    }

    /// The number of items dropped due to a full queue.
    pub fn dropped_count(&self) -> usize {
        self.inner.dropped_count.load(Ordering::Relaxed)
    }

    /// Export everything currently queued, blocking until done.
    pub fn force_flush(&self) -> TraceResult<()> {
        if self.inner.shutdown_started.load(Ordering::SeqCst) {
            return Err(TraceError::AlreadyShutdown);
        }
        self.inner.flush(true, None)
    }

    /// Like [`force_flush`](Self::force_flush), but gives up with
    /// [`TraceError::Timeout`] once `timeout` has elapsed.
    pub fn force_flush_with_timeout(&self, timeout: Duration) -> TraceResult<()> {
        if self.inner.shutdown_started.load(Ordering::SeqCst) {
            return Err(TraceError::AlreadyShutdown);
        }
        self.inner.flush(true, Some(timeout))
    }

    /// Shuts down the processor with the configured export timeout as the
    /// overall deadline.
    pub fn shutdown(&self) -> TraceResult<()> {
        self.shutdown_with_timeout(self.inner.config.max_export_timeout)
    }

    /// Stops the timer, drains the queue, and shuts down the exporter.
    ///
    /// Only the first call does any work; later calls return
    /// [`TraceError::AlreadyShutdown`].
    pub fn shutdown_with_timeout(&self, timeout: Duration) -> TraceResult<()> {
        if self.inner.shutdown_started.swap(true, Ordering::SeqCst) {
            return Err(TraceError::AlreadyShutdown);
        }

        // Stop the timer first so a tick cannot contend for the gate while
        // the final drain runs.
        let _ = self.timer_control.send(());
        if let Ok(mut handle) = self.timer_handle.lock() {
            if let Some(handle) = handle.take() {
                if handle.join().is_err() {
                    crate::sdk_error!(name: "BatchProcessor.TimerThreadPanicked");
                }
            }
        }

        let flush_result = self.inner.flush(true, Some(timeout));
        let shutdown_result = self
            .inner
            .exporter
            .lock()
            .map_err(|err| TraceError::internal(err.to_string()))
            .and_then(|mut exporter| exporter.shutdown());
        self.inner.is_shutdown.store(true, Ordering::SeqCst);

        flush_result.and(shutdown_result)
    }
}

impl<T: Send + fmt::Debug + 'static> BatchInner<T> {
    fn emit(&self, item: T) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            crate::sdk_debug!(name: "BatchProcessor.EmitAfterShutdown");
            return;
        }

        if self.queue_size.load(Ordering::Relaxed) >= self.config.max_queue_size {
            let previously_dropped = self.dropped_count.fetch_add(1, Ordering::Relaxed);
            // Log the first drop only, to avoid flooding while saturated.
            if previously_dropped == 0 {
                crate::sdk_warn!(name: "BatchProcessor.QueueFull",
                    message = "items are dropped until the queue drains");
            }
            return;
        }

        let new_size = self.queue_size.fetch_add(1, Ordering::Relaxed) + 1;
        if self.sender.send(item).is_err() {
            self.queue_size.fetch_sub(1, Ordering::Relaxed);
            return;
        }

        if new_size >= self.config.max_export_batch_size {
            let _ = self.flush(false, None);
        }
    }

    /// Pulls queued items into batches and exports them.
    ///
    /// With `drain` set, keeps going until the queue is empty or `timeout`
    /// elapses; otherwise exports one batch and continues only while at
    /// least a full batch remains. A non-draining call returns immediately
    /// if another flush is already in progress.
    fn flush(&self, drain: bool, timeout: Option<Duration>) -> TraceResult<()> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);

        let _gate = if drain {
            self.export_gate
                .lock()
                .map_err(|err| TraceError::internal(err.to_string()))?
        } else {
            match self.export_gate.try_lock() {
                Ok(gate) => gate,
                Err(TryLockError::WouldBlock) => return Ok(()),
                Err(TryLockError::Poisoned(err)) => {
                    return Err(TraceError::internal(err.to_string()))
                }
            }
        };

        let receiver = self
            .receiver
            .lock()
            .map_err(|err| TraceError::internal(err.to_string()))?;
        let max_batch = self.config.max_export_batch_size;
        let mut batch = Vec::with_capacity(max_batch);

        loop {
            while batch.len() < max_batch {
                match receiver.try_recv() {
                    Ok(item) => {
                        self.queue_size.fetch_sub(1, Ordering::Relaxed);
                        batch.push(item);
                    }
                    Err(_) => break,
                }
            }
            if batch.is_empty() {
                break;
            }

            // Each export call gets at most the configured exporter timeout,
            // capped by whatever remains of the caller's deadline.
            let per_call_timeout = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(TraceError::Timeout(timeout.unwrap_or_default()));
                    }
                    self.config.max_export_timeout.min(remaining)
                }
                None => self.config.max_export_timeout,
            };

            let batch_size = batch.len();
            let to_export = std::mem::replace(&mut batch, Vec::with_capacity(max_batch));
            let result = self
                .exporter
                .lock()
                .map_err(|err| TraceError::internal(err.to_string()))
                .and_then(|mut exporter| {
                    export_with_timeout(&mut **exporter, to_export, per_call_timeout)
                });

            match result {
                Ok(()) => {
                    crate::sdk_debug!(name: "BatchProcessor.BatchExported", batch_size = batch_size);
                }
                Err(TraceError::Timeout(elapsed)) => {
                    // The items handed over are lost; stop this pass rather
                    // than pile further timeouts on a stuck exporter.
                    crate::sdk_warn!(name: "BatchProcessor.ExportTimedOut",
                        batch_size = batch_size,
                        timeout_millis = elapsed.as_millis());
                    if let Some(deadline) = deadline {
                        if Instant::now() >= deadline {
                            return Err(TraceError::Timeout(timeout.unwrap_or_default()));
                        }
                    }
                    break;
                }
                Err(err) => {
                    // Failed batches are not retried.
                    crate::sdk_warn!(name: "BatchProcessor.ExportFailed",
                        batch_size = batch_size,
                        message = err.to_string());
                }
            }

            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    return Err(TraceError::Timeout(timeout.unwrap_or_default()));
                }
            }

            let remaining = self.queue_size.load(Ordering::Relaxed);
            if drain {
                if remaining == 0 {
                    break;
                }
            } else if remaining < max_batch {
                break;
            }
        }

        Ok(())
    }
}

/// Drives the export future, racing it against `timeout`.
fn export_with_timeout<T>(
    exporter: &mut dyn Exporter<T>,
    batch: Vec<T>,
    timeout: Duration,
) -> TraceResult<()> {
    futures_executor::block_on(async {
        let mut export = exporter.export(batch).fuse();
        let mut deadline = Delay::new(timeout).fuse();
        select! {
            result = export => result,
            _ = deadline => Err(TraceError::Timeout(timeout)),
        }
    })
}

impl SpanProcessor for BatchSpanProcessor {
    fn on_start(&self, _span: &mut Span, _cx: &Context) {
        // Ignored
    }

    fn on_end(&self, span: SpanData) {
        if !span.span_context.is_sampled() {
            return;
        }
        self.emit(span);
    }

    fn force_flush(&self) -> TraceResult<()> {
        BatchExportProcessor::force_flush(self)
    }

    fn shutdown(&self) -> TraceResult<()> {
        BatchExportProcessor::shutdown(self)
    }

    fn set_resource(&mut self, resource: &Resource) {
        if let Ok(mut exporter) = self.inner.exporter.lock() {
            exporter.set_resource(resource);
        }
    }
}
