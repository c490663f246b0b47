//! Span processors: the hooks between span completion and exporters.

use crate::context::Context;
use crate::error::{TraceError, TraceResult};
use crate::resource::Resource;
use crate::trace::export::{Exporter, SpanData};
use crate::trace::span::Span;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Interface for hooking into the span lifecycle.
///
/// Implementations receive every recording span when it starts and its
/// immutable [`SpanData`] when it ends, and can forward the data to an
/// [`Exporter`].
pub trait SpanProcessor: Send + Sync + fmt::Debug {
    /// Called when a recording span is started. The context carries the
    /// parent that was used, if any.
    fn on_start(&self, span: &mut Span, cx: &Context);

    /// Called when a span ends. Only sampled spans are forwarded to
    /// exporters.
    fn on_end(&self, span: SpanData);

    /// Export all spans received but not yet exported.
    fn force_flush(&self) -> TraceResult<()>;

    /// Shuts down the processor, draining pending data and releasing the
    /// exporter. Subsequent calls return [`TraceError::AlreadyShutdown`];
    /// subsequent `on_end` calls are safe no-ops.
    fn shutdown(&self) -> TraceResult<()>;

    /// Set the resource describing the producing entity. Called once at
    /// provider construction, before any span is processed.
    fn set_resource(&mut self, _resource: &Resource) {}
}

/// A processor that exports each item synchronously as it ends.
///
/// Every `emit` blocks the calling thread on the exporter, so this is meant
/// for tests and for environments where background threads are undesirable.
#[derive(Debug)]
pub struct SimpleExportProcessor<T> {
    exporter: Mutex<Box<dyn Exporter<T>>>,
    is_shutdown: AtomicBool,
}

/// A [`SimpleExportProcessor`] for spans.
pub type SimpleSpanProcessor = SimpleExportProcessor<SpanData>;

impl<T: Send + fmt::Debug + 'static> SimpleExportProcessor<T> {
    /// Create a new processor around the given exporter.
    pub fn new<E: Exporter<T> + 'static>(exporter: E) -> Self {
        SimpleExportProcessor {
            exporter: Mutex::new(Box::new(exporter)),
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// Export a single finished item, blocking until the exporter returns.
    pub fn emit(&self, item: T) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            crate::sdk_debug!(name: "SimpleProcessor.EmitAfterShutdown");
            return;
        }

        let result = self
            .exporter
            .lock()
            .map_err(|err| TraceError::internal(err.to_string()))
            .and_then(|mut exporter| {
                futures_executor::block_on(exporter.export(vec![item]))
            });
        if let Err(err) = result {
            crate::sdk_error!(name: "SimpleProcessor.ExportFailed", message = err.to_string());
        }
    }

    /// Nothing is buffered, so flushing always succeeds immediately.
    pub fn force_flush(&self) -> TraceResult<()> {
        Ok(())
    }

    /// Shuts down the wrapped exporter.
    pub fn shutdown(&self) -> TraceResult<()> {
        if self
            .is_shutdown
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(TraceError::AlreadyShutdown);
        }
        self.exporter
            .lock()
            .map_err(|err| TraceError::internal(err.to_string()))
            .and_then(|mut exporter| exporter.shutdown())
    }
}

impl SpanProcessor for SimpleSpanProcessor {
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
        SimpleExportProcessor::force_flush(self)
    }

    fn shutdown(&self) -> TraceResult<()> {
        SimpleExportProcessor::shutdown(self)
    }

    fn set_resource(&mut self, resource: &Resource) {
        if let Ok(mut exporter) = self.exporter.lock() {
            exporter.set_resource(resource);
        }
    }
}

/// Fans span lifecycle calls out to an ordered list of processors.
///
/// `on_start` and `on_end` are delivered in registration order. `shutdown`
/// and `force_flush` are delivered to every child even when an earlier one
/// fails or panics; failures are collected into a single error.
#[derive(Debug, Default)]
pub struct CompositeSpanProcessor {
    processors: Vec<Box<dyn SpanProcessor>>,
}

impl CompositeSpanProcessor {
    /// Create a composite over the given processors.
    pub fn new(processors: Vec<Box<dyn SpanProcessor>>) -> Self {
        CompositeSpanProcessor { processors }
    }

    /// Append a processor, to be invoked after the existing ones.
    pub fn push(&mut self, processor: Box<dyn SpanProcessor>) {
        self.processors.push(processor)
    }

    /// The number of registered processors.
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    /// Returns `true` if no processors are registered.
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    fn for_each_collecting<F>(&self, operation: &'static str, f: F) -> TraceResult<()>
    where
        F: Fn(&dyn SpanProcessor) -> TraceResult<()>,
    {
        let mut failures = Vec::new();
        for processor in &self.processors {
            match catch_unwind(AssertUnwindSafe(|| f(processor.as_ref()))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    crate::sdk_warn!(name: "CompositeProcessor.ChildFailed",
                        operation = operation,
                        message = err.to_string());
                    failures.push(err.to_string());
                }
                Err(_) => {
                    crate::sdk_error!(name: "CompositeProcessor.ChildPanicked",
                        operation = operation);
                    failures.push(format!("{operation} panicked"));
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TraceError::InternalFailure(failures.join("; ")))
        }
    }
}

impl SpanProcessor for CompositeSpanProcessor {
    fn on_start(&self, span: &mut Span, cx: &Context) {
        for processor in &self.processors {
            processor.on_start(span, cx)
        }
    }

    fn on_end(&self, span: SpanData) {
        match self.processors.as_slice() {
            [] => {}
            [processor] => processor.on_end(span),
            [front @ .., last] => {
                for processor in front {
                    processor.on_end(span.clone())
                }
                last.on_end(span)
            }
        }
    }

    fn force_flush(&self) -> TraceResult<()> {
        self.for_each_collecting("force_flush", |processor| processor.force_flush())
    }

    fn shutdown(&self) -> TraceResult<()> {
        self.for_each_collecting("shutdown", |processor| processor.shutdown())
    }

    fn set_resource(&mut self, resource: &Resource) {
        for processor in &mut self.processors {
            processor.set_resource(resource)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::export::InMemorySpanExporter;
    use crate::trace::{
        SpanContext, SpanEvents, SpanId, SpanKind, SpanLinks, Status, TraceFlags, TraceId,
        TraceState,
    };
    use crate::InstrumentationScope;
    use std::borrow::Cow;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::SystemTime;

    fn sampled_span_data() -> SpanData {
        SpanData {
            span_context: SpanContext::new(
                TraceId::from(1u128),
                SpanId::from(1u64),
                TraceFlags::SAMPLED,
                false,
                TraceState::default(),
            ),
            parent_span_id: SpanId::INVALID,
            span_kind: SpanKind::Internal,
            name: Cow::Borrowed("test"),
            start_time: SystemTime::now(),
            end_time: SystemTime::now(),
            attributes: Vec::new(),
            dropped_attributes_count: 0,
            events: SpanEvents::default(),
            links: SpanLinks::default(),
            status: Status::Unset,
            instrumentation_scope: InstrumentationScope::default(),
        }
    }

    fn unsampled_span_data() -> SpanData {
        let mut span = sampled_span_data();
        span.span_context = SpanContext::new(
            TraceId::from(1u128),
            SpanId::from(1u64),
            TraceFlags::default(),
            false,
            TraceState::default(),
        );
        span
    }

    #[derive(Debug)]
    struct CountingProcessor {
        ends: Arc<AtomicUsize>,
        shutdowns: Arc<AtomicUsize>,
        fail_shutdown: bool,
    }

    impl SpanProcessor for CountingProcessor {
        fn on_start(&self, _span: &mut Span, _cx: &Context) {}

        fn on_end(&self, _span: SpanData) {
            self.ends.fetch_add(1, Ordering::SeqCst);
        }

        fn force_flush(&self) -> TraceResult<()> {
            Ok(())
        }

        fn shutdown(&self) -> TraceResult<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            if self.fail_shutdown {
                Err(TraceError::internal("shutdown refused"))
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn simple_processor_exports_sampled_spans() {
        let exporter = InMemorySpanExporter::default();
        let processor = SimpleSpanProcessor::new(exporter.clone());
        processor.on_end(sampled_span_data());
        processor.on_end(unsampled_span_data());
        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
    }

    #[test]
    fn simple_processor_shutdown_is_terminal() {
        let exporter = InMemorySpanExporter::default();
        let processor = SimpleSpanProcessor::new(exporter.clone());
        assert!(SpanProcessor::shutdown(&processor).is_ok());
        assert_eq!(
            SpanProcessor::shutdown(&processor),
            Err(TraceError::AlreadyShutdown)
        );
        // After shutdown, spans are silently discarded.
        processor.on_end(sampled_span_data());
        assert!(exporter.get_finished_spans().unwrap().is_empty());
    }

    #[test]
    fn composite_fans_out_on_end() {
        let ends = Arc::new(AtomicUsize::new(0));
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let composite = CompositeSpanProcessor::new(vec![
            Box::new(CountingProcessor {
                ends: ends.clone(),
                shutdowns: shutdowns.clone(),
                fail_shutdown: false,
            }),
            Box::new(CountingProcessor {
                ends: ends.clone(),
                shutdowns: shutdowns.clone(),
                fail_shutdown: false,
            }),
        ]);
        composite.on_end(sampled_span_data());
        assert_eq!(ends.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn composite_shutdown_reaches_all_children() {
        let ends = Arc::new(AtomicUsize::new(0));
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let composite = CompositeSpanProcessor::new(vec![
            Box::new(CountingProcessor {
                ends: ends.clone(),
                shutdowns: shutdowns.clone(),
                fail_shutdown: true,
            }),
            Box::new(CountingProcessor {
                ends: ends.clone(),
                shutdowns: shutdowns.clone(),
                fail_shutdown: false,
            }),
        ]);
        let result = composite.shutdown();
        assert!(result.is_err());
        assert_eq!(shutdowns.load(Ordering::SeqCst), 2);
    }

    #[derive(Debug)]
    struct PanickingProcessor;

    impl SpanProcessor for PanickingProcessor {
        fn on_start(&self, _span: &mut Span, _cx: &Context) {}
        fn on_end(&self, _span: SpanData) {}
        fn force_flush(&self) -> TraceResult<()> {
            Ok(())
        }
        fn shutdown(&self) -> TraceResult<()> {
            panic!("misbehaving plugin")
        }
    }

    #[test]
    fn composite_contains_panicking_child() {
        let shutdowns = Arc::new(AtomicUsize::new(0));
        let composite = CompositeSpanProcessor::new(vec![
            Box::new(PanickingProcessor),
            Box::new(CountingProcessor {
                ends: Arc::new(AtomicUsize::new(0)),
                shutdowns: shutdowns.clone(),
                fail_shutdown: false,
            }),
        ]);
        assert!(composite.shutdown().is_err());
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }
}
