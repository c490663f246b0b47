//! Export interfaces and the finished-span payload.

use crate::common::{InstrumentationScope, KeyValue};
use crate::error::{TraceError, TraceResult};
use crate::resource::Resource;
use crate::trace::{SpanContext, SpanEvents, SpanId, SpanKind, SpanLinks, Status};
use futures_util::future::BoxFuture;
use std::borrow::Cow;
use std::fmt::Debug;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// Describes the result of an export.
pub type ExportResult = TraceResult<()>;

/// The interface that protocol-specific exporters implement so they can be
/// plugged into a processor.
///
/// The item type `T` is the finished telemetry payload, [`SpanData`] for
/// traces. Exporters are expected to be simple encoders and transmitters;
/// retry logic is their own responsibility.
pub trait Exporter<T>: Send + Sync + Debug {
    /// Exports a batch of finished items.
    ///
    /// This function is never called concurrently for the same exporter
    /// instance. It must not block indefinitely; the calling processor
    /// bounds each call with its configured export timeout and treats an
    /// overrun as a failed attempt.
    fn export(&mut self, batch: Vec<T>) -> BoxFuture<'static, ExportResult>;

    /// Shuts down the exporter. Called exactly once, after the final drain.
    /// Subsequent `export` calls are not allowed.
    fn shutdown(&mut self) -> TraceResult<()> {
        Ok(())
    }

    /// Set the resource describing the entity that produces the telemetry.
    fn set_resource(&mut self, _resource: &Resource) {}
}

/// `SpanData` contains all the information collected by a span and is the
/// payload handed to span exporters.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanData {
    /// Exportable `SpanContext`
    pub span_context: SpanContext,
    /// Span parent id
    pub parent_span_id: SpanId,
    /// Span kind
    pub span_kind: SpanKind,
    /// Span name
    pub name: Cow<'static, str>,
    /// Span start time
    pub start_time: SystemTime,
    /// Span end time
    pub end_time: SystemTime,
    /// Span attributes, in insertion order
    pub attributes: Vec<KeyValue>,
    /// The number of attributes that were above the configured limit, and
    /// thus dropped.
    pub dropped_attributes_count: u32,
    /// Span events
    pub events: SpanEvents,
    /// Span links
    pub links: SpanLinks,
    /// Span status
    pub status: Status,
    /// Instrumentation library that produced this span
    pub instrumentation_scope: InstrumentationScope,
}

/// An in-memory exporter that stores finished spans for inspection, mainly
/// useful in tests.
///
/// Cloning shares the underlying storage.
///
/// # Example
///
/// ```
/// use tracekit::trace::{InMemorySpanExporter, TracerProvider};
///
/// let exporter = InMemorySpanExporter::default();
/// let provider = TracerProvider::builder()
///     .with_simple_exporter(exporter.clone())
///     .build();
///
/// let tracer = provider.tracer("example");
/// tracer.start("operation").end();
///
/// let spans = exporter.get_finished_spans().unwrap();
/// assert_eq!(spans.len(), 1);
/// # provider.shutdown().unwrap();
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemorySpanExporter {
    spans: Arc<Mutex<Vec<SpanData>>>,
    resource: Arc<Mutex<Resource>>,
}

impl InMemorySpanExporter {
    /// Returns a copy of the finished spans received so far.
    pub fn get_finished_spans(&self) -> TraceResult<Vec<SpanData>> {
        self.spans
            .lock()
            .map(|spans| spans.clone())
            .map_err(|err| TraceError::internal(err.to_string()))
    }

    /// Clears the stored spans.
    pub fn reset(&self) {
        if let Ok(mut spans) = self.spans.lock() {
            spans.clear()
        }
    }

    /// The resource most recently configured on this exporter.
    pub fn resource(&self) -> Resource {
        self.resource
            .lock()
            .map(|resource| resource.clone())
            .unwrap_or_default()
    }
}

impl Exporter<SpanData> for InMemorySpanExporter {
    fn export(&mut self, mut batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        let result = self
            .spans
            .lock()
            .map(|mut spans| spans.append(&mut batch))
            .map_err(|err| TraceError::internal(err.to_string()));
        Box::pin(std::future::ready(result))
    }

    fn shutdown(&mut self) -> TraceResult<()> {
        self.reset();
        Ok(())
    }

    fn set_resource(&mut self, resource: &Resource) {
        if let Ok(mut stored) = self.resource.lock() {
            *stored = resource.clone();
        }
    }
}

/// A sampled span payload for exercising processors in tests.
#[cfg(test)]
pub(crate) fn span_data_for_test(name: &'static str) -> SpanData {
    use crate::trace::{TraceFlags, TraceId, TraceState};

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
        name: Cow::Borrowed(name),
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
