//! The SDK span: mutable while active, immutable once ended.

use crate::common::KeyValue;
use crate::trace::evicted::{EvictedHashMap, EvictedQueue};
use crate::trace::export::SpanData;
use crate::trace::tracer::Tracer;
use crate::trace::{SpanContext, SpanId, SpanLimits};
use std::borrow::Cow;
use std::error::Error;
use std::fmt;
use std::ops::Deref;
use std::time::SystemTime;

/// Describes the relationship between the span and its caller.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SpanKind {
    /// Outgoing synchronous remote call.
    Client,
    /// Incoming synchronous remote call.
    Server,
    /// Creation of an async job or message.
    Producer,
    /// Processing of an async job or message.
    Consumer,
    /// An operation internal to the application.
    Internal,
}

/// The status of a [`Span`].
///
/// Variants are ordered so that comparisons follow status update priority:
/// `Ok` beats `Error` beats `Unset`.
#[derive(Clone, Debug, Default, PartialEq, PartialOrd)]
pub enum Status {
    /// The default status.
    #[default]
    Unset,
    /// The operation contains an error.
    Error {
        /// The description of the error
        description: Cow<'static, str>,
    },
    /// The operation has been validated by an application developer or
    /// operator to have completed successfully.
    Ok,
}

impl Status {
    /// Create a new error status with the given description.
    pub fn error(description: impl Into<Cow<'static, str>>) -> Self {
        Status::Error {
            description: description.into(),
        }
    }
}

/// A timestamped annotation on a span.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    /// The name of this event.
    pub name: Cow<'static, str>,
    /// The wall clock time when this event occurred.
    pub timestamp: SystemTime,
    /// The attributes describing this event.
    pub attributes: Vec<KeyValue>,
    /// The number of attributes dropped from this event due to limits.
    pub dropped_attributes_count: u32,
}

impl Event {
    /// Create a new event.
    pub fn new(
        name: impl Into<Cow<'static, str>>,
        timestamp: SystemTime,
        attributes: Vec<KeyValue>,
        dropped_attributes_count: u32,
    ) -> Self {
        Event {
            name: name.into(),
            timestamp,
            attributes,
            dropped_attributes_count,
        }
    }
}

/// A causal reference from one span to another.
#[derive(Clone, Debug, PartialEq)]
pub struct Link {
    /// The span context of the linked span.
    pub span_context: SpanContext,
    /// The attributes describing this link.
    pub attributes: Vec<KeyValue>,
    /// The number of attributes dropped from this link due to limits.
    pub dropped_attributes_count: u32,
}

impl Link {
    /// Create a new link to the given span context.
    pub fn new(span_context: SpanContext, attributes: Vec<KeyValue>) -> Self {
        Link {
            span_context,
            attributes,
            dropped_attributes_count: 0,
        }
    }
}

/// The events recorded by a span, plus the count of evicted ones.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpanEvents {
    /// The recorded events, oldest first.
    pub events: Vec<Event>,
    /// The number of events dropped due to limits.
    pub dropped_count: u32,
}

impl Deref for SpanEvents {
    type Target = Vec<Event>;

    fn deref(&self) -> &Self::Target {
        &self.events
    }
}

/// The links recorded by a span, plus the count of evicted ones.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SpanLinks {
    /// The recorded links, oldest first.
    pub links: Vec<Link>,
    /// The number of links dropped due to limits.
    pub dropped_count: u32,
}

impl Deref for SpanLinks {
    type Target = Vec<Link>;

    fn deref(&self) -> &Self::Target {
        &self.links
    }
}

/// The mutable state collected while a span is active.
#[derive(Clone, Debug)]
pub(crate) struct SpanRecording {
    pub(crate) parent_span_id: SpanId,
    pub(crate) span_kind: SpanKind,
    pub(crate) name: Cow<'static, str>,
    pub(crate) start_time: SystemTime,
    pub(crate) end_time: SystemTime,
    pub(crate) attributes: EvictedHashMap,
    pub(crate) events: EvictedQueue<Event>,
    pub(crate) links: EvictedQueue<Link>,
    pub(crate) status: Status,
}

/// A single operation within a trace.
///
/// Spans are mutable until [`end`](Span::end) is called, after which every
/// mutator becomes a no-op. Ending hands the collected data to the span
/// processors exactly once; a span that was not ended explicitly is ended
/// when dropped.
pub struct Span {
    span_context: SpanContext,
    recording: Option<SpanRecording>,
    ended: bool,
    tracer: Tracer,
    span_limits: SpanLimits,
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Span")
            .field("span_context", &self.span_context)
            .field("recording", &self.recording.is_some())
            .field("ended", &self.ended)
            .finish()
    }
}

impl Span {
    pub(crate) fn new(
        span_context: SpanContext,
        recording: Option<SpanRecording>,
        tracer: Tracer,
        span_limits: SpanLimits,
    ) -> Self {
        Span {
            span_context,
            recording,
            ended: false,
            tracer,
            span_limits,
        }
    }

    /// The immutable span context.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// Returns `true` while the span collects data, i.e. it was created
    /// recording and has not yet ended.
    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Runs `f` against the recording, if the span still collects data.
    fn with_recording<F: FnOnce(&mut SpanRecording)>(&mut self, f: F) {
        match self.recording.as_mut() {
            Some(recording) => f(recording),
            None => {
                if self.ended {
                    crate::sdk_warn!(name: "Span.AlreadyEnded");
                }
            }
        }
    }

    /// Set a single attribute, replacing any previous value for the key.
    pub fn set_attribute(&mut self, attribute: KeyValue) {
        if attribute.key.as_str().is_empty() {
            crate::sdk_debug!(name: "Span.EmptyAttributeKey");
        }
        self.with_recording(|recording| recording.attributes.insert(attribute));
    }

    /// Set multiple attributes at once.
    pub fn set_attributes(&mut self, attributes: impl IntoIterator<Item = KeyValue>) {
        for attribute in attributes {
            self.set_attribute(attribute);
        }
    }

    /// Add an event with the current timestamp.
    pub fn add_event(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        attributes: Vec<KeyValue>,
    ) {
        self.add_event_with_timestamp(name, SystemTime::now(), attributes)
    }

    /// Add an event with the given timestamp.
    pub fn add_event_with_timestamp(
        &mut self,
        name: impl Into<Cow<'static, str>>,
        timestamp: SystemTime,
        mut attributes: Vec<KeyValue>,
    ) {
        let limit = self.span_limits.max_attributes_per_event as usize;
        let dropped_attributes_count = attributes.len().saturating_sub(limit) as u32;
        attributes.truncate(limit);
        let name = name.into();
        self.with_recording(|recording| {
            recording.events.push_back(Event {
                name,
                timestamp,
                attributes,
                dropped_attributes_count,
            })
        });
    }

    /// Add a link to another span.
    pub fn add_link(&mut self, span_context: SpanContext, mut attributes: Vec<KeyValue>) {
        let limit = self.span_limits.max_attributes_per_link as usize;
        let dropped_attributes_count = attributes.len().saturating_sub(limit) as u32;
        attributes.truncate(limit);
        self.with_recording(|recording| {
            recording.links.push_back(Link {
                span_context,
                attributes,
                dropped_attributes_count,
            })
        });
    }

    /// Record `err` as an `exception` event on this span.
    ///
    /// This does not change the span status; combine with
    /// [`set_status`](Span::set_status) to flag the span as failed.
    pub fn record_error(&mut self, err: &dyn Error) {
        if self.is_recording() {
            let event = Event::new(
                "exception",
                SystemTime::now(),
                vec![KeyValue::new("exception.message", err.to_string())],
                0,
            );
            self.with_recording(|recording| recording.events.push_back(event));
        }
    }

    /// Set the span status.
    ///
    /// An `Ok` status cannot be overridden and `Error` cannot be downgraded
    /// back to `Unset`.
    pub fn set_status(&mut self, status: Status) {
        self.with_recording(|recording| {
            if status > recording.status {
                recording.status = status;
            }
        });
    }

    /// Update the span name.
    pub fn update_name(&mut self, new_name: impl Into<Cow<'static, str>>) {
        let name = new_name.into();
        self.with_recording(|recording| recording.name = name);
    }

    /// End the span with the current timestamp.
    pub fn end(&mut self) {
        self.ensure_ended_and_exported(None);
    }

    /// End the span with the given timestamp.
    pub fn end_with_timestamp(&mut self, timestamp: SystemTime) {
        self.ensure_ended_and_exported(Some(timestamp));
    }

    fn ensure_ended_and_exported(&mut self, timestamp: Option<SystemTime>) {
        if let Some((tracer, span_data)) = self.detach_for_export(timestamp) {
            tracer.provider().on_end(span_data);
        }
    }

    /// Flips the span into its ended state and returns the payload for the
    /// processor chain, if there is one.
    ///
    /// Separate from the processor invocation so a caller holding the span
    /// behind a lock can release it before the (possibly blocking) export
    /// runs.
    pub(crate) fn detach_for_export(
        &mut self,
        timestamp: Option<SystemTime>,
    ) -> Option<(Tracer, SpanData)> {
        let mut recording = match self.recording.take() {
            Some(recording) => recording,
            None => {
                if self.ended {
                    crate::sdk_warn!(name: "Span.EndAfterEnded");
                }
                return None;
            }
        };
        self.ended = true;

        match timestamp {
            Some(timestamp) => recording.end_time = timestamp,
            None if recording.end_time == recording.start_time => {
                recording.end_time = SystemTime::now()
            }
            None => {}
        }

        if self.tracer.provider().is_shutdown() {
            return None;
        }

        Some((self.tracer.clone(), self.build_export_data(recording)))
    }

    fn build_export_data(&self, recording: SpanRecording) -> SpanData {
        SpanData {
            span_context: self.span_context.clone(),
            parent_span_id: recording.parent_span_id,
            span_kind: recording.span_kind,
            name: recording.name,
            start_time: recording.start_time,
            end_time: recording.end_time,
            dropped_attributes_count: recording.attributes.dropped_count(),
            attributes: recording.attributes.into_key_values(),
            events: SpanEvents {
                dropped_count: recording.events.dropped_count(),
                events: recording.events.into_iter().collect(),
            },
            links: SpanLinks {
                dropped_count: recording.links.dropped_count(),
                links: recording.links.into_iter().collect(),
            },
            status: recording.status,
            instrumentation_scope: self.tracer.instrumentation_scope().clone(),
        }
    }
}

impl Drop for Span {
    /// Ends the span if it has not already ended.
    fn drop(&mut self) {
        if !self.ended {
            self.ensure_ended_and_exported(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{
        ExportResult, Exporter, InMemorySpanExporter, Sampler, SpanContext, TracerProvider,
    };
    use crate::{Context, KeyValue};
    use futures_util::future::BoxFuture;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    fn test_pipeline(sampler: Sampler) -> (TracerProvider, InMemorySpanExporter) {
        let exporter = InMemorySpanExporter::default();
        let provider = TracerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .with_sampler(sampler)
            .build();
        (provider, exporter)
    }

    #[test]
    fn end_exports_exactly_once() {
        let (provider, exporter) = test_pipeline(Sampler::AlwaysOn);
        let tracer = provider.tracer("test");
        let mut span = tracer.start("op");
        span.end();
        span.end();
        drop(span);
        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
        drop(provider);
    }

    #[test]
    fn drop_ends_span() {
        let (provider, exporter) = test_pipeline(Sampler::AlwaysOn);
        let tracer = provider.tracer("test");
        drop(tracer.start("op"));
        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
        drop(provider);
    }

    #[test]
    fn mutations_after_end_are_ignored() {
        let (provider, exporter) = test_pipeline(Sampler::AlwaysOn);
        let tracer = provider.tracer("test");
        let mut span = tracer.start("op");
        span.set_attribute(KeyValue::new("before", true));
        span.add_event("before_end", vec![]);
        span.end();

        span.set_attribute(KeyValue::new("after", true));
        span.add_event("after_end", vec![]);
        span.update_name("renamed");
        span.set_status(Status::Ok);

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        let exported = &spans[0];
        assert_eq!(exported.name, "op");
        assert_eq!(exported.status, Status::Unset);
        assert_eq!(exported.attributes.len(), 1);
        assert_eq!(exported.events.len(), 1);
        drop(provider);
    }

    #[test]
    fn explicit_end_timestamp_wins() {
        let (provider, exporter) = test_pipeline(Sampler::AlwaysOn);
        let tracer = provider.tracer("test");
        let mut span = tracer.start("op");
        let timestamp = SystemTime::now() + Duration::from_secs(10);
        span.end_with_timestamp(timestamp);
        // A later end attempt cannot change the recorded timestamp.
        span.end();
        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].end_time, timestamp);
        drop(provider);
    }

    #[test]
    fn status_transitions_follow_priority() {
        let (provider, exporter) = test_pipeline(Sampler::AlwaysOn);
        let tracer = provider.tracer("test");

        let mut span = tracer.start("op");
        span.set_status(Status::error("boom"));
        span.set_status(Status::Unset);
        span.end();
        assert_eq!(
            exporter.get_finished_spans().unwrap()[0].status,
            Status::error("boom")
        );
        exporter.reset();

        let mut span = tracer.start("op");
        span.set_status(Status::Ok);
        span.set_status(Status::error("late"));
        span.end();
        assert_eq!(exporter.get_finished_spans().unwrap()[0].status, Status::Ok);
        drop(provider);
    }

    #[test]
    fn non_recording_span_ignores_everything() {
        let (provider, exporter) = test_pipeline(Sampler::AlwaysOff);
        let tracer = provider.tracer("test");
        let mut span = tracer.start("op");
        assert!(!span.is_recording());
        span.set_attribute(KeyValue::new("k", "v"));
        span.add_event("event", vec![]);
        span.end();
        assert!(exporter.get_finished_spans().unwrap().is_empty());
        drop(provider);
    }

    #[test]
    fn record_error_adds_exception_event() {
        let (provider, exporter) = test_pipeline(Sampler::AlwaysOn);
        let tracer = provider.tracer("test");
        let mut span = tracer.start("op");
        let err = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        span.record_error(&err);
        span.set_status(Status::error("disk gone"));
        span.end();

        let spans = exporter.get_finished_spans().unwrap();
        let event = &spans[0].events[0];
        assert_eq!(event.name, "exception");
        assert_eq!(
            event.attributes[0],
            KeyValue::new("exception.message", "disk gone")
        );
        drop(provider);
    }

    #[test]
    fn event_attributes_are_limited() {
        let (provider, exporter) = test_pipeline(Sampler::AlwaysOn);
        let tracer = provider.tracer("test");
        let mut span = tracer.start("op");
        let attributes = (0..200)
            .map(|i| KeyValue::new(format!("key{i}"), i as i64))
            .collect();
        span.add_event("big", attributes);
        span.end();

        let spans = exporter.get_finished_spans().unwrap();
        let event = &spans[0].events[0];
        assert_eq!(event.attributes.len(), 128);
        assert_eq!(event.dropped_attributes_count, 72);
        drop(provider);
    }

    #[test]
    fn span_attributes_evict_oldest() {
        let (provider, exporter) = test_pipeline(Sampler::AlwaysOn);
        let tracer = provider.tracer("test");
        let mut span = tracer.start("op");
        for i in 0..130 {
            span.set_attribute(KeyValue::new(format!("key{i}"), i as i64));
        }
        span.end();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].attributes.len(), 128);
        assert_eq!(spans[0].dropped_attributes_count, 2);
        // Oldest keys were evicted first.
        assert_eq!(spans[0].attributes[0], KeyValue::new("key2", 2i64));
        drop(provider);
    }

    #[derive(Debug, Clone, Default)]
    struct BlockingExporter {
        exported: Arc<Mutex<Vec<SpanData>>>,
    }

    impl Exporter<SpanData> for BlockingExporter {
        fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
            std::thread::sleep(Duration::from_millis(500));
            self.exported.lock().unwrap().extend(batch);
            Box::pin(futures_util::future::ready(Ok(())))
        }
    }

    #[test]
    fn context_end_releases_span_lock_before_exporting() {
        let exporter = BlockingExporter::default();
        let exported = exporter.exported.clone();
        let provider = TracerProvider::builder()
            .with_simple_exporter(exporter)
            .build();
        let tracer = provider.tracer("test");
        let cx = Context::new().with_span(tracer.start("op"));

        let ender = cx.clone();
        let handle = std::thread::spawn(move || ender.span().end());

        // Let the other thread get into the blocking export, then make sure
        // a mutation through the same context does not wait behind it.
        std::thread::sleep(Duration::from_millis(150));
        let started = Instant::now();
        cx.span().set_attribute(KeyValue::new("late", true));
        assert!(
            started.elapsed() < Duration::from_millis(250),
            "mutation blocked behind the export"
        );

        handle.join().unwrap();
        assert_eq!(exported.lock().unwrap().len(), 1);
        drop(provider);
    }

    #[cfg(feature = "internal-logs")]
    #[test]
    fn ending_twice_warns() {
        use tracing::span::{Attributes, Id, Record};
        use tracing::{Event, Level, Metadata, Subscriber};

        struct WarnCapture(Arc<Mutex<Vec<String>>>);

        impl Subscriber for WarnCapture {
            fn enabled(&self, _: &Metadata<'_>) -> bool {
                true
            }
            fn new_span(&self, _: &Attributes<'_>) -> Id {
                Id::from_u64(1)
            }
            fn record(&self, _: &Id, _: &Record<'_>) {}
            fn record_follows_from(&self, _: &Id, _: &Id) {}
            fn event(&self, event: &Event<'_>) {
                if *event.metadata().level() == Level::WARN {
                    self.0
                        .lock()
                        .unwrap()
                        .push(event.metadata().name().to_owned());
                }
            }
            fn enter(&self, _: &Id) {}
            fn exit(&self, _: &Id) {}
        }

        let warnings = Arc::new(Mutex::new(Vec::new()));
        tracing::subscriber::with_default(WarnCapture(warnings.clone()), || {
            let (provider, exporter) = test_pipeline(Sampler::AlwaysOn);
            let tracer = provider.tracer("test");
            let mut span = tracer.start("op");
            span.end();
            span.end();
            span.set_attribute(KeyValue::new("late", true));
            drop(span);
            assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
            drop(provider);
        });

        let warnings = warnings.lock().unwrap();
        assert!(warnings.iter().any(|name| name == "Span.EndAfterEnded"));
        assert!(warnings.iter().any(|name| name == "Span.AlreadyEnded"));
    }

    #[test]
    fn link_context_is_preserved() {
        let (provider, exporter) = test_pipeline(Sampler::AlwaysOn);
        let tracer = provider.tracer("test");
        let mut span = tracer.start("op");
        let linked = SpanContext::new(
            crate::trace::TraceId::from(42u128),
            crate::trace::SpanId::from(7u64),
            crate::trace::TraceFlags::SAMPLED,
            true,
            crate::trace::TraceState::default(),
        );
        span.add_link(linked.clone(), vec![KeyValue::new("relation", "follows")]);
        span.end();

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans[0].links[0].span_context, linked);
        drop(provider);
    }
}
