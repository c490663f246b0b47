//! The entry point for creating spans.

use crate::common::{InstrumentationScope, KeyValue};
use crate::context::Context;
use crate::trace::evicted::{EvictedHashMap, EvictedQueue};
use crate::trace::provider::TracerProvider;
use crate::trace::sampler::{SamplingDecision, SamplingResult};
use crate::trace::span::{Link, Span, SpanKind, SpanRecording, Status};
use crate::trace::{SpanContext, SpanId};
use std::borrow::Cow;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::SystemTime;

/// Creates spans within a single instrumentation scope.
///
/// Obtained from a [`TracerProvider`]; cloning is cheap and clones share the
/// provider.
#[derive(Clone)]
pub struct Tracer {
    scope: InstrumentationScope,
    provider: TracerProvider,
}

impl fmt::Debug for Tracer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer")
            .field("name", &self.scope.name())
            .field("version", &self.scope.version())
            .finish()
    }
}

impl Tracer {
    pub(crate) fn new(scope: InstrumentationScope, provider: TracerProvider) -> Self {
        Tracer { scope, provider }
    }

    /// The instrumentation scope this tracer was created for.
    pub fn instrumentation_scope(&self) -> &InstrumentationScope {
        &self.scope
    }

    pub(crate) fn provider(&self) -> &TracerProvider {
        &self.provider
    }

    /// Returns a builder for a span with the given name.
    pub fn span_builder(&self, name: impl Into<Cow<'static, str>>) -> SpanBuilder {
        SpanBuilder::from_name(name)
    }

    /// Starts a new span parented to the current context.
    pub fn start(&self, name: impl Into<Cow<'static, str>>) -> Span {
        Context::map_current(|cx| self.build_with_context(SpanBuilder::from_name(name), cx))
    }

    /// Starts a new span parented to the given context.
    pub fn start_with_context(&self, name: impl Into<Cow<'static, str>>, cx: &Context) -> Span {
        self.build_with_context(SpanBuilder::from_name(name), cx)
    }

    /// Starts a span from a builder, parented to the current context.
    pub fn build(&self, builder: SpanBuilder) -> Span {
        Context::map_current(|cx| self.build_with_context(builder, cx))
    }

    /// Runs `f` inside a new span: the span is started, attached as the
    /// active span for the duration of the call, and ended afterwards, even
    /// if `f` panics.
    pub fn in_span<T, F>(&self, name: impl Into<Cow<'static, str>>, f: F) -> T
    where
        F: FnOnce(&Context) -> T,
    {
        let span = self.start(name);
        let cx = Context::current_with_span(span);
        let _guard = cx.clone().attach();
        f(&cx)
    }

    /// Starts a span from a builder, parented to the given context.
    ///
    /// The sampler runs exactly once, before any builder attribute is
    /// attached; a panicking sampler drops the span. If the provider has
    /// shut down, a non-recording span is returned.
    pub fn build_with_context(&self, mut builder: SpanBuilder, parent_cx: &Context) -> Span {
        let provider = &self.provider;
        if provider.is_shutdown() {
            return Span::new(
                SpanContext::NONE,
                None,
                self.clone(),
                provider.config().span_limits,
            );
        }

        let config = provider.config();
        let span_limits = config.span_limits;

        let parent = parent_cx
            .has_active_span()
            .then(|| parent_cx.span().span_context().clone())
            .filter(SpanContext::is_valid);
        let (trace_id, parent_span_id) = match &parent {
            Some(parent) => (parent.trace_id(), parent.span_id()),
            None => (config.id_generator.new_trace_id(), SpanId::INVALID),
        };
        let span_id = config.id_generator.new_span_id();

        let name = builder.name;
        let span_kind = builder.span_kind.take().unwrap_or(SpanKind::Internal);
        let attributes = builder.attributes.take().unwrap_or_default();
        let links = builder.links.take().unwrap_or_default();

        let sampling_result = catch_unwind(AssertUnwindSafe(|| {
            config.sampler.should_sample(
                Some(parent_cx),
                trace_id,
                &name,
                &span_kind,
                &attributes,
                &links,
            )
        }))
        .unwrap_or_else(|_| {
            crate::sdk_warn!(name: "Tracer.SamplerPanicked", span_name = name.as_ref());
            SamplingResult {
                decision: SamplingDecision::Drop,
                attributes: Vec::new(),
                trace_state: Default::default(),
            }
        });

        let parent_flags = parent
            .as_ref()
            .map(|parent| parent.trace_flags())
            .unwrap_or_default();
        let (trace_flags, recording) = match sampling_result.decision {
            SamplingDecision::Drop => (parent_flags.with_sampled(false), None),
            SamplingDecision::RecordOnly | SamplingDecision::RecordAndSample => {
                let sampled = sampling_result.decision == SamplingDecision::RecordAndSample;

                let mut attribute_map =
                    EvictedHashMap::new(span_limits.max_attributes_per_span);
                for attribute in attributes {
                    attribute_map.insert(attribute);
                }
                for attribute in sampling_result.attributes {
                    attribute_map.insert(attribute);
                }

                let mut link_queue = EvictedQueue::new(span_limits.max_links_per_span);
                let link_attribute_limit = span_limits.max_attributes_per_link as usize;
                for mut link in links {
                    let dropped = link
                        .attributes
                        .len()
                        .saturating_sub(link_attribute_limit) as u32;
                    link.attributes.truncate(link_attribute_limit);
                    link.dropped_attributes_count += dropped;
                    link_queue.push_back(link);
                }

                let start_time = builder.start_time.take().unwrap_or_else(SystemTime::now);
                let recording = SpanRecording {
                    parent_span_id,
                    span_kind,
                    name,
                    start_time,
                    end_time: start_time,
                    attributes: attribute_map,
                    events: EvictedQueue::new(span_limits.max_events_per_span),
                    links: link_queue,
                    status: Status::Unset,
                };

                (parent_flags.with_sampled(sampled), Some(recording))
            }
        };

        let span_context = SpanContext::new(
            trace_id,
            span_id,
            trace_flags,
            false,
            sampling_result.trace_state,
        );
        let mut span = Span::new(span_context, recording, self.clone(), span_limits);
        if span.is_recording() {
            provider.on_start(&mut span, parent_cx);
        }
        span
    }
}

/// Collected configuration for a span about to be started.
#[derive(Clone, Debug, Default)]
pub struct SpanBuilder {
    /// The span name.
    pub name: Cow<'static, str>,
    /// The span kind, `Internal` if unset.
    pub span_kind: Option<SpanKind>,
    /// The start timestamp, `now` at build time if unset.
    pub start_time: Option<SystemTime>,
    /// Attributes known before the span starts, visible to the sampler.
    pub attributes: Option<Vec<KeyValue>>,
    /// Links known before the span starts, visible to the sampler.
    pub links: Option<Vec<Link>>,
}

impl SpanBuilder {
    /// Create a builder for a span with the given name.
    pub fn from_name(name: impl Into<Cow<'static, str>>) -> Self {
        SpanBuilder {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Specify the span kind.
    pub fn with_kind(mut self, span_kind: SpanKind) -> Self {
        self.span_kind = Some(span_kind);
        self
    }

    /// Specify the start timestamp.
    pub fn with_start_time(mut self, start_time: SystemTime) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Specify attributes known up front.
    pub fn with_attributes(mut self, attributes: Vec<KeyValue>) -> Self {
        self.attributes = Some(attributes);
        self
    }

    /// Specify links known up front.
    pub fn with_links(mut self, links: Vec<Link>) -> Self {
        self.links = Some(links);
        self
    }

    /// Start the span through the given tracer, parented to the current
    /// context.
    pub fn start(self, tracer: &Tracer) -> Span {
        tracer.build(self)
    }

    /// Start the span through the given tracer, parented to `cx`.
    pub fn start_with_context(self, tracer: &Tracer, cx: &Context) -> Span {
        tracer.build_with_context(self, cx)
    }
}
