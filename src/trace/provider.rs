//! The tracer provider: owner of the span processing pipeline.

use crate::common::InstrumentationScope;
use crate::context::Context;
use crate::error::{TraceError, TraceResult};
use crate::resource::Resource;
use crate::trace::batch::{BatchConfig, BatchSpanProcessor};
use crate::trace::config::{Config, SpanLimits};
use crate::trace::export::{Exporter, SpanData};
use crate::trace::id_generator::IdGenerator;
use crate::trace::processor::{CompositeSpanProcessor, SimpleSpanProcessor, SpanProcessor};
use crate::trace::sampler::ShouldSample;
use crate::trace::span::Span;
use crate::trace::tracer::Tracer;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Creates and manages [`Tracer`]s and owns the processors that finished
/// spans flow through.
///
/// Cloning is cheap; clones share the pipeline. The pipeline is shut down
/// explicitly via [`shutdown`](TracerProvider::shutdown), or implicitly when
/// the last clone is dropped.
///
/// There is no process-wide default provider: applications hold on to the
/// provider (or tracers created from it) and pass it where needed.
#[derive(Clone, Debug)]
pub struct TracerProvider {
    inner: Arc<TracerProviderInner>,
}

#[derive(Debug)]
struct TracerProviderInner {
    processors: CompositeSpanProcessor,
    config: Config,
    is_shutdown: AtomicBool,
}

impl Drop for TracerProviderInner {
    fn drop(&mut self) {
        if !self.is_shutdown.load(Ordering::SeqCst) {
            if let Err(err) = self.processors.shutdown() {
                crate::sdk_warn!(name: "TracerProvider.ShutdownOnDropFailed",
                    message = err.to_string());
            }
        }
    }
}

impl TracerProvider {
    /// Returns a builder for a provider.
    pub fn builder() -> TracerProviderBuilder {
        TracerProviderBuilder::default()
    }

    /// Returns a tracer for the given instrumentation name.
    pub fn tracer(&self, name: impl Into<Cow<'static, str>>) -> Tracer {
        self.tracer_with_scope(InstrumentationScope::builder(name).build())
    }

    /// Returns a tracer for the given instrumentation scope.
    pub fn tracer_with_scope(&self, scope: InstrumentationScope) -> Tracer {
        if self.is_shutdown() {
            crate::sdk_debug!(name: "TracerProvider.TracerAfterShutdown", scope = scope.name());
        }
        Tracer::new(scope, self.clone())
    }

    pub(crate) fn config(&self) -> &Config {
        &self.inner.config
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.inner.is_shutdown.load(Ordering::Relaxed)
    }

    pub(crate) fn on_start(&self, span: &mut Span, cx: &Context) {
        self.inner.processors.on_start(span, cx)
    }

    pub(crate) fn on_end(&self, span: SpanData) {
        self.inner.processors.on_end(span)
    }

    /// Asks every processor to export its pending spans.
    pub fn force_flush(&self) -> TraceResult<()> {
        if self.is_shutdown() {
            return Err(TraceError::AlreadyShutdown);
        }
        self.inner.processors.force_flush()
    }

    /// Shuts down the pipeline: pending spans are drained to the exporters,
    /// then the exporters are released.
    ///
    /// Spans created afterwards are non-recording; spans ended afterwards
    /// are discarded. Only the first call does any work, later calls return
    /// [`TraceError::AlreadyShutdown`].
    pub fn shutdown(&self) -> TraceResult<()> {
        if self
            .inner
            .is_shutdown
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            self.inner.processors.shutdown()
        } else {
            Err(TraceError::AlreadyShutdown)
        }
    }
}

/// A builder for [`TracerProvider`].
#[derive(Debug, Default)]
pub struct TracerProviderBuilder {
    processors: Vec<Box<dyn SpanProcessor>>,
    config: Config,
}

impl TracerProviderBuilder {
    /// Adds a [`SimpleSpanProcessor`] exporting through `exporter`.
    pub fn with_simple_exporter<E: Exporter<SpanData> + 'static>(self, exporter: E) -> Self {
        self.with_span_processor(SimpleSpanProcessor::new(exporter))
    }

    /// Adds a [`BatchSpanProcessor`] exporting through `exporter`, using the
    /// default batch configuration (including `OTEL_BSP_*` env overrides).
    pub fn with_batch_exporter<E: Exporter<SpanData> + 'static>(self, exporter: E) -> Self {
        self.with_span_processor(BatchSpanProcessor::new(exporter, BatchConfig::default()))
    }

    /// Adds a custom span processor, invoked after those already added.
    pub fn with_span_processor<P: SpanProcessor + 'static>(mut self, processor: P) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Sets the sampler consulted for every new span.
    pub fn with_sampler<S: ShouldSample + 'static>(mut self, sampler: S) -> Self {
        self.config.sampler = Box::new(sampler);
        self
    }

    /// Sets the generator for trace and span ids.
    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, id_generator: G) -> Self {
        self.config.id_generator = Box::new(id_generator);
        self
    }

    /// Sets the per-span collection limits.
    pub fn with_span_limits(mut self, span_limits: SpanLimits) -> Self {
        self.config.span_limits = span_limits;
        self
    }

    /// Sets the resource describing the producing entity.
    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.config.resource = resource;
        self
    }

    /// Builds the provider, pushing the configured resource down to every
    /// processor before any span flows.
    pub fn build(self) -> TracerProvider {
        let mut processors = CompositeSpanProcessor::new(self.processors);
        processors.set_resource(&self.config.resource);

        TracerProvider {
            inner: Arc::new(TracerProviderInner {
                processors,
                config: self.config,
                is_shutdown: AtomicBool::new(false),
            }),
        }
    }
}
