//! The tracing pipeline: samplers, spans, processors and exporters.
//!
//! Spans are created through a [`Tracer`], sampled exactly once at creation,
//! mutated while active, and handed to the configured [`SpanProcessor`]s
//! when they end. Processors forward sampled spans to an [`Exporter`],
//! either synchronously ([`SimpleSpanProcessor`]) or in background batches
//! ([`BatchSpanProcessor`]).

mod batch;
mod config;
mod evicted;
mod export;
mod id_generator;
mod processor;
mod provider;
mod sampler;
mod span;
mod span_context;
mod tracer;

pub use batch::{
    BatchConfig, BatchConfigBuilder, BatchExportProcessor, BatchSpanProcessor,
    OTEL_BSP_EXPORT_TIMEOUT, OTEL_BSP_EXPORT_TIMEOUT_DEFAULT, OTEL_BSP_MAX_EXPORT_BATCH_SIZE,
    OTEL_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT, OTEL_BSP_MAX_QUEUE_SIZE,
    OTEL_BSP_MAX_QUEUE_SIZE_DEFAULT, OTEL_BSP_SCHEDULE_DELAY, OTEL_BSP_SCHEDULE_DELAY_DEFAULT,
};
pub use config::{Config, SpanLimits};
pub use evicted::{EvictedHashMap, EvictedQueue};
pub use export::{ExportResult, Exporter, InMemorySpanExporter, SpanData};
pub use id_generator::{IdGenerator, RandomIdGenerator};
pub use processor::{
    CompositeSpanProcessor, SimpleExportProcessor, SimpleSpanProcessor, SpanProcessor,
};
pub use provider::{TracerProvider, TracerProviderBuilder};
pub use sampler::{
    CloneShouldSample, Sampler, SamplingDecision, SamplingResult, ShouldSample,
    SAMPLING_PRIORITY_KEY,
};
pub use span::{Event, Link, Span, SpanEvents, SpanKind, SpanLinks, Status};
pub use span_context::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
pub use tracer::{SpanBuilder, Tracer};
