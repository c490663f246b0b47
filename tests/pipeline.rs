//! End-to-end tests exercising the public span pipeline.

use futures_util::future::BoxFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracekit::trace::{
    BatchConfigBuilder, BatchSpanProcessor, ExportResult, Exporter, InMemorySpanExporter, Sampler,
    SpanData, SpanKind, Status, TracerProvider,
};
use tracekit::{Context, KeyValue, TraceResult};

/// Records each batch it receives, surviving exporter shutdown.
#[derive(Clone, Debug, Default)]
struct BatchCountingExporter {
    batch_sizes: Arc<Mutex<Vec<usize>>>,
    shutdown_called: Arc<AtomicBool>,
}

impl BatchCountingExporter {
    fn batch_sizes(&self) -> Vec<usize> {
        self.batch_sizes.lock().unwrap().clone()
    }

    fn total(&self) -> usize {
        self.batch_sizes().iter().sum()
    }
}

impl Exporter<SpanData> for BatchCountingExporter {
    fn export(&mut self, batch: Vec<SpanData>) -> BoxFuture<'static, ExportResult> {
        self.batch_sizes.lock().unwrap().push(batch.len());
        Box::pin(std::future::ready(Ok(())))
    }

    fn shutdown(&mut self) -> TraceResult<()> {
        self.shutdown_called.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn batched_pipeline_delivers_every_span() {
    let exporter = BatchCountingExporter::default();
    let provider = TracerProvider::builder()
        .with_batch_exporter(exporter.clone())
        .with_sampler(Sampler::AlwaysOn)
        .build();
    let tracer = provider.tracer("pipeline");

    for i in 0..600 {
        let mut span = tracer.start(format!("operation-{i}"));
        span.set_attribute(KeyValue::new("index", i as i64));
        span.end();
    }
    provider.shutdown().unwrap();

    // With the default 512 batch limit, 600 spans cannot fit one batch.
    assert_eq!(exporter.total(), 600);
    assert!(exporter.batch_sizes().len() >= 2);
    assert!(exporter.batch_sizes().iter().all(|size| *size <= 512));
    assert!(exporter.shutdown_called.load(Ordering::SeqCst));
}

#[test]
fn custom_batch_config_flows_through_processor() {
    let exporter = BatchCountingExporter::default();
    let config = BatchConfigBuilder::default()
        .with_max_queue_size(64)
        .with_max_export_batch_size(16)
        .build()
        .unwrap();
    let provider = TracerProvider::builder()
        .with_span_processor(BatchSpanProcessor::new(exporter.clone(), config))
        .build();
    let tracer = provider.tracer("pipeline");

    for _ in 0..40 {
        tracer.start("op").end();
    }
    provider.force_flush().unwrap();

    assert_eq!(exporter.total(), 40);
    assert!(exporter.batch_sizes().iter().all(|size| *size <= 16));
    provider.shutdown().unwrap();
}

#[test]
fn context_scoping_builds_a_trace_tree() {
    let exporter = InMemorySpanExporter::default();
    let provider = TracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    let tracer = provider.tracer("pipeline");

    tracer.in_span("root", |_cx| {
        tracer.in_span("child_a", |_cx| {});
        tracer.in_span("child_b", |cx| {
            cx.span().set_status(Status::Ok);
        });
    });

    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 3);
    let root = spans.iter().find(|s| s.name == "root").unwrap();
    let child_a = spans.iter().find(|s| s.name == "child_a").unwrap();
    let child_b = spans.iter().find(|s| s.name == "child_b").unwrap();

    for child in [child_a, child_b] {
        assert_eq!(
            child.span_context.trace_id(),
            root.span_context.trace_id()
        );
        assert_eq!(child.parent_span_id, root.span_context.span_id());
    }
    assert_eq!(child_b.status, Status::Ok);
    provider.shutdown().unwrap();
}

#[test]
fn remote_parent_sampling_is_respected() {
    use tracekit::trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};

    let exporter = InMemorySpanExporter::default();
    let provider = TracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::AlwaysOff)))
        .build();
    let tracer = provider.tracer("pipeline");

    let sampled_parent = Context::new().with_remote_span_context(SpanContext::new(
        TraceId::from(0x1234u128),
        SpanId::from(0x42u64),
        TraceFlags::SAMPLED,
        true,
        TraceState::default(),
    ));
    tracer
        .start_with_context("from_sampled_parent", &sampled_parent)
        .end();

    let unsampled_parent = Context::new().with_remote_span_context(SpanContext::new(
        TraceId::from(0x5678u128),
        SpanId::from(0x43u64),
        TraceFlags::default(),
        true,
        TraceState::default(),
    ));
    tracer
        .start_with_context("from_unsampled_parent", &unsampled_parent)
        .end();

    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans.len(), 1);
    assert_eq!(spans[0].name, "from_sampled_parent");
    assert_eq!(spans[0].span_context.trace_id(), TraceId::from(0x1234u128));
    provider.shutdown().unwrap();
}

#[test]
fn span_kinds_and_events_round_trip() {
    let exporter = InMemorySpanExporter::default();
    let provider = TracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    let tracer = provider.tracer("pipeline");

    let mut span = tracer
        .span_builder("consume_message")
        .with_kind(SpanKind::Consumer)
        .start(&tracer);
    span.add_event(
        "message.received",
        vec![KeyValue::new("messaging.message_id", "m-1")],
    );
    span.end();

    let spans = exporter.get_finished_spans().unwrap();
    assert_eq!(spans[0].span_kind, SpanKind::Consumer);
    assert_eq!(spans[0].events.len(), 1);
    assert_eq!(spans[0].events[0].name, "message.received");
    provider.shutdown().unwrap();
}
