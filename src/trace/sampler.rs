//! Span sampling decisions.
//!
//! Sampling happens once, at span creation, before any span-creation
//! attributes are attached. The returned decision controls whether the span
//! records data locally and whether it is flagged for export.

use crate::common::KeyValue;
use crate::context::Context;
use crate::trace::{Link, SpanKind, TraceId, TraceState};
use rand::Rng;
use std::fmt;

/// Trace-state key consulted and written by [`Sampler::TraceStatePriority`].
pub const SAMPLING_PRIORITY_KEY: &str = "sampling.priority";

/// The sampling decision for a span about to be created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SamplingDecision {
    /// The span is neither recorded nor exported.
    Drop,
    /// The span records data locally but is not flagged for export.
    RecordOnly,
    /// The span records data and is flagged for export.
    RecordAndSample,
}

/// The outcome of a [`ShouldSample::should_sample`] call.
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingResult {
    /// The sampling decision.
    pub decision: SamplingDecision,
    /// Extra attributes to attach to the new span.
    pub attributes: Vec<KeyValue>,
    /// The trace state the new span should carry. Samplers may return a
    /// modified copy of the parent's trace state.
    pub trace_state: TraceState,
}

/// Interface to be implemented by custom samplers.
pub trait ShouldSample: CloneShouldSample + Send + Sync + fmt::Debug {
    /// Returns the sampling decision for a span to be created.
    ///
    /// Called exactly once per span, before span-creation attributes are
    /// attached, so that the result cannot depend on mutable span state.
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult;
}

/// Helper trait allowing `Box<dyn ShouldSample>` to be cloned.
pub trait CloneShouldSample {
    /// Box a clone of this sampler.
    fn box_clone(&self) -> Box<dyn ShouldSample>;
}

impl<T> CloneShouldSample for T
where
    T: ShouldSample + Clone + 'static,
{
    fn box_clone(&self) -> Box<dyn ShouldSample> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn ShouldSample> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Built-in samplers.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Sampler {
    /// Always sample the trace.
    AlwaysOn,
    /// Never sample the trace.
    AlwaysOff,
    /// Respects the sampling decision of the parent span, if any, falling
    /// back to the delegate sampler for root spans.
    ///
    /// A span with a valid parent is sampled when the parent is sampled or
    /// when any of the new span's links points at a sampled span.
    ParentBased(Box<dyn ShouldSample>),
    /// Samples a deterministic fraction of traces based on the trace id.
    ///
    /// Every span of a given trace receives the same decision, with no state
    /// beyond the trace id itself. The argument is clamped to `[0.0, 1.0]`,
    /// where `0.0` never samples and `1.0` always samples.
    TraceIdRatioBased(f64),
    /// Samples based on a priority carried in the trace state.
    ///
    /// Reads a `sampling.priority` value in `[0.0, 1.0)` from the parent
    /// trace state. If absent or malformed, a uniformly random priority is
    /// generated and prepended to the trace state so that downstream
    /// services make the same decision. The span is sampled when the
    /// priority is below the configured probability.
    TraceStatePriority(f64),
}

impl ShouldSample for Sampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        let decision = match self {
            Sampler::AlwaysOn => SamplingDecision::RecordAndSample,
            Sampler::AlwaysOff => SamplingDecision::Drop,
            Sampler::ParentBased(delegate) => {
                let parent = parent_context
                    .filter(|cx| cx.has_active_span())
                    .map(|cx| cx.span().span_context().clone())
                    .filter(|span_context| span_context.is_valid());
                match parent {
                    Some(parent) => {
                        let sampled = parent.is_sampled()
                            || links.iter().any(|link| link.span_context.is_sampled());
                        if sampled {
                            SamplingDecision::RecordAndSample
                        } else {
                            SamplingDecision::Drop
                        }
                    }
                    None => {
                        return delegate.should_sample(
                            parent_context,
                            trace_id,
                            name,
                            span_kind,
                            attributes,
                            links,
                        )
                    }
                }
            }
            Sampler::TraceIdRatioBased(probability) => {
                if sample_by_trace_id_ratio(*probability, trace_id) {
                    SamplingDecision::RecordAndSample
                } else {
                    SamplingDecision::Drop
                }
            }
            Sampler::TraceStatePriority(probability) => {
                return sample_by_trace_state_priority(*probability, parent_context)
            }
        };

        SamplingResult {
            decision,
            attributes: Vec::new(),
            trace_state: parent_trace_state(parent_context),
        }
    }
}

fn parent_trace_state(parent_context: Option<&Context>) -> TraceState {
    parent_context
        .filter(|cx| cx.has_active_span())
        .map(|cx| cx.span().span_context().trace_state().clone())
        .unwrap_or_default()
}

/// Deterministic ratio check against the low 64 bits of the trace id.
///
/// The comparison bound is `probability * i64::MAX`, with the endpoints
/// special-cased so that `0.0` never samples and `1.0` always samples.
fn sample_by_trace_id_ratio(probability: f64, trace_id: TraceId) -> bool {
    if probability <= 0.0 {
        return false;
    }
    if probability >= 1.0 {
        return true;
    }

    let upper_bound = (probability * i64::MAX as f64) as u64;
    let bytes = trace_id.to_bytes();
    let mut lower = [0u8; 8];
    lower.copy_from_slice(&bytes[8..]);
    i64::from_be_bytes(lower).unsigned_abs() < upper_bound
}

fn sample_by_trace_state_priority(
    probability: f64,
    parent_context: Option<&Context>,
) -> SamplingResult {
    let mut trace_state = parent_trace_state(parent_context);

    // Malformed values are treated as absent and overwritten.
    let priority = trace_state
        .get(SAMPLING_PRIORITY_KEY)
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|value| value.is_finite());

    let priority = match priority {
        Some(priority) => priority,
        None => {
            let generated = rand::rng().random::<f64>();
            match trace_state.insert(SAMPLING_PRIORITY_KEY, format!("{generated}")) {
                Ok(updated) => trace_state = updated,
                Err(err) => {
                    crate::sdk_warn!(name: "Sampler.TraceStateUpdateFailed", message = err.to_string());
                }
            }
            generated
        }
    };

    let decision = if priority < probability {
        SamplingDecision::RecordAndSample
    } else {
        SamplingDecision::Drop
    };

    SamplingResult {
        decision,
        attributes: Vec::new(),
        trace_state,
    }
}
