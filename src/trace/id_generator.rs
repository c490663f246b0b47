//! Trace and span id generation.

use crate::trace::{SpanId, TraceId};
use rand::Rng;
use std::fmt;

/// Interface for generating ids for new spans.
pub trait IdGenerator: Send + Sync + fmt::Debug {
    /// Generate a new `TraceId`.
    fn new_trace_id(&self) -> TraceId;

    /// Generate a new `SpanId`.
    fn new_span_id(&self) -> SpanId;
}

/// Default [`IdGenerator`] using a thread-local random number generator.
#[derive(Clone, Debug, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        TraceId::from(rand::rng().random::<u128>())
    }

    fn new_span_id(&self) -> SpanId {
        SpanId::from(rand::rng().random::<u64>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_valid_ids() {
        let generator = RandomIdGenerator;
        // u128/u64 zero from a random source would be astronomically
        // unlikely, so a small number of draws suffices.
        for _ in 0..8 {
            assert_ne!(generator.new_trace_id(), TraceId::INVALID);
            assert_ne!(generator.new_span_id(), SpanId::INVALID);
        }
    }

    #[test]
    fn ids_are_unique_across_draws() {
        let generator = RandomIdGenerator;
        let a = generator.new_trace_id();
        let b = generator.new_trace_id();
        assert_ne!(a, b);
    }
}
