//! Tracer provider configuration.

use crate::resource::Resource;
use crate::trace::id_generator::{IdGenerator, RandomIdGenerator};
use crate::trace::sampler::{Sampler, ShouldSample};

const DEFAULT_MAX_EVENTS_PER_SPAN: u32 = 128;
const DEFAULT_MAX_ATTRIBUTES_PER_SPAN: u32 = 128;
const DEFAULT_MAX_LINKS_PER_SPAN: u32 = 128;
const DEFAULT_MAX_ATTRIBUTES_PER_EVENT: u32 = 128;
const DEFAULT_MAX_ATTRIBUTES_PER_LINK: u32 = 128;

/// Caps on the data a single span may collect.
///
/// Collections over their limit evict their oldest entries and count the
/// evictions.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SpanLimits {
    /// The max events that can be added to a `Span`.
    pub max_events_per_span: u32,
    /// The max attributes that can be added to a `Span`.
    pub max_attributes_per_span: u32,
    /// The max links that can be added to a `Span`.
    pub max_links_per_span: u32,
    /// The max attributes that can be added to an `Event`.
    pub max_attributes_per_event: u32,
    /// The max attributes that can be added to a `Link`.
    pub max_attributes_per_link: u32,
}

impl Default for SpanLimits {
    fn default() -> Self {
        SpanLimits {
            max_events_per_span: DEFAULT_MAX_EVENTS_PER_SPAN,
            max_attributes_per_span: DEFAULT_MAX_ATTRIBUTES_PER_SPAN,
            max_links_per_span: DEFAULT_MAX_LINKS_PER_SPAN,
            max_attributes_per_event: DEFAULT_MAX_ATTRIBUTES_PER_EVENT,
            max_attributes_per_link: DEFAULT_MAX_ATTRIBUTES_PER_LINK,
        }
    }
}

/// Settings shared by every tracer created from a provider.
#[derive(Debug)]
pub struct Config {
    /// The sampler consulted when spans are created.
    pub sampler: Box<dyn ShouldSample>,
    /// The id generator for new trace and span ids.
    pub id_generator: Box<dyn IdGenerator>,
    /// Caps on the data collected per span.
    pub span_limits: SpanLimits,
    /// The entity producing the telemetry.
    pub resource: Resource,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            sampler: Box::new(Sampler::ParentBased(Box::new(Sampler::AlwaysOn))),
            id_generator: Box::<RandomIdGenerator>::default(),
            span_limits: SpanLimits::default(),
            resource: Resource::default(),
        }
    }
}
