//! A distributed tracing SDK core.
//!
//! This crate provides the building blocks for recording traces inside an
//! application: a [`TracerProvider`](trace::TracerProvider) that owns the
//! pipeline, [`Tracer`](trace::Tracer)s that create spans, samplers that
//! decide up front which spans record data, and span processors that hand
//! finished spans to pluggable exporters, either synchronously or batched
//! on a background thread.
//!
//! The active span is carried in an explicit [`Context`] value and can be
//! installed for a scope with [`Context::attach`]; there is no hidden
//! global registry.
//!
//! # Getting started
//!
//! ```
//! use tracekit::trace::{InMemorySpanExporter, Sampler, TracerProvider};
//! use tracekit::KeyValue;
//!
//! let exporter = InMemorySpanExporter::default();
//! let provider = TracerProvider::builder()
//!     .with_simple_exporter(exporter.clone())
//!     .with_sampler(Sampler::TraceIdRatioBased(1.0))
//!     .build();
//!
//! let tracer = provider.tracer("app");
//! tracer.in_span("handle_request", |cx| {
//!     cx.span().set_attribute(KeyValue::new("http.method", "GET"));
//! });
//!
//! assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
//! provider.shutdown().unwrap();
//! ```
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod common;
mod context;
mod error;
#[macro_use]
mod macros;
mod resource;

pub mod trace;

pub use common::{
    Array, InstrumentationScope, InstrumentationScopeBuilder, Key, KeyValue, Value,
};
pub use context::{Context, ContextGuard, SpanRef};
pub use error::{TraceError, TraceResult};
pub use resource::{Resource, ResourceBuilder, SERVICE_NAME};

#[doc(hidden)]
#[cfg(feature = "internal-logs")]
pub mod _private {
    pub use tracing::{debug, error, warn};
}
