//! Execution-scoped propagation of the active span.
//!
//! A [`Context`] is an immutable value that carries the active span. It is
//! passed explicitly or installed as the current context for the duration of
//! a scope via [`Context::attach`], which returns a guard that restores the
//! previous context when dropped.

use crate::common::KeyValue;
use crate::trace::{Span, SpanContext, Status};
use std::borrow::Cow;
use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::SystemTime;

thread_local! {
    static CURRENT_CONTEXT: RefCell<Context> = RefCell::new(Context::default());
}

fn noop_span() -> &'static Arc<SynchronizedSpan> {
    static NOOP_SPAN: OnceLock<Arc<SynchronizedSpan>> = OnceLock::new();
    NOOP_SPAN.get_or_init(|| {
        Arc::new(SynchronizedSpan {
            span_context: SpanContext::NONE,
            inner: None,
        })
    })
}

/// A span wrapped for shared, thread-safe mutation through a [`Context`].
pub(crate) struct SynchronizedSpan {
    /// Immutable span context, readable without taking the lock.
    span_context: SpanContext,
    /// Mutable span, or `None` if this entry only carries a remote context.
    inner: Option<Mutex<Span>>,
}

impl SynchronizedSpan {
    pub(crate) fn span_context(&self) -> &SpanContext {
        &self.span_context
    }
}

impl fmt::Debug for SynchronizedSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SynchronizedSpan")
            .field("span_context", &self.span_context)
            .finish()
    }
}

/// An immutable execution-scoped value carrying the active span.
#[derive(Clone, Debug, Default)]
pub struct Context {
    span: Option<Arc<SynchronizedSpan>>,
}

impl Context {
    /// Creates an empty `Context`.
    pub fn new() -> Self {
        Context::default()
    }

    /// Returns a clone of the current thread's context.
    pub fn current() -> Self {
        Context::map_current(Context::clone)
    }

    /// Applies a function to the current context without cloning it.
    pub fn map_current<T>(f: impl FnOnce(&Context) -> T) -> T {
        CURRENT_CONTEXT.with(|cx| f(&cx.borrow()))
    }

    /// Returns a copy of this context with the given span set as active.
    ///
    /// The span is ended when the last context referencing it is dropped,
    /// unless it was ended explicitly before that.
    pub fn with_span(&self, span: Span) -> Self {
        let span_context = span.span_context().clone();
        // Non-recording spans have nothing to mutate, so no lock is kept and
        // every mutation through the returned context short-circuits.
        let inner = span.is_recording().then(|| Mutex::new(span));
        Context {
            span: Some(Arc::new(SynchronizedSpan { span_context, inner })),
        }
    }

    /// Returns the current context with the given span set as active.
    pub fn current_with_span(span: Span) -> Self {
        Context::current().with_span(span)
    }

    /// Returns a copy of this context with a remote parent span context
    /// attached, e.g. one extracted from an incoming request.
    pub fn with_remote_span_context(&self, span_context: SpanContext) -> Self {
        Context {
            span: Some(Arc::new(SynchronizedSpan {
                span_context,
                inner: None,
            })),
        }
    }

    /// Returns a reference to this context's active span, or a no-op span
    /// reference if none is set.
    pub fn span(&self) -> SpanRef<'_> {
        match self.span.as_ref() {
            Some(span) => SpanRef(span),
            None => SpanRef(noop_span()),
        }
    }

    /// Returns `true` if a span (local or remote) is attached.
    pub fn has_active_span(&self) -> bool {
        self.span.is_some()
    }

    /// Installs this context as the current one for the calling thread,
    /// returning a guard that restores the previous context on drop.
    ///
    /// Guards should be dropped in the reverse order they were created.
    pub fn attach(self) -> ContextGuard {
        let previous = CURRENT_CONTEXT.with(|current| current.replace(self));
        ContextGuard {
            previous: Some(previous),
        }
    }
}

/// A guard that resets the current context to the prior value on drop.
#[derive(Debug)]
pub struct ContextGuard {
    previous: Option<Context>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            CURRENT_CONTEXT.with(|current| {
                *current.borrow_mut() = previous;
            });
        }
    }
}

/// A reference to the span active in a [`Context`].
#[derive(Debug)]
pub struct SpanRef<'a>(&'a SynchronizedSpan);

impl SpanRef<'_> {
    fn with_inner_mut<F: FnOnce(&mut Span)>(&self, f: F) {
        if let Some(inner) = self.0.inner.as_ref() {
            match inner.lock() {
                Ok(mut locked) => f(&mut locked),
                Err(err) => {
                    crate::sdk_error!(name: "SpanRef.LockPoisoned", message = err.to_string());
                }
            }
        }
    }

    /// The span context of the referenced span.
    pub fn span_context(&self) -> &SpanContext {
        &self.0.span_context
    }

    /// Returns `true` if the referenced span records data.
    pub fn is_recording(&self) -> bool {
        self.0
            .inner
            .as_ref()
            .and_then(|inner| inner.lock().ok().map(|locked| locked.is_recording()))
            .unwrap_or(false)
    }

    /// Set an attribute on the referenced span.
    pub fn set_attribute(&self, attribute: KeyValue) {
        self.with_inner_mut(|inner| inner.set_attribute(attribute))
    }

    /// Add an event to the referenced span.
    pub fn add_event(
        &self,
        name: impl Into<Cow<'static, str>>,
        attributes: Vec<KeyValue>,
    ) {
        self.with_inner_mut(|inner| inner.add_event(name, attributes))
    }

    /// Record an error as an event on the referenced span.
    pub fn record_error(&self, err: &dyn std::error::Error) {
        self.with_inner_mut(|inner| inner.record_error(err))
    }

    /// Set the status of the referenced span.
    pub fn set_status(&self, status: Status) {
        self.with_inner_mut(|inner| inner.set_status(status))
    }

    /// Update the name of the referenced span.
    pub fn update_name(&self, new_name: impl Into<Cow<'static, str>>) {
        self.with_inner_mut(|inner| inner.update_name(new_name))
    }

    /// End the referenced span with the current timestamp.
    pub fn end(&self) {
        self.end_at(None)
    }

    /// End the referenced span with the given timestamp.
    pub fn end_with_timestamp(&self, timestamp: SystemTime) {
        self.end_at(Some(timestamp))
    }

    /// The recording is detached under the span lock, but the processors
    /// run only after the lock is released, so other holders of this
    /// context never block behind a slow exporter.
    fn end_at(&self, timestamp: Option<SystemTime>) {
        let Some(inner) = self.0.inner.as_ref() else {
            return;
        };
        let detached = match inner.lock() {
            Ok(mut locked) => locked.detach_for_export(timestamp),
            Err(err) => {
                crate::sdk_error!(name: "SpanRef.LockPoisoned", message = err.to_string());
                None
            }
        };
        if let Some((tracer, span_data)) = detached {
            tracer.provider().on_end(span_data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{SpanId, TraceFlags, TraceId, TraceState};

    fn remote_context(trace_id: u128) -> Context {
        Context::new().with_remote_span_context(SpanContext::new(
            TraceId::from(trace_id),
            SpanId::from(1u64),
            TraceFlags::SAMPLED,
            true,
            TraceState::default(),
        ))
    }

    #[test]
    fn empty_context_has_noop_span() {
        let cx = Context::new();
        assert!(!cx.has_active_span());
        assert!(!cx.span().is_recording());
        assert_eq!(*cx.span().span_context(), SpanContext::NONE);
    }

    #[test]
    fn attach_and_restore() {
        assert!(!Context::current().has_active_span());
        {
            let _outer = remote_context(1).attach();
            assert_eq!(
                Context::current().span().span_context().trace_id(),
                TraceId::from(1u128)
            );
            {
                let _inner = remote_context(2).attach();
                assert_eq!(
                    Context::current().span().span_context().trace_id(),
                    TraceId::from(2u128)
                );
            }
            assert_eq!(
                Context::current().span().span_context().trace_id(),
                TraceId::from(1u128)
            );
        }
        assert!(!Context::current().has_active_span());
    }

    #[test]
    fn remote_span_context_is_not_recording() {
        let cx = remote_context(7);
        assert!(cx.has_active_span());
        assert!(!cx.span().is_recording());
        assert!(cx.span().span_context().is_remote());
        // Mutations against a remote context are no-ops.
        cx.span().set_attribute(KeyValue::new("k", "v"));
        cx.span().end();
    }
}
