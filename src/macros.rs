//! Internal logging macros.
//!
//! `sdk_debug!`, `sdk_warn!` and `sdk_error!` carry diagnostics emitted by
//! the SDK itself and by custom exporters or processors. They are not a
//! general application logging facility. Every event has a `name:`
//! identifying the operation, plus optional key-value attributes, and is
//! emitted through [`tracing`] under this crate's name as the target. With
//! the `internal-logs` feature disabled they compile to nothing.
//!
//! [`tracing`]: https://docs.rs/tracing

/// Dispatches to the `tracing` macro for the given level. Not part of the
/// public API; use the level-specific wrappers instead.
#[doc(hidden)]
#[macro_export]
macro_rules! sdk_log {
    ($level:ident, name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::$level!(
                name: $name,
                target: env!("CARGO_PKG_NAME"),
                name = $name
                $(, $key = $value)*
            );
        }
        #[cfg(not(feature = "internal-logs"))]
        {
            let _ = ($name, $($value),*);
        }
    };
}

/// Logs a debug message from inside the SDK.
///
/// # Example:
/// ```rust
/// tracekit::sdk_debug!(name: "BatchProcessor.BatchExported", batch_size = 512);
/// ```
#[macro_export]
macro_rules! sdk_debug {
    ($($arg:tt)+) => {{ $crate::sdk_log!(debug, $($arg)+); }};
}

/// Logs a warning from inside the SDK.
///
/// # Example:
/// ```rust
/// tracekit::sdk_warn!(name: "BatchProcessor.QueueFull", message = "items are being dropped");
/// ```
#[macro_export]
macro_rules! sdk_warn {
    ($($arg:tt)+) => {{ $crate::sdk_log!(warn, $($arg)+); }};
}

/// Logs an error from inside the SDK.
///
/// # Example:
/// ```rust
/// tracekit::sdk_error!(name: "BatchProcessor.ExportFailed", error_code = 500);
/// ```
#[macro_export]
macro_rules! sdk_error {
    ($($arg:tt)+) => {{ $crate::sdk_log!(error, $($arg)+); }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn macros_accept_all_argument_shapes() {
        crate::sdk_debug!(name: "Test.NameOnly");
        crate::sdk_warn!(name: "Test.OneAttribute", code = 42);
        crate::sdk_error!(
            name: "Test.ManyAttributes",
            code = 42,
            message = String::from("owned"),
        );
    }
}
