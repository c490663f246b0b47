//! Representation of the entity producing telemetry.
//!
//! A [`Resource`] is an immutable attribute set describing the service, and
//! is handed to exporters once at configuration time rather than attached to
//! every span.

use crate::common::{Key, KeyValue, Value};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

/// Attribute key for the logical service name.
pub const SERVICE_NAME: &str = "service.name";

const TELEMETRY_SDK_NAME: &str = "telemetry.sdk.name";
const TELEMETRY_SDK_VERSION: &str = "telemetry.sdk.version";
const TELEMETRY_SDK_LANGUAGE: &str = "telemetry.sdk.language";

/// An immutable representation of the entity producing telemetry as attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct Resource {
    inner: Arc<ResourceInner>,
}

#[derive(Debug, PartialEq)]
struct ResourceInner {
    attrs: HashMap<Key, Value>,
}

impl Default for Resource {
    /// The default resource, describing this SDK and an unknown service.
    fn default() -> Self {
        Resource::builder().build()
    }
}

impl Resource {
    /// Creates an empty resource with no attributes at all.
    pub fn empty() -> Self {
        Resource {
            inner: Arc::new(ResourceInner {
                attrs: HashMap::new(),
            }),
        }
    }

    /// Creates a [`ResourceBuilder`] pre-populated with SDK attributes and a
    /// default service name.
    pub fn builder() -> ResourceBuilder {
        ResourceBuilder {
            attrs: HashMap::from([
                (
                    Key::from_static_str(TELEMETRY_SDK_NAME),
                    Value::from(env!("CARGO_PKG_NAME")),
                ),
                (
                    Key::from_static_str(TELEMETRY_SDK_VERSION),
                    Value::from(env!("CARGO_PKG_VERSION")),
                ),
                (
                    Key::from_static_str(TELEMETRY_SDK_LANGUAGE),
                    Value::from("rust"),
                ),
                (
                    Key::from_static_str(SERVICE_NAME),
                    Value::from("unknown_service"),
                ),
            ]),
        }
    }

    /// Creates a [`ResourceBuilder`] with no pre-populated attributes.
    pub fn builder_empty() -> ResourceBuilder {
        ResourceBuilder {
            attrs: HashMap::new(),
        }
    }

    /// Retrieves the value for the given key, if present.
    pub fn get(&self, key: &Key) -> Option<Value> {
        self.inner.attrs.get(key).cloned()
    }

    /// The number of attributes in this resource.
    pub fn len(&self) -> usize {
        self.inner.attrs.len()
    }

    /// Returns `true` if this resource has no attributes.
    pub fn is_empty(&self) -> bool {
        self.inner.attrs.is_empty()
    }

    /// Returns an iterator over the resource attributes.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value)> {
        self.inner.attrs.iter()
    }
}

/// A builder for [`Resource`].
#[derive(Debug)]
pub struct ResourceBuilder {
    attrs: HashMap<Key, Value>,
}

impl ResourceBuilder {
    /// Adds or replaces a single attribute.
    pub fn with_attribute(mut self, kv: KeyValue) -> Self {
        self.attrs.insert(kv.key, kv.value);
        self
    }

    /// Adds or replaces multiple attributes.
    pub fn with_attributes<T: IntoIterator<Item = KeyValue>>(mut self, attrs: T) -> Self {
        self.attrs
            .extend(attrs.into_iter().map(|kv| (kv.key, kv.value)));
        self
    }

    /// Sets the `service.name` attribute.
    pub fn with_service_name(self, name: impl Into<Cow<'static, str>>) -> Self {
        self.with_attribute(KeyValue::new(
            Key::from_static_str(SERVICE_NAME),
            Value::String(name.into()),
        ))
    }

    /// Builds the [`Resource`].
    pub fn build(self) -> Resource {
        Resource {
            inner: Arc::new(ResourceInner { attrs: self.attrs }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_resource_describes_sdk() {
        let resource = Resource::default();
        assert_eq!(
            resource.get(&Key::from_static_str(SERVICE_NAME)),
            Some(Value::from("unknown_service"))
        );
        assert_eq!(
            resource.get(&Key::from_static_str(TELEMETRY_SDK_LANGUAGE)),
            Some(Value::from("rust"))
        );
    }

    #[test]
    fn builder_overrides_service_name() {
        let resource = Resource::builder().with_service_name("checkout").build();
        assert_eq!(
            resource.get(&Key::from_static_str(SERVICE_NAME)),
            Some(Value::from("checkout"))
        );
    }

    #[test]
    fn empty_resource() {
        assert!(Resource::empty().is_empty());
        assert_eq!(Resource::builder_empty().build().len(), 0);
    }
}
