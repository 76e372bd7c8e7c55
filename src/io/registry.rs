//! Explicit registration of object serializers and raw comparators.
//!
//! A registry is built once by the caller, shared behind an `Arc`, and
//! consulted only while a job configuration is composed; per-record code paths
//! hold the resolved trait objects directly.

use crate::{
    core::{
        schema::Field,
        value::{ObjectRef, ObjectValue, Value},
    },
    error::TupleError,
    utils::util::Result,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{cmp::Ordering, collections::HashMap, fmt, marker::PhantomData, sync::Arc};

/// Encodes the payload of an `object` field. The codec adds the length prefix.
pub trait ObjectSerializer: Send + Sync {
    fn serialize(&self, value: &dyn ObjectValue, out: &mut Vec<u8>) -> Result<()>;
    fn deserialize(&self, bytes: &[u8]) -> Result<ObjectRef>;
}

/// Custom ordering for one sort element.
///
/// `compare_raw` receives the payload of string, bytes and object fields
/// (without the length prefix), the encoded span of a nested tuple, and the
/// fixed-width or varint encoding of every other type. `compare` must order
/// materialized values the same way.
pub trait RawComparator: Send + Sync {
    fn compare_raw(&self, left: &[u8], right: &[u8]) -> Result<Ordering>;
    fn compare(&self, left: &Value, right: &Value) -> Result<Ordering>;
}

/// Stores `T` as JSON through serde.
pub struct JsonObjectSerializer<T> {
    class: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonObjectSerializer<T> {
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            _marker: PhantomData,
        }
    }
}

impl<T> ObjectSerializer for JsonObjectSerializer<T>
where
    T: Serialize + DeserializeOwned + ObjectValue,
{
    fn serialize(&self, value: &dyn ObjectValue, out: &mut Vec<u8>) -> Result<()> {
        let value = value.as_any().downcast_ref::<T>().ok_or_else(|| {
            TupleError::object(&self.class, format!("value is not a {}", self.class))
        })?;
        serde_json::to_writer(out, value).map_err(|e| TupleError::object(&self.class, e))
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<ObjectRef> {
        let value: T =
            serde_json::from_slice(bytes).map_err(|e| TupleError::object(&self.class, e))?;
        Ok(Arc::new(value))
    }
}

#[derive(Default, Clone)]
pub struct Registry {
    serializers: HashMap<String, Arc<dyn ObjectSerializer>>,
    class_serializers: HashMap<String, Arc<dyn ObjectSerializer>>,
    comparators: HashMap<String, Arc<dyn RawComparator>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serializer selected by a field's explicit serializer name.
    pub fn register_serializer(
        &mut self,
        name: impl Into<String>,
        serializer: Arc<dyn ObjectSerializer>,
    ) -> &mut Self {
        self.serializers.insert(name.into(), serializer);
        self
    }

    /// Serializer used for every `object(<class>)` field without an explicit name.
    pub fn register_class(
        &mut self,
        class: impl Into<String>,
        serializer: Arc<dyn ObjectSerializer>,
    ) -> &mut Self {
        self.class_serializers.insert(class.into(), serializer);
        self
    }

    /// Registers a JSON serializer for `T` under its class name.
    pub fn register_json_class<T>(&mut self, class: &str) -> &mut Self
    where
        T: Serialize + DeserializeOwned + ObjectValue,
    {
        self.register_class(class, Arc::new(JsonObjectSerializer::<T>::new(class)))
    }

    pub fn register_comparator(
        &mut self,
        name: impl Into<String>,
        comparator: Arc<dyn RawComparator>,
    ) -> &mut Self {
        self.comparators.insert(name.into(), comparator);
        self
    }

    pub fn has_serializer(&self, name: &str) -> bool {
        self.serializers.contains_key(name)
    }

    pub fn has_comparator(&self, name: &str) -> bool {
        self.comparators.contains_key(name)
    }

    /// The field's named serializer first, then the one registered for its class.
    pub fn resolve_serializer(&self, field: &Field, class: &str) -> Result<Arc<dyn ObjectSerializer>> {
        if let Some(name) = field.serializer() {
            return self
                .serializers
                .get(name)
                .cloned()
                .ok_or_else(|| TupleError::UnregisteredName {
                    kind: "object serializer",
                    name: name.to_string(),
                });
        }
        self.class_serializers
            .get(class)
            .cloned()
            .ok_or_else(|| TupleError::UnregisteredName {
                kind: "object serializer",
                name: class.to_string(),
            })
    }

    pub fn resolve_comparator(&self, name: &str) -> Result<Arc<dyn RawComparator>> {
        self.comparators
            .get(name)
            .cloned()
            .ok_or_else(|| TupleError::UnregisteredName {
                kind: "comparator",
                name: name.to_string(),
            })
    }
}

fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<&str> {
    let mut keys: Vec<&str> = map.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("serializers", &sorted_keys(&self.serializers))
            .field("class_serializers", &sorted_keys(&self.class_serializers))
            .field("comparators", &sorted_keys(&self.comparators))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::FieldType;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn test_json_serializer_round_trip() {
        let serializer = JsonObjectSerializer::<Point>::new("Point");
        let mut out = Vec::new();
        serializer
            .serialize(&Point { x: 3, y: -4 }, &mut out)
            .expect("serialize point");
        assert_eq!(out, br#"{"x":3,"y":-4}"#);
        let back = serializer.deserialize(&out).expect("deserialize point");
        assert!(back.equals(&Point { x: 3, y: -4 }));
    }

    #[test]
    fn test_json_serializer_rejects_other_types() {
        let serializer = JsonObjectSerializer::<Point>::new("Point");
        let err = serializer
            .serialize(&String::from("nope"), &mut Vec::new())
            .expect_err("wrong concrete type");
        assert!(matches!(err, TupleError::ObjectSerialization { .. }));
        assert!(serializer.deserialize(b"{").is_err());
    }

    #[test]
    fn test_field_serializer_takes_precedence() {
        let mut registry = Registry::new();
        registry.register_json_class::<Point>("Point");
        let plain = Field::new("p", FieldType::Object("Point".into()));
        assert!(registry.resolve_serializer(&plain, "Point").is_ok());

        let named = plain.clone().with_serializer("custom");
        let err = registry
            .resolve_serializer(&named, "Point")
            .err()
            .expect("unregistered field serializer should fail");
        assert!(err.is_configuration());

        registry.register_serializer("custom", Arc::new(JsonObjectSerializer::<Point>::new("Point")));
        assert!(registry.resolve_serializer(&named, "Point").is_ok());
    }

    #[test]
    fn test_missing_comparator() {
        let registry = Registry::new();
        assert!(registry.resolve_comparator("nope").is_err());
        assert!(format!("{registry:?}").contains("comparators"));
    }
}
