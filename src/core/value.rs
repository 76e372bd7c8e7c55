use crate::core::{schema::FieldType, tuple::Tuple};
use std::{any::Any, fmt, sync::Arc};

/// Opaque value stored in `object` fields.
///
/// Implemented for every `PartialEq + Debug + Send + Sync + 'static` type, so
/// plain structs can be stored without extra code.
pub trait ObjectValue: fmt::Debug + Send + Sync + 'static {
    fn as_any(&self) -> &dyn Any;
    fn equals(&self, other: &dyn ObjectValue) -> bool;
}

impl<T> ObjectValue for T
where
    T: PartialEq + fmt::Debug + Send + Sync + 'static,
{
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn equals(&self, other: &dyn ObjectValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| other == self)
    }
}

pub type ObjectRef = Arc<dyn ObjectValue>;

pub fn object<T: ObjectValue>(value: T) -> Value {
    Value::Object(Arc::new(value))
}

#[derive(Clone, Debug)]
pub enum Value {
    /// `int` and `vint`
    Int(i32),
    /// `long` and `vlong`
    Long(i64),
    Float(f32),
    Double(f64),
    Boolean(bool),
    String(String),
    Bytes(Vec<u8>),
    /// Ordinal into the field's symbol list.
    Enum(usize),
    Object(ObjectRef),
    Tuple(Box<Tuple>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Boolean(_) => "boolean",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Enum(_) => "enum",
            Value::Object(_) => "object",
            Value::Tuple(_) => "tuple",
        }
    }

    /// Whether the value can be stored in a field of the given type.
    pub fn matches(&self, field_type: &FieldType) -> bool {
        match (self, field_type) {
            (Value::Int(_), FieldType::Int | FieldType::VInt)
            | (Value::Long(_), FieldType::Long | FieldType::VLong)
            | (Value::Float(_), FieldType::Float)
            | (Value::Double(_), FieldType::Double)
            | (Value::Boolean(_), FieldType::Boolean)
            | (Value::String(_), FieldType::String)
            | (Value::Bytes(_), FieldType::Bytes)
            | (Value::Object(_), FieldType::Object(_)) => true,
            (Value::Enum(ordinal), FieldType::Enum(e)) => *ordinal < e.symbols.len(),
            (Value::Tuple(t), FieldType::Tuple(schema)) => t.schema().as_ref() == schema.as_ref(),
            _ => false,
        }
    }

    /// Placeholder stored in unset slots so decoding can reuse allocations.
    pub(crate) fn placeholder(field_type: &FieldType) -> Self {
        match field_type {
            FieldType::Int | FieldType::VInt => Value::Int(0),
            FieldType::Long | FieldType::VLong => Value::Long(0),
            FieldType::Float => Value::Float(0.0),
            FieldType::Double => Value::Double(0.0),
            FieldType::Boolean => Value::Boolean(false),
            FieldType::String => Value::String(String::new()),
            FieldType::Bytes => Value::Bytes(Vec::new()),
            FieldType::Enum(_) => Value::Enum(0),
            FieldType::Object(_) => Value::Object(Arc::new(())),
            FieldType::Tuple(schema) => Value::Tuple(Box::new(Tuple::new(schema.clone()))),
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            Value::Int(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object<T: 'static>(&self) -> Option<&T> {
        match self {
            Value::Object(o) => o.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&Tuple> {
        match self {
            Value::Tuple(t) => Some(t),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            // bit patterns, so NaN keys group together
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.equals(b.as_ref()),
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            _ => false,
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Tuple> for Value {
    fn from(v: Tuple) -> Self {
        Value::Tuple(Box::new(v))
    }
}
