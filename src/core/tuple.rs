use crate::{
    core::{schema::Schema, value::Value},
    error::TupleError,
    utils::util::Result,
};
use std::{fmt, sync::Arc};

/// Fixed-size bitmap, one bit per field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NullBits {
    words: Box<[u64]>,
    len: usize,
}

impl NullBits {
    pub fn new(len: usize) -> Self {
        Self {
            words: vec![0u64; len.div_ceil(64)].into_boxed_slice(),
            len,
        }
    }

    pub fn all_set(len: usize) -> Self {
        let mut bits = Self::new(len);
        bits.fill();
        bits
    }

    #[inline]
    pub fn get(&self, index: usize) -> bool {
        self.words[index / 64] & (1 << (index % 64)) != 0
    }

    #[inline]
    pub fn set(&mut self, index: usize) {
        self.words[index / 64] |= 1 << (index % 64);
    }

    #[inline]
    pub fn clear(&mut self, index: usize) {
        self.words[index / 64] &= !(1 << (index % 64));
    }

    pub fn fill(&mut self) {
        for (i, word) in self.words.iter_mut().enumerate() {
            let remaining = self.len - i * 64;
            *word = if remaining >= 64 {
                u64::MAX
            } else {
                (1u64 << remaining) - 1
            };
        }
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Read access shared by owned tuples and group views.
pub trait TupleRead {
    fn schema(&self) -> &Schema;

    /// `None` when the field is unset.
    fn get(&self, index: usize) -> Option<&Value>;

    fn len(&self) -> usize {
        self.schema().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.schema().index_of(name).and_then(|i| self.get(i))
    }
}

/// Mutable record bound to one schema: dense values plus an unset bitmap.
#[derive(Clone)]
pub struct Tuple {
    schema: Arc<Schema>,
    values: Vec<Value>,
    unset: NullBits,
}

impl Tuple {
    pub fn new(schema: Arc<Schema>) -> Self {
        let values = schema
            .fields()
            .iter()
            .map(|f| Value::placeholder(f.field_type()))
            .collect();
        let unset = NullBits::all_set(schema.len());
        Self {
            schema,
            values,
            unset,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_set(&self, index: usize) -> bool {
        index < self.values.len() && !self.unset.get(index)
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        if self.is_set(index) {
            Some(&self.values[index])
        } else {
            None
        }
    }

    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.schema.index_of(name).and_then(|i| self.get(i))
    }

    /// Stores a value after checking it against the field type.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        let field = self.schema.fields().get(index).ok_or_else(|| {
            crate::tuple_error!(
                "Field index {index} out of range for schema '{}' ({} fields)",
                self.schema.name(),
                self.schema.len()
            )
        })?;
        if !value.matches(field.field_type()) {
            return Err(TupleError::TypeMismatch {
                field: field.name().to_string(),
                expected: field.shape(),
                actual: value.type_name().to_string(),
            });
        }
        self.values[index] = value;
        self.unset.clear(index);
        Ok(())
    }

    pub fn set_by_name(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let index = self
            .schema
            .index_of(name)
            .ok_or_else(|| TupleError::missing_field(self.schema.name(), name))?;
        self.set(index, value)
    }

    pub fn unset(&mut self, index: usize) {
        self.unset.set(index);
    }

    /// Marks every field unset; values stay allocated for reuse.
    pub fn clear(&mut self) {
        self.unset.fill();
    }

    /// Resets a field to its declared default, or to unset.
    pub fn reset(&mut self, index: usize) {
        match self.schema.field(index).default_value() {
            Some(default) => {
                self.values[index] = default.clone();
                self.unset.clear(index);
            }
            None => self.unset.set(index),
        }
    }

    /// Slot used by decoders, which validate on their own.
    pub(crate) fn slot_mut(&mut self, index: usize) -> &mut Value {
        &mut self.values[index]
    }

    pub(crate) fn mark_set(&mut self, index: usize) {
        self.unset.clear(index);
    }
}

impl TupleRead for Tuple {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn get(&self, index: usize) -> Option<&Value> {
        Tuple::get(self, index)
    }
}

impl PartialEq for Tuple {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema
            && (0..self.len()).all(|i| self.get(i) == other.get(i))
    }
}

impl fmt::Debug for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (i, field) in self.schema.fields().iter().enumerate() {
            map.entry(&field.name(), &self.get(i));
        }
        map.finish()
    }
}

/// Reordered subset of another tuple's fields, without copying.
#[derive(Clone, Copy)]
pub struct GroupView<'a> {
    schema: &'a Schema,
    tuple: &'a Tuple,
    indexes: &'a [usize],
}

impl<'a> GroupView<'a> {
    pub fn new(schema: &'a Schema, tuple: &'a Tuple, indexes: &'a [usize]) -> Self {
        debug_assert_eq!(schema.len(), indexes.len());
        Self {
            schema,
            tuple,
            indexes,
        }
    }

    pub fn tuple(&self) -> &'a Tuple {
        self.tuple
    }
}

impl TupleRead for GroupView<'_> {
    fn schema(&self) -> &Schema {
        self.schema
    }

    fn get(&self, index: usize) -> Option<&Value> {
        self.indexes.get(index).and_then(|i| self.tuple.get(*i))
    }
}

impl fmt::Debug for GroupView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (i, field) in self.schema.fields().iter().enumerate() {
            map.entry(&field.name(), &TupleRead::get(self, i));
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Arc<Schema> {
        Arc::new(Schema::parse("users", "id:int,name:string?,score:double").expect("schema"))
    }

    #[test]
    fn test_null_bits() {
        let mut bits = NullBits::all_set(70);
        assert_eq!(bits.count(), 70);
        bits.clear(65);
        assert!(!bits.get(65));
        assert!(bits.get(69));
        bits.fill();
        assert_eq!(bits.count(), 70);
    }

    #[test]
    fn test_new_tuple_is_unset() {
        let tuple = Tuple::new(users());
        assert!((0..3).all(|i| tuple.get(i).is_none()));
    }

    #[test]
    fn test_set_validates_type() {
        let mut tuple = Tuple::new(users());
        tuple.set(0, 7).expect("int into int field");
        tuple.set_by_name("name", "ann").expect("string into string field");
        assert_eq!(tuple.get_by_name("name").and_then(Value::as_str), Some("ann"));

        let err = tuple.set(0, 7i64).expect_err("long into int field");
        assert!(matches!(err, TupleError::TypeMismatch { ref field, .. } if field == "id"));
        let err = tuple.set_by_name("missing", 1).expect_err("unknown field");
        assert!(matches!(err, TupleError::MissingField { .. }));
    }

    #[test]
    fn test_clear_and_reuse() {
        let mut tuple = Tuple::new(users());
        tuple.set(1, "bob").expect("set name");
        tuple.clear();
        assert!(tuple.get(1).is_none());
        // the allocation survives in the slot
        assert!(matches!(tuple.slot_mut(1), Value::String(s) if s == "bob"));
    }

    #[test]
    fn test_reset_uses_default() {
        let schema = Arc::new(
            Schema::new(
                "s",
                vec![
                    crate::core::schema::Field::new("a", crate::core::schema::FieldType::Int)
                        .with_default(5),
                    crate::core::schema::Field::new("b", crate::core::schema::FieldType::Int),
                ],
            )
            .expect("schema"),
        );
        let mut tuple = Tuple::new(schema);
        tuple.set(1, 3).expect("set b");
        tuple.reset(0);
        tuple.reset(1);
        assert_eq!(tuple.get(0), Some(&Value::Int(5)));
        assert_eq!(tuple.get(1), None);
    }

    #[test]
    fn test_group_view_reorders() {
        let mut tuple = Tuple::new(users());
        tuple.set(0, 1).expect("set id");
        tuple.set(2, 0.5).expect("set score");
        let view_schema = Schema::parse("g", "score:double,id:int").expect("view schema");
        let indexes = [2, 0];
        let view = GroupView::new(&view_schema, &tuple, &indexes);
        assert_eq!(view.get(0), Some(&Value::Double(0.5)));
        assert_eq!(view.get_by_name("id"), Some(&Value::Int(1)));
        assert_eq!(view.len(), 2);
    }
}
