use crate::{
    constants::RESERVED_FIELD_PREFIX,
    core::value::Value,
    error::TupleError,
    utils::util::Result,
};
use serde::{Deserialize, Serialize, Serializer};
use std::{collections::HashMap, fmt, sync::Arc};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnumType {
    pub name: String,
    pub symbols: Vec<String>,
}

impl EnumType {
    pub fn new(name: impl Into<String>, symbols: &[&str]) -> Self {
        Self {
            name: name.into(),
            symbols: symbols.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    pub fn ordinal_of(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }

    pub fn symbol(&self, ordinal: usize) -> Option<&str> {
        self.symbols.get(ordinal).map(String::as_str)
    }

    pub(crate) fn check_ordinal(&self, ordinal: i64) -> Result<usize> {
        usize::try_from(ordinal)
            .ok()
            .filter(|o| *o < self.symbols.len())
            .ok_or_else(|| TupleError::EnumOrdinalOutOfRange {
                name: self.name.clone(),
                ordinal,
                size: self.symbols.len(),
            })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldType {
    Int,
    Long,
    VInt,
    VLong,
    Float,
    Double,
    Boolean,
    String,
    Bytes,
    Enum(Arc<EnumType>),
    /// Opaque value handled by a serializer registered for the class name.
    Object(String),
    Tuple(Arc<Schema>),
}

impl FieldType {
    pub fn is_nested(&self) -> bool {
        matches!(self, FieldType::Tuple(_))
    }

    fn parse(text: &str) -> std::result::Result<Self, String> {
        let field_type = match text {
            "int" => FieldType::Int,
            "long" => FieldType::Long,
            "vint" => FieldType::VInt,
            "vlong" => FieldType::VLong,
            "float" => FieldType::Float,
            "double" => FieldType::Double,
            "boolean" => FieldType::Boolean,
            "string" => FieldType::String,
            "bytes" => FieldType::Bytes,
            _ => {
                if let Some(class) = strip_call(text, "object") {
                    if class.is_empty() {
                        return Err("object type needs a class name".to_string());
                    }
                    FieldType::Object(class.to_string())
                } else if let Some(body) = strip_call(text, "enum") {
                    let (name, symbols) = body
                        .split_once(':')
                        .ok_or_else(|| format!("enum '{body}' must be written Name:A|B"))?;
                    let symbols: Vec<String> =
                        symbols.split('|').map(|s| s.trim().to_string()).collect();
                    if name.trim().is_empty() || symbols.iter().any(String::is_empty) {
                        return Err(format!("enum '{body}' has an empty name or symbol"));
                    }
                    FieldType::Enum(Arc::new(EnumType {
                        name: name.trim().to_string(),
                        symbols,
                    }))
                } else if strip_call(text, "tuple").is_some() {
                    return Err("nested tuples have no text form".to_string());
                } else {
                    return Err(format!("unknown type '{text}'"));
                }
            }
        };
        Ok(field_type)
    }
}

fn strip_call<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    text.strip_prefix(name)?
        .trim_start()
        .strip_prefix('(')?
        .strip_suffix(')')
        .map(str::trim)
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Int => f.write_str("int"),
            FieldType::Long => f.write_str("long"),
            FieldType::VInt => f.write_str("vint"),
            FieldType::VLong => f.write_str("vlong"),
            FieldType::Float => f.write_str("float"),
            FieldType::Double => f.write_str("double"),
            FieldType::Boolean => f.write_str("boolean"),
            FieldType::String => f.write_str("string"),
            FieldType::Bytes => f.write_str("bytes"),
            FieldType::Enum(e) => write!(f, "enum({}:{})", e.name, e.symbols.join("|")),
            FieldType::Object(class) => write!(f, "object({class})"),
            FieldType::Tuple(schema) => write!(f, "tuple({})", schema.name()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    name: String,
    field_type: FieldType,
    nullable: bool,
    default: Option<Value>,
    serializer: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            nullable: false,
            default: None,
            serializer: None,
        }
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    /// Names a registered object serializer overriding the class lookup.
    pub fn with_serializer(mut self, name: impl Into<String>) -> Self {
        self.serializer = Some(name.into());
        self
    }

    pub(crate) fn renamed(&self, name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..self.clone()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn serializer(&self) -> Option<&str> {
        self.serializer.as_deref()
    }

    /// Type and nullability match, names aside.
    pub fn same_shape(&self, other: &Field) -> bool {
        self.field_type == other.field_type && self.nullable == other.nullable
    }

    pub fn shape(&self) -> String {
        format!("{}{}", self.field_type, if self.nullable { "?" } else { "" })
    }

    fn parse(text: &str) -> std::result::Result<Self, String> {
        let (name, type_text) = text
            .split_once(':')
            .ok_or_else(|| format!("field '{text}' must be written name:type"))?;
        let name = name.trim();
        if name.is_empty() {
            return Err(format!("field '{text}' has an empty name"));
        }
        let type_text = type_text.trim();
        let (type_text, nullable) = match type_text.strip_suffix('?') {
            Some(stripped) => (stripped.trim_end(), true),
            None => (type_text, false),
        };
        let mut field = Field::new(name, FieldType::parse(type_text)?);
        field.nullable = nullable;
        Ok(field)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.shape())
    }
}

/// Named, ordered list of fields. Field order is the wire order and the
/// comparison order.
#[derive(Clone, Debug, Deserialize)]
#[serde(try_from = "SchemaDoc")]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
    index: HashMap<String, usize>,
    null_slots: Vec<Option<usize>>,
    nullable_count: usize,
}

impl Schema {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Result<Self> {
        let name = name.into();
        for field in &fields {
            if field.name.starts_with(RESERVED_FIELD_PREFIX) {
                return Err(TupleError::ReservedField {
                    schema: name,
                    field: field.name.clone(),
                });
            }
        }
        Self::build(name, fields)
    }

    /// Derived schemas may carry any name already validated in a source.
    pub(crate) fn build(name: String, fields: Vec<Field>) -> Result<Self> {
        let mut index = HashMap::with_capacity(fields.len());
        let mut null_slots = Vec::with_capacity(fields.len());
        let mut nullable_count = 0;
        for (i, field) in fields.iter().enumerate() {
            if index.insert(field.name.clone(), i).is_some() {
                return Err(TupleError::DuplicateField {
                    schema: name,
                    field: field.name.clone(),
                });
            }
            if let Some(default) = &field.default {
                if !default.matches(&field.field_type) {
                    return Err(TupleError::InvalidDefault {
                        field: field.name.clone(),
                        field_type: field.shape(),
                    });
                }
            }
            if field.nullable {
                null_slots.push(Some(nullable_count));
                nullable_count += 1;
            } else {
                null_slots.push(None);
            }
        }
        Ok(Self {
            name,
            fields,
            index,
            null_slots,
            nullable_count,
        })
    }

    /// Parses `name:type[?][,name:type[?]]*`.
    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self> {
        let syntax = |reason: String| TupleError::SchemaSyntax {
            text: text.to_string(),
            reason,
        };
        let mut fields = Vec::new();
        for part in split_top_level(text) {
            let part = part.trim();
            if part.is_empty() {
                return Err(syntax("empty field declaration".to_string()));
            }
            fields.push(Field::parse(part).map_err(syntax)?);
        }
        if fields.is_empty() {
            return Err(syntax("no fields".to_string()));
        }
        Self::new(name, fields)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, index: usize) -> &Field {
        &self.fields[index]
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn field_by_name(&self, name: &str) -> Option<&Field> {
        self.index_of(name).map(|i| &self.fields[i])
    }

    pub fn nullable_count(&self) -> usize {
        self.nullable_count
    }

    /// Position of the field inside the null bitmap, if nullable.
    pub fn null_slot(&self, index: usize) -> Option<usize> {
        self.null_slots[index]
    }

    pub fn null_bitmap_len(&self) -> usize {
        self.nullable_count.div_ceil(8)
    }

    pub fn has_text_form(&self) -> bool {
        !self.fields.iter().any(|f| f.field_type.is_nested())
    }

    /// Field list in text form, without the schema name.
    pub fn fields_text(&self) -> String {
        self.fields
            .iter()
            .map(Field::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{{}}}", self.name, self.fields_text())
    }
}

fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

#[derive(Serialize, Deserialize)]
struct SchemaDoc {
    name: String,
    fields: String,
}

impl TryFrom<SchemaDoc> for Schema {
    type Error = TupleError;

    fn try_from(doc: SchemaDoc) -> Result<Self> {
        Schema::parse(doc.name, &doc.fields)
    }
}

impl Serialize for Schema {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if !self.has_text_form() {
            return Err(serde::ser::Error::custom(format!(
                "schema '{}' has nested tuple fields and cannot be written as text",
                self.name
            )));
        }
        if self.fields.iter().any(|f| f.default.is_some() || f.serializer.is_some()) {
            log::warn!(
                "Field defaults and serializer names of schema '{}' are not persisted",
                self.name
            );
        }
        SchemaDoc {
            name: self.name.clone(),
            fields: self.fields_text(),
        }
        .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_text_form() {
        let schema = Schema::parse(
            "events",
            "id:long, name:string?, kind:enum(Kind:A|B|C),payload:object(demo.Point), n:vint",
        )
        .expect("schema text should parse");
        assert_eq!(schema.len(), 5);
        assert_eq!(schema.field(0).field_type(), &FieldType::Long);
        assert!(schema.field(1).is_nullable());
        assert_eq!(
            schema.field(2).field_type(),
            &FieldType::Enum(Arc::new(EnumType::new("Kind", &["A", "B", "C"])))
        );
        assert_eq!(
            schema.field(3).field_type(),
            &FieldType::Object("demo.Point".to_string())
        );
        assert_eq!(schema.index_of("n"), Some(4));
        assert_eq!(schema.nullable_count(), 1);
        assert_eq!(schema.null_slot(1), Some(0));
        assert_eq!(schema.null_slot(0), None);
    }

    #[test]
    fn test_text_form_is_stable() {
        let text = "a:int,b:string?,c:enum(E:X|Y),d:object(cls),e:bytes";
        let schema = Schema::parse("s", text).expect("schema text should parse");
        assert_eq!(schema.fields_text(), text);
        let reparsed = Schema::parse("other", &schema.fields_text()).expect("reparse");
        assert_eq!(schema, reparsed, "equality ignores the schema name");
    }

    #[test]
    fn test_rejects_duplicate_and_reserved_fields() {
        let err = Schema::parse("s", "a:int,a:long").expect_err("duplicate field");
        assert!(matches!(err, TupleError::DuplicateField { ref field, .. } if field == "a"));

        let err = Schema::parse("s", "#source:int").expect_err("reserved field");
        assert!(matches!(err, TupleError::ReservedField { .. }));
    }

    #[test]
    fn test_rejects_bad_syntax() {
        for text in ["", "a", "a:integer", "a:int,,b:int", "a:tuple(x)", "a:enum(E)"] {
            let err = Schema::parse("s", text).expect_err("malformed text should fail");
            assert!(err.is_configuration(), "{text}: {err}");
        }
    }

    #[test]
    fn test_rejects_mismatched_default() {
        let err = Schema::new(
            "s",
            vec![Field::new("a", FieldType::Int).with_default("text")],
        )
        .expect_err("string default on int field");
        assert!(matches!(err, TupleError::InvalidDefault { .. }));
    }

    #[test]
    fn test_serde_uses_text_form() {
        let schema = Schema::parse("users", "id:int,name:string?").expect("parse");
        let json = serde_json::to_string(&schema).expect("serialize");
        assert_eq!(json, r#"{"name":"users","fields":"id:int,name:string?"}"#);
        let back: Schema = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, schema);
        assert_eq!(back.name(), "users");
    }

    #[test]
    fn test_nested_schema_has_no_text_form() {
        let inner = Arc::new(Schema::parse("inner", "x:int").expect("parse"));
        let outer = Schema::new("outer", vec![Field::new("t", FieldType::Tuple(inner))])
            .expect("nested schema");
        assert!(!outer.has_text_form());
        assert!(serde_json::to_string(&outer).is_err());
    }
}
