//! Binary record codec.
//!
//! A record is an optional null bitmap (`ceil(nullable / 8)` bytes, LSB
//! first, only when the schema has nullable fields) followed by every non-null
//! field in schema order. There are no tags, headers or per-field flags; the
//! reader must know the writer schema.

use crate::{
    core::{
        schema::{EnumType, Field, FieldType, Schema},
        tuple::Tuple,
        value::Value,
    },
    error::TupleError,
    io::{
        registry::{ObjectSerializer, Registry},
        varint::{read_len, read_vint, read_vlong, skip_vlong, take, take_array, write_vint, write_vlong},
    },
    utils::util::Result,
};
use std::{fmt, sync::Arc};

/// Per-field encoding, resolved once against the registry.
#[derive(Clone)]
pub(crate) enum FieldCodec {
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
    Object {
        class: String,
        serializer: Arc<dyn ObjectSerializer>,
    },
    Tuple(Arc<RecordCodec>),
}

#[inline]
pub(crate) fn is_null(bitmap: &[u8], slot: Option<usize>) -> bool {
    slot.is_some_and(|s| bitmap[s / 8] & (1 << (s % 8)) != 0)
}

fn mismatch(field: &Field, value: &Value) -> TupleError {
    TupleError::TypeMismatch {
        field: field.name().to_string(),
        expected: field.shape(),
        actual: value.type_name().to_string(),
    }
}

impl FieldCodec {
    fn resolve(field: &Field, registry: &Registry) -> Result<Self> {
        let codec = match field.field_type() {
            FieldType::Int => FieldCodec::Int,
            FieldType::Long => FieldCodec::Long,
            FieldType::VInt => FieldCodec::VInt,
            FieldType::VLong => FieldCodec::VLong,
            FieldType::Float => FieldCodec::Float,
            FieldType::Double => FieldCodec::Double,
            FieldType::Boolean => FieldCodec::Boolean,
            FieldType::String => FieldCodec::String,
            FieldType::Bytes => FieldCodec::Bytes,
            FieldType::Enum(e) => FieldCodec::Enum(e.clone()),
            FieldType::Object(class) => FieldCodec::Object {
                class: class.clone(),
                serializer: registry.resolve_serializer(field, class)?,
            },
            FieldType::Tuple(schema) => {
                FieldCodec::Tuple(Arc::new(RecordCodec::new(schema.clone(), registry)?))
            }
        };
        Ok(codec)
    }

    fn write(&self, field: &Field, value: &Value, out: &mut Vec<u8>) -> Result<()> {
        match (self, value) {
            (FieldCodec::Int, Value::Int(v)) => out.extend_from_slice(&v.to_be_bytes()),
            (FieldCodec::Long, Value::Long(v)) => out.extend_from_slice(&v.to_be_bytes()),
            (FieldCodec::VInt, Value::Int(v)) => write_vint(out, *v),
            (FieldCodec::VLong, Value::Long(v)) => write_vlong(out, *v),
            (FieldCodec::Float, Value::Float(v)) => out.extend_from_slice(&v.to_be_bytes()),
            (FieldCodec::Double, Value::Double(v)) => out.extend_from_slice(&v.to_be_bytes()),
            (FieldCodec::Boolean, Value::Boolean(v)) => out.push(u8::from(*v)),
            (FieldCodec::String, Value::String(s)) => write_bytes(out, s.as_bytes()),
            (FieldCodec::Bytes, Value::Bytes(b)) => write_bytes(out, b),
            (FieldCodec::Enum(e), Value::Enum(ordinal)) => {
                let ordinal = e.check_ordinal(*ordinal as i64)?;
                write_vlong(out, ordinal as i64);
            }
            (FieldCodec::Object { serializer, .. }, Value::Object(object)) => {
                let mut payload = Vec::new();
                serializer.serialize(object.as_ref(), &mut payload)?;
                write_bytes(out, &payload);
            }
            (FieldCodec::Tuple(codec), Value::Tuple(tuple)) => codec.write(tuple, out)?,
            _ => return Err(mismatch(field, value)),
        }
        Ok(())
    }

    fn read(&self, buf: &[u8], pos: &mut usize, slot: &mut Value) -> Result<()> {
        match self {
            FieldCodec::Int => *slot = Value::Int(i32::from_be_bytes(take_array(buf, pos)?)),
            FieldCodec::Long => *slot = Value::Long(i64::from_be_bytes(take_array(buf, pos)?)),
            FieldCodec::VInt => *slot = Value::Int(read_vint(buf, pos)?),
            FieldCodec::VLong => *slot = Value::Long(read_vlong(buf, pos)?),
            FieldCodec::Float => *slot = Value::Float(f32::from_be_bytes(take_array(buf, pos)?)),
            FieldCodec::Double => {
                *slot = Value::Double(f64::from_be_bytes(take_array(buf, pos)?))
            }
            FieldCodec::Boolean => {
                let [byte] = take_array::<1>(buf, pos)?;
                *slot = Value::Boolean(byte != 0);
            }
            FieldCodec::String => {
                let text = std::str::from_utf8(read_bytes(buf, pos)?)?;
                match slot {
                    Value::String(existing) => {
                        existing.clear();
                        existing.push_str(text);
                    }
                    _ => *slot = Value::String(text.to_owned()),
                }
            }
            FieldCodec::Bytes => {
                let bytes = read_bytes(buf, pos)?;
                match slot {
                    Value::Bytes(existing) => {
                        existing.clear();
                        existing.extend_from_slice(bytes);
                    }
                    _ => *slot = Value::Bytes(bytes.to_vec()),
                }
            }
            FieldCodec::Enum(e) => {
                let ordinal = read_vlong(buf, pos)?;
                *slot = Value::Enum(e.check_ordinal(ordinal)?);
            }
            FieldCodec::Object { serializer, .. } => {
                *slot = Value::Object(serializer.deserialize(read_bytes(buf, pos)?)?);
            }
            FieldCodec::Tuple(codec) => {
                let nested = nested_slot(slot, codec.schema());
                codec.read(buf, pos, nested)?;
            }
        }
        Ok(())
    }

    pub(crate) fn skip(&self, buf: &[u8], pos: &mut usize) -> Result<()> {
        self.span(buf, pos).map(|_| ())
    }

    /// Advances past the field and returns the bytes a raw comparator sees:
    /// the payload of length-prefixed types, the whole encoding otherwise.
    pub(crate) fn span<'a>(&self, buf: &'a [u8], pos: &mut usize) -> Result<&'a [u8]> {
        let start = *pos;
        match self {
            FieldCodec::Int | FieldCodec::Float => take(buf, pos, 4),
            FieldCodec::Long | FieldCodec::Double => take(buf, pos, 8),
            FieldCodec::Boolean => take(buf, pos, 1),
            FieldCodec::VInt | FieldCodec::VLong | FieldCodec::Enum(_) => {
                skip_vlong(buf, pos)?;
                Ok(&buf[start..*pos])
            }
            FieldCodec::String | FieldCodec::Bytes | FieldCodec::Object { .. } => {
                read_bytes(buf, pos)
            }
            FieldCodec::Tuple(codec) => {
                codec.skip(buf, pos)?;
                Ok(&buf[start..*pos])
            }
        }
    }
}

impl fmt::Debug for FieldCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldCodec::Int => f.write_str("Int"),
            FieldCodec::Long => f.write_str("Long"),
            FieldCodec::VInt => f.write_str("VInt"),
            FieldCodec::VLong => f.write_str("VLong"),
            FieldCodec::Float => f.write_str("Float"),
            FieldCodec::Double => f.write_str("Double"),
            FieldCodec::Boolean => f.write_str("Boolean"),
            FieldCodec::String => f.write_str("String"),
            FieldCodec::Bytes => f.write_str("Bytes"),
            FieldCodec::Enum(e) => write!(f, "Enum({})", e.name),
            FieldCodec::Object { class, .. } => write!(f, "Object({class})"),
            FieldCodec::Tuple(codec) => write!(f, "Tuple({})", codec.schema().name()),
        }
    }
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    write_vlong(out, bytes.len() as i64);
    out.extend_from_slice(bytes);
}

fn read_bytes<'a>(buf: &'a [u8], pos: &mut usize) -> Result<&'a [u8]> {
    let len = read_len(buf, pos)?;
    take(buf, pos, len)
}

/// Reuses the nested tuple in `slot` when it has the right schema.
fn nested_slot<'a>(slot: &'a mut Value, schema: &Arc<Schema>) -> &'a mut Tuple {
    let reusable = matches!(&*slot, Value::Tuple(t) if t.schema() == schema);
    if !reusable {
        *slot = Value::Tuple(Box::new(Tuple::new(schema.clone())));
    }
    match slot {
        Value::Tuple(t) => t,
        _ => unreachable!("slot was just replaced by a tuple"),
    }
}

/// Encoder/decoder for one schema, with object serializers resolved.
#[derive(Clone)]
pub struct RecordCodec {
    schema: Arc<Schema>,
    fields: Vec<FieldCodec>,
}

impl RecordCodec {
    pub fn new(schema: Arc<Schema>, registry: &Registry) -> Result<Self> {
        let fields = schema
            .fields()
            .iter()
            .map(|f| FieldCodec::resolve(f, registry))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { schema, fields })
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub(crate) fn field_codec(&self, index: usize) -> &FieldCodec {
        &self.fields[index]
    }

    pub fn write(&self, tuple: &Tuple, out: &mut Vec<u8>) -> Result<()> {
        self.write_fields(tuple, None, out)
    }

    /// Writes the schema's fields taken from `tuple` at `indexes[i]`.
    pub fn write_projected(&self, tuple: &Tuple, indexes: &[usize], out: &mut Vec<u8>) -> Result<()> {
        debug_assert_eq!(indexes.len(), self.fields.len());
        self.write_fields(tuple, Some(indexes), out)
    }

    fn write_fields(&self, tuple: &Tuple, indexes: Option<&[usize]>, out: &mut Vec<u8>) -> Result<()> {
        let bitmap_start = out.len();
        out.resize(bitmap_start + self.schema.null_bitmap_len(), 0);
        for (i, codec) in self.fields.iter().enumerate() {
            let field = self.schema.field(i);
            let native = indexes.map_or(i, |ix| ix[i]);
            match tuple.get(native) {
                Some(value) => codec.write(field, value, out)?,
                None => match self.schema.null_slot(i) {
                    Some(slot) => out[bitmap_start + slot / 8] |= 1 << (slot % 8),
                    None => {
                        return Err(TupleError::NullNotAllowed {
                            field: field.name().to_string(),
                        })
                    }
                },
            }
        }
        Ok(())
    }

    pub fn read(&self, buf: &[u8], pos: &mut usize, target: &mut Tuple) -> Result<()> {
        self.read_fields(buf, pos, target, None)
    }

    /// Reads field `i` into `target` at `indexes[i]`.
    pub fn read_projected(
        &self,
        buf: &[u8],
        pos: &mut usize,
        target: &mut Tuple,
        indexes: &[usize],
    ) -> Result<()> {
        debug_assert_eq!(indexes.len(), self.fields.len());
        self.read_fields(buf, pos, target, Some(indexes))
    }

    fn read_fields(
        &self,
        buf: &[u8],
        pos: &mut usize,
        target: &mut Tuple,
        indexes: Option<&[usize]>,
    ) -> Result<()> {
        let bitmap = take(buf, pos, self.schema.null_bitmap_len())?;
        for (i, codec) in self.fields.iter().enumerate() {
            let native = indexes.map_or(i, |ix| ix[i]);
            if is_null(bitmap, self.schema.null_slot(i)) {
                target.unset(native);
                continue;
            }
            codec.read(buf, pos, target.slot_mut(native))?;
            target.mark_set(native);
        }
        Ok(())
    }

    pub fn skip(&self, buf: &[u8], pos: &mut usize) -> Result<()> {
        let bitmap = take(buf, pos, self.schema.null_bitmap_len())?;
        for (i, codec) in self.fields.iter().enumerate() {
            if !is_null(bitmap, self.schema.null_slot(i)) {
                codec.skip(buf, pos)?;
            }
        }
        Ok(())
    }

    pub fn encode(&self, tuple: &Tuple) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write(tuple, &mut out)?;
        Ok(out)
    }

    /// Decodes exactly one record spanning all of `bytes`.
    pub fn decode(&self, bytes: &[u8], target: &mut Tuple) -> Result<()> {
        let mut pos = 0;
        self.read(bytes, &mut pos, target)?;
        check_consumed(bytes, pos)
    }
}

pub(crate) fn check_consumed(bytes: &[u8], pos: usize) -> Result<()> {
    if pos != bytes.len() {
        return Err(crate::tuple_error!(
            "{} trailing bytes after record of {} bytes",
            bytes.len() - pos,
            pos
        ));
    }
    Ok(())
}

impl fmt::Debug for RecordCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordCodec")
            .field("schema", &self.schema.to_string())
            .field("fields", &self.fields)
            .finish()
    }
}

enum ReadStep {
    Skip,
    Read(usize),
    Nested(usize, Box<RecordReader>),
}

/// Reads records written with one schema into tuples of another.
///
/// Fields are matched by name. Writer fields missing from the target are
/// skipped; target fields missing from the writer are reset to their default
/// (or unset) on every read, so reused targets never keep stale values.
pub struct RecordReader {
    writer: Arc<RecordCodec>,
    target: Arc<Schema>,
    steps: Vec<ReadStep>,
    resets: Vec<usize>,
}

impl RecordReader {
    pub fn new(writer: Arc<RecordCodec>, target: Arc<Schema>) -> Result<Self> {
        let mut steps = Vec::with_capacity(writer.fields.len());
        for (i, field) in writer.schema.fields().iter().enumerate() {
            let Some(t) = target.index_of(field.name()) else {
                steps.push(ReadStep::Skip);
                continue;
            };
            let target_field = target.field(t);
            let step = match (field.field_type(), target_field.field_type()) {
                (FieldType::Tuple(from), FieldType::Tuple(to)) if from != to => {
                    let FieldCodec::Tuple(nested) = &writer.fields[i] else {
                        unreachable!("tuple fields resolve to tuple codecs");
                    };
                    ReadStep::Nested(t, Box::new(RecordReader::new(nested.clone(), to.clone())?))
                }
                (from, to) if from == to => ReadStep::Read(t),
                (from, to) => {
                    return Err(TupleError::TypeMismatch {
                        field: field.name().to_string(),
                        expected: to.to_string(),
                        actual: from.to_string(),
                    })
                }
            };
            steps.push(step);
        }
        let resets = (0..target.len())
            .filter(|t| !writer.schema.contains(target.field(*t).name()))
            .collect();
        Ok(Self {
            writer,
            target,
            steps,
            resets,
        })
    }

    pub fn target(&self) -> &Arc<Schema> {
        &self.target
    }

    pub fn read(&self, buf: &[u8], pos: &mut usize, target: &mut Tuple) -> Result<()> {
        let schema = &self.writer.schema;
        let bitmap = take(buf, pos, schema.null_bitmap_len())?;
        for (i, step) in self.steps.iter().enumerate() {
            let codec = &self.writer.fields[i];
            if is_null(bitmap, schema.null_slot(i)) {
                match step {
                    ReadStep::Skip => {}
                    ReadStep::Read(t) | ReadStep::Nested(t, _) => target.unset(*t),
                }
                continue;
            }
            match step {
                ReadStep::Skip => codec.skip(buf, pos)?,
                ReadStep::Read(t) => {
                    codec.read(buf, pos, target.slot_mut(*t))?;
                    target.mark_set(*t);
                }
                ReadStep::Nested(t, reader) => {
                    let nested = nested_slot(target.slot_mut(*t), &reader.target);
                    reader.read(buf, pos, nested)?;
                    target.mark_set(*t);
                }
            }
        }
        for t in &self.resets {
            target.reset(*t);
        }
        Ok(())
    }

    pub fn decode(&self, bytes: &[u8], target: &mut Tuple) -> Result<()> {
        let mut pos = 0;
        self.read(bytes, &mut pos, target)?;
        check_consumed(bytes, pos)
    }
}
