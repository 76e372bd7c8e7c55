use crate::{
    core::{serialization_info::SerializationInfo, tuple::Tuple},
    error::TupleError,
    io::{
        codec::check_consumed,
        varint::{read_vlong, write_vlong},
    },
    utils::util::Result,
};
use std::sync::Arc;

/// Decoded intermediate record: the raw bytes plus one reusable tuple per
/// source, of which `source` holds the current value.
#[derive(Debug, Clone)]
pub struct IntermediateRecord {
    bytes: Vec<u8>,
    source: usize,
    tuples: Vec<Tuple>,
}

impl IntermediateRecord {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut Vec<u8> {
        &mut self.bytes
    }

    pub fn source(&self) -> usize {
        self.source
    }

    pub fn tuple(&self) -> &Tuple {
        &self.tuples[self.source]
    }
}

/// Writes source tuples as `common + [source id] + specific` and reads them
/// back into the tuple slot of the source named by the id.
#[derive(Clone)]
pub struct IntermediateCodec {
    info: Arc<SerializationInfo>,
}

impl IntermediateCodec {
    pub fn new(info: Arc<SerializationInfo>) -> Self {
        Self { info }
    }

    pub fn info(&self) -> &Arc<SerializationInfo> {
        &self.info
    }

    /// Serializes a tuple of the source whose schema name it carries.
    pub fn serialize(&self, tuple: &Tuple, out: &mut Vec<u8>) -> Result<()> {
        let id = self.info.source_id(tuple.schema().name())?;
        self.serialize_source(id, tuple, out)
    }

    /// Appends one record; on failure `out` is left as it was.
    pub fn serialize_source(&self, id: usize, tuple: &Tuple, out: &mut Vec<u8>) -> Result<()> {
        let start = out.len();
        let result = self.write_record(id, tuple, out);
        if result.is_err() {
            out.truncate(start);
        }
        result
    }

    fn write_record(&self, id: usize, tuple: &Tuple, out: &mut Vec<u8>) -> Result<()> {
        let source = self.info.source(id)?;
        if tuple.schema().as_ref() != source.schema().as_ref() {
            return Err(crate::tuple_error!(
                "Tuple of schema '{}' does not match source '{}'",
                tuple.schema().name(),
                source.name()
            ));
        }
        self.info
            .common_codec()
            .write_projected(tuple, source.common_translation(), out)?;
        if self.info.is_multi_source() {
            write_vlong(out, id as i64);
        }
        source
            .specific_codec()
            .write_projected(tuple, source.specific_translation(), out)
    }

    pub fn new_record(&self) -> IntermediateRecord {
        IntermediateRecord {
            bytes: Vec::new(),
            source: 0,
            tuples: self
                .info
                .sources()
                .iter()
                .map(|s| Tuple::new(s.schema().clone()))
                .collect(),
        }
    }

    /// Source id of an encoded record, without decoding any field.
    pub fn source_of(&self, bytes: &[u8]) -> Result<usize> {
        if !self.info.is_multi_source() {
            return Ok(0);
        }
        let mut pos = 0;
        self.info.common_codec().skip(bytes, &mut pos)?;
        let id = read_vlong(bytes, &mut pos)?;
        usize::try_from(id)
            .ok()
            .filter(|id| *id < self.info.num_sources())
            .ok_or(TupleError::UnknownSourceId {
                id,
                sources: self.info.num_sources(),
            })
    }

    /// Decodes `record.bytes` into the tuple slot of its source.
    pub fn decode(&self, record: &mut IntermediateRecord) -> Result<()> {
        let id = self.source_of(&record.bytes)?;
        let source = self.info.source(id)?;
        let target = &mut record.tuples[id];
        let bytes = &record.bytes;
        let mut pos = 0;
        self.info
            .common_codec()
            .read_projected(bytes, &mut pos, target, source.common_translation())?;
        if self.info.is_multi_source() {
            read_vlong(bytes, &mut pos)?;
        }
        source
            .specific_codec()
            .read_projected(bytes, &mut pos, target, source.specific_translation())?;
        check_consumed(bytes, pos)?;
        record.source = id;
        Ok(())
    }

    /// Copies `bytes` into the record and decodes it.
    pub fn deserialize(&self, bytes: &[u8], record: &mut IntermediateRecord) -> Result<()> {
        record.bytes.clear();
        record.bytes.extend_from_slice(bytes);
        self.decode(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        config::TupleMrConfig,
        criteria::Criteria,
        schema::Schema,
        value::Value,
    };
    use crate::io::registry::Registry;

    fn two_sources() -> Arc<SerializationInfo> {
        let mut config = TupleMrConfig::new();
        config
            .add_schema(Schema::parse("clicks", "user:string,ts:long,url:string?").expect("schema"))
            .expect("add clicks");
        config
            .add_schema(Schema::parse("users", "name:string,uid:string").expect("schema"))
            .expect("add users");
        config
            .set_field_aliases("users", &[("user", "uid")])
            .set_group_by(&["user"])
            .set_order_by(Criteria::parse("user asc, #source desc").expect("criteria"));
        config
            .build(Arc::new(Registry::new()))
            .expect("configuration should compose")
    }

    #[test]
    fn test_layout_and_decode() {
        let info = two_sources();
        let codec = IntermediateCodec::new(info.clone());

        let mut user = Tuple::new(info.source(1).expect("users").schema().clone());
        user.set_by_name("name", "Ann").expect("set name");
        user.set_by_name("uid", "u1").expect("set uid");

        let mut bytes = Vec::new();
        codec.serialize(&user, &mut bytes).expect("serialize user");
        // common {user}, source id 1, specific {name}
        assert_eq!(bytes, b"\x02u1\x01\x03Ann");
        assert_eq!(codec.source_of(&bytes).expect("source id"), 1);

        let mut record = codec.new_record();
        codec.deserialize(&bytes, &mut record).expect("decode");
        assert_eq!(record.source(), 1);
        assert_eq!(record.tuple(), &user);
    }

    #[test]
    fn test_decode_reuses_slots_per_source() {
        let info = two_sources();
        let codec = IntermediateCodec::new(info.clone());

        let mut click = Tuple::new(info.source(0).expect("clicks").schema().clone());
        click.set_by_name("user", "u1").expect("set user");
        click.set_by_name("ts", 10i64).expect("set ts");
        click.set_by_name("url", "/a").expect("set url");
        let mut first = Vec::new();
        codec.serialize(&click, &mut first).expect("serialize click");

        click.unset(2);
        let mut second = Vec::new();
        codec.serialize(&click, &mut second).expect("serialize click without url");

        let mut record = codec.new_record();
        codec.deserialize(&first, &mut record).expect("decode first");
        assert_eq!(record.tuple().get_by_name("url"), Some(&Value::from("/a")));
        codec.deserialize(&second, &mut record).expect("decode second");
        assert_eq!(record.tuple().get_by_name("url"), None, "stale url must be cleared");
    }

    #[test]
    fn test_failed_serialize_leaves_buffer_untouched() {
        let info = two_sources();
        let codec = IntermediateCodec::new(info.clone());
        let mut out = b"prefix".to_vec();
        let mut user = Tuple::new(info.source(1).expect("users").schema().clone());
        user.set_by_name("uid", "u1").expect("set uid");
        codec
            .serialize(&user, &mut out)
            .expect_err("name is required");
        assert_eq!(out, b"prefix");

        let stranger = Tuple::new(Arc::new(Schema::parse("other", "x:int").expect("schema")));
        let err = codec.serialize(&stranger, &mut out).expect_err("unknown schema");
        assert!(matches!(err, TupleError::UnknownSchema { .. }));
    }

    #[test]
    fn test_unknown_source_id() {
        let codec = IntermediateCodec::new(two_sources());
        let err = codec.source_of(b"\x02u1\x07").expect_err("only two sources");
        assert!(matches!(err, TupleError::UnknownSourceId { id: 7, sources: 2 }));
    }
}
