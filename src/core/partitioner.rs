use crate::{
    core::{serialization_info::SerializationInfo, tuple::Tuple},
    utils::util::{stable_hash64, Result},
};
use std::sync::Arc;

/// Assigns source tuples to reducers by hashing their encoded partition
/// fields, so equal partition values land together whatever the source.
pub struct Partitioner {
    info: Arc<SerializationInfo>,
    scratch: Vec<u8>,
}

impl Partitioner {
    pub fn new(info: Arc<SerializationInfo>) -> Self {
        Self {
            info,
            scratch: Vec::new(),
        }
    }

    pub fn partition(&mut self, tuple: &Tuple, num_partitions: usize) -> Result<usize> {
        let id = self.info.source_id(tuple.schema().name())?;
        self.partition_source(id, tuple, num_partitions)
    }

    pub fn partition_source(&mut self, id: usize, tuple: &Tuple, num_partitions: usize) -> Result<usize> {
        if num_partitions == 0 {
            return Err(crate::tuple_error!("Number of partitions must be positive"));
        }
        let source = self.info.source(id)?;
        self.scratch.clear();
        self.info
            .partition_codec()
            .write_projected(tuple, source.partition_translation(), &mut self.scratch)?;
        let hash = stable_hash64(&self.scratch) & i64::MAX as u64;
        Ok((hash % num_partitions as u64) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{config::TupleMrConfig, criteria::Criteria, schema::Schema};
    use crate::io::registry::Registry;

    fn info() -> Arc<SerializationInfo> {
        let mut config = TupleMrConfig::new();
        config
            .add_schema(Schema::parse("orders", "id:long,customer:string,total:double").expect("schema"))
            .expect("add orders");
        config
            .add_schema(Schema::parse("customers", "cid:string,id:long,country:string").expect("schema"))
            .expect("add customers");
        config
            .set_field_aliases("customers", &[("customer", "cid")])
            .set_group_by(&["customer", "id"])
            .set_order_by(Criteria::parse("customer asc, id asc").expect("criteria"))
            .set_partition_fields(&["customer"]);
        config
            .build(Arc::new(Registry::new()))
            .expect("configuration should compose")
    }

    #[test]
    fn test_same_partition_values_share_partition() {
        let info = info();
        let mut partitioner = Partitioner::new(info.clone());

        let mut order = Tuple::new(info.source(0).expect("orders").schema().clone());
        order.set(0, 7i64).expect("set id");
        order.set(1, "acme").expect("set customer");
        order.set(2, 9.5).expect("set total");

        let mut customer = Tuple::new(info.source(1).expect("customers").schema().clone());
        customer.set(0, "acme").expect("set cid");
        customer.set(1, 99i64).expect("set id");
        customer.set(2, "NL").expect("set country");

        for n in [1, 2, 7, 64] {
            let left = partitioner.partition(&order, n).expect("partition order");
            let right = partitioner.partition(&customer, n).expect("partition customer");
            assert_eq!(left, right, "{n} partitions");
            assert!(left < n);
        }
    }

    #[test]
    fn test_partition_is_stable_hash_of_encoding() {
        let info = info();
        let mut partitioner = Partitioner::new(info.clone());
        let mut customer = Tuple::new(info.source(1).expect("customers").schema().clone());
        customer.set(0, "acme").expect("set cid");
        customer.set(1, 1i64).expect("set id");
        customer.set(2, "NL").expect("set country");

        let expected = (stable_hash64(b"\x04acme") & i64::MAX as u64) % 13;
        assert_eq!(
            partitioner.partition(&customer, 13).expect("partition"),
            expected as usize
        );
        assert!(partitioner.partition(&customer, 0).is_err());
    }
}
