use super::*;
use crate::core::schema::FieldType;
use crate::io::registry::Registry;

fn registry() -> Arc<Registry> {
    Arc::new(Registry::new())
}

fn schema(name: &str, text: &str) -> Schema {
    Schema::parse(name, text).expect("schema text should parse")
}

fn criteria(text: &str) -> Criteria {
    Criteria::parse(text).expect("criteria text should parse")
}

fn names(schema: &Schema) -> Vec<&str> {
    schema.fields().iter().map(Field::name).collect()
}

fn two_schema_config() -> TupleMrConfig {
    let mut config = TupleMrConfig::new();
    config
        .add_schema(schema("schema1", "ax:int,bx:string,c:string,blabla:string,px:string"))
        .expect("add schema1");
    config
        .add_schema(schema("schema2", "ay:int,cy:string,by:string,p:string,blobloy:string"))
        .expect("add schema2");
    config
        .set_field_aliases("schema1", &[("a", "ax"), ("b", "bx"), ("p", "px")])
        .set_field_aliases("schema2", &[("a", "ay"), ("b", "by"), ("c", "cy"), ("bloblo", "blobloy")])
        .set_group_by(&["c", "b"])
        .set_order_by(criteria("b asc, c desc, #source desc, a desc"))
        .set_specific_order_by("schema1", criteria("blabla desc"))
        .set_partition_fields(&["p"]);
    config
}

#[test]
fn test_compose_aliased_sources() {
    let info = SerializationInfo::compose(&two_schema_config(), registry())
        .expect("configuration should compose");

    assert_eq!(names(info.group_schema()), ["b", "c"]);
    assert_eq!(names(info.common_schema()), ["b", "c"]);
    assert_eq!(info.common_criteria().to_string(), "b asc, c desc");
    assert_eq!(info.source_order(), Some(SortOrder::Desc));
    assert_eq!(names(info.partition_schema()), ["p"]);
    assert!(info.rollup().is_none());

    let s1 = info.source(0).expect("schema1");
    assert_eq!(s1.name(), "schema1");
    assert_eq!(names(s1.specific_schema()), ["a", "blabla", "p"]);
    assert_eq!(s1.specific_schema().field(0).field_type(), &FieldType::Int);
    assert_eq!(s1.specific_criteria().to_string(), "a desc, blabla desc");
    assert_eq!(s1.common_translation(), [1, 2]);
    assert_eq!(s1.specific_translation(), [0, 3, 4]);
    assert_eq!(s1.group_translation(), [1, 2]);
    assert_eq!(s1.partition_translation(), [4]);

    let s2 = info.source(1).expect("schema2");
    assert_eq!(names(s2.specific_schema()), ["a", "p", "bloblo"]);
    assert_eq!(s2.specific_criteria().to_string(), "a desc");
    assert_eq!(s2.common_translation(), [2, 1]);
    assert_eq!(s2.specific_translation(), [0, 3, 4]);
    assert_eq!(s2.partition_translation(), [3]);

    assert_eq!(info.source_id("schema2").expect("known schema"), 1);
    assert!(matches!(
        info.source_id("schema3"),
        Err(TupleError::UnknownSchema { .. })
    ));

    let text = info.to_string();
    assert!(text.contains("common schema:    {b:string,c:string}"));
    assert!(text.contains("source 1 'schema2':"));
}

#[test]
fn test_default_order_and_implicit_source_order() {
    let mut config = TupleMrConfig::new();
    config
        .add_schema(schema("left", "k:int,v:string"))
        .expect("add left");
    config
        .add_schema(schema("right", "w:double,k:int"))
        .expect("add right");
    config.set_group_by(&["k"]);

    let info = SerializationInfo::compose(&config, registry()).expect("configuration should compose");
    assert_eq!(info.common_criteria().to_string(), "k asc");
    assert_eq!(info.source_order(), Some(SortOrder::Asc));
    assert_eq!(names(info.source(0).expect("left").specific_schema()), ["v"]);
    assert_eq!(names(info.source(1).expect("right").specific_schema()), ["w"]);
    assert!(info.source(1).expect("right").specific_criteria().is_empty());
}

#[test]
fn test_single_source_ignores_source_order() {
    let mut config = TupleMrConfig::new();
    config
        .add_schema(schema("only", "a:string,b:long,c:boolean"))
        .expect("add schema");
    config
        .set_group_by(&["a"])
        .set_order_by(criteria("a asc, #source desc, b desc"));

    let info = SerializationInfo::compose(&config, registry()).expect("configuration should compose");
    assert!(!info.is_multi_source());
    assert_eq!(info.source_order(), None);
    assert_eq!(names(info.common_schema()), ["a", "b"]);
    assert_eq!(names(info.source(0).expect("only").specific_schema()), ["c"]);
}

#[test]
fn test_rollup_depths_and_partition() {
    let mut config = TupleMrConfig::new();
    config
        .add_schema(schema("sales", "country:string,city:string,shop:string,amount:long"))
        .expect("add schema");
    config
        .set_group_by(&["country", "city", "shop"])
        .set_order_by(criteria("country asc, city asc, shop asc, amount desc"))
        .set_rollup_from("city");

    let info = SerializationInfo::compose(&config, registry()).expect("configuration should compose");
    assert_eq!(
        info.rollup(),
        Some(RollupDepths {
            min_depth: 1,
            max_depth: 2
        })
    );
    assert_eq!(names(info.partition_schema()), ["country", "city"]);
    assert_eq!(names(info.group_schema()), ["country", "city", "shop"]);
    assert_eq!(names(info.common_schema()), ["country", "city", "shop", "amount"]);
}

#[test]
fn test_nullable_fields_keep_shape() {
    let mut config = TupleMrConfig::new();
    config
        .add_schema(schema("a", "k:string?,x:int"))
        .expect("add a");
    config
        .add_schema(schema("b", "k:string,y:int"))
        .expect("add b");
    config.set_group_by(&["k"]);
    let err = SerializationInfo::compose(&config, registry())
        .err()
        .expect("nullability differs");
    assert!(matches!(
        err,
        TupleError::InconsistentFieldType { ref left, ref right, .. } if left == "string?" && right == "string"
    ));
}

fn compose_err(config: &TupleMrConfig) -> TupleError {
    let err = SerializationInfo::compose(config, registry())
        .err()
        .expect("configuration should be rejected");
    assert!(err.is_configuration(), "{err} should be a configuration error");
    err
}

fn base_config() -> TupleMrConfig {
    let mut config = TupleMrConfig::new();
    config
        .add_schema(schema("a", "k:int,x:string,y:long"))
        .expect("add a");
    config
        .add_schema(schema("b", "k:int,x:string,z:double"))
        .expect("add b");
    config.set_group_by(&["k"]);
    config
}

#[test]
fn test_rejects_source_level_errors() {
    assert!(matches!(compose_err(&TupleMrConfig::new()), TupleError::NoSources));

    let mut config = base_config();
    config.schemas.push(schema("a", "k:int"));
    assert!(matches!(compose_err(&config), TupleError::DuplicateSchema { .. }));

    let mut config = base_config();
    config.set_specific_order_by("c", criteria("y asc"));
    assert!(matches!(compose_err(&config), TupleError::UnknownSchema { ref schema } if schema == "c"));
}

#[test]
fn test_rejects_group_by_errors() {
    let mut config = base_config();
    config.set_group_by::<&str>(&[]);
    assert!(matches!(compose_err(&config), TupleError::Config { .. }));

    config.set_group_by(&["k", "k"]);
    assert!(matches!(compose_err(&config), TupleError::Config { .. }));

    config.set_group_by(&["y"]);
    assert!(matches!(
        compose_err(&config),
        TupleError::MissingField { ref schema, ref field } if schema == "b" && field == "y"
    ));

    let mut config = base_config();
    config.schemas[1] = schema("b", "k:long,x:string");
    assert!(matches!(compose_err(&config), TupleError::InconsistentFieldType { ref field, .. } if field == "k"));
}

#[test]
fn test_rejects_order_errors() {
    let mut config = base_config();
    config.set_group_by(&["k"]).set_order_by(criteria("x asc, k asc"));
    assert!(matches!(compose_err(&config), TupleError::GroupByNotPrefix { .. }));

    config.set_order_by(criteria("#source asc, k asc"));
    assert!(matches!(compose_err(&config), TupleError::GroupByNotPrefix { .. }));

    config.set_order_by(criteria("k asc, y asc"));
    assert!(matches!(compose_err(&config), TupleError::MissingField { ref field, .. } if field == "y"));

    config.set_order_by(criteria("k asc, #source asc, y asc"));
    assert!(matches!(compose_err(&config), TupleError::MissingField { ref field, .. } if field == "y"));

    assert!(matches!(
        Criteria::parse("k asc, k desc"),
        Err(TupleError::RepeatedCriteriaField { .. })
    ));
}

#[test]
fn test_rejects_specific_order_errors() {
    let mut config = base_config();
    config.set_specific_order_by("a", criteria("z asc"));
    assert!(matches!(compose_err(&config), TupleError::MissingField { ref field, .. } if field == "z"));

    config.set_specific_order_by("a", criteria("k desc"));
    assert!(matches!(
        compose_err(&config),
        TupleError::SpecificOrderOnCommonField { ref schema, ref field } if schema == "a" && field == "k"
    ));

    config.set_specific_order_by("a", criteria("#source desc"));
    assert!(matches!(compose_err(&config), TupleError::Config { .. }));

    let mut config = base_config();
    config
        .set_order_by(criteria("k asc, #source asc, x desc"))
        .set_specific_order_by("b", criteria("x asc"));
    assert!(matches!(compose_err(&config), TupleError::RepeatedCriteriaField { ref field } if field == "x"));
}

#[test]
fn test_rejects_rollup_and_partition_errors() {
    let mut config = base_config();
    config.set_rollup_from("k");
    assert!(matches!(compose_err(&config), TupleError::RollupWithoutOrder));

    config.set_order_by(criteria("k asc, x asc")).set_rollup_from("x");
    assert!(matches!(compose_err(&config), TupleError::RollupFieldNotGrouped { ref field } if field == "x"));

    config.set_rollup_from("k").set_partition_fields(&["k"]);
    assert!(matches!(compose_err(&config), TupleError::PartitionWithRollup));

    let mut config = base_config();
    config.set_partition_fields(&["y"]);
    assert!(matches!(compose_err(&config), TupleError::MissingField { ref field, .. } if field == "y"));

    config.set_partition_fields::<&str>(&[]);
    assert!(matches!(compose_err(&config), TupleError::Config { .. }));
}

#[test]
fn test_rejects_alias_errors() {
    let mut config = base_config();
    config.set_field_aliases("a", &[("w", "missing")]);
    assert!(matches!(compose_err(&config), TupleError::InvalidAlias { ref alias, .. } if alias == "w"));

    config.set_field_aliases("a", &[("x", "y")]);
    assert!(matches!(compose_err(&config), TupleError::InvalidAlias { ref alias, .. } if alias == "x"));

    config.set_field_aliases("a", &[("#w", "y")]);
    assert!(matches!(compose_err(&config), TupleError::InvalidAlias { .. }));

    config.set_field_aliases("a", &[("w", "y"), ("v", "y")]);
    assert!(matches!(compose_err(&config), TupleError::InvalidAlias { .. }));

    config.set_field_aliases("nope", &[("w", "y")]);
    assert!(matches!(compose_err(&config), TupleError::UnknownSchema { .. }));
}

#[test]
fn test_rejects_unregistered_names() {
    let mut config = base_config();
    config.set_order_by(Criteria::new(vec![SortElement::asc("k").using("reverse")]).expect("criteria"));
    assert!(matches!(
        compose_err(&config),
        TupleError::UnregisteredName { kind: "comparator", ref name } if name == "reverse"
    ));

    let mut config = TupleMrConfig::new();
    config
        .add_schema(schema("a", "k:int,o:object(Point)"))
        .expect("add a");
    config.set_group_by(&["k"]);
    assert!(matches!(
        compose_err(&config),
        TupleError::UnregisteredName { ref name, .. } if name == "Point"
    ));
}
