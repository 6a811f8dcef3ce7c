//! 分配配置的序列化与分配测试。
#![cfg(not(all(feature = "loom-model", any(loom, spark_loom))))]

use spark_bytebuf::{
    BufferConfig, BufferError, ByteBuf, ByteOrder, DEFAULT_MAX_CAPACITY, StorageKind,
    config::DEFAULT_INITIAL_CAPACITY,
};

#[test]
fn empty_document_uses_defaults() {
    let config: BufferConfig = serde_json::from_str("{}").expect("空对象可解析");
    assert_eq!(config, BufferConfig::default());
    assert_eq!(config.storage, StorageKind::Direct);
    assert_eq!(config.order, ByteOrder::BigEndian);
    assert_eq!(config.initial_capacity, DEFAULT_INITIAL_CAPACITY);
    assert_eq!(config.max_capacity, DEFAULT_MAX_CAPACITY);
}

#[test]
fn explicit_fields_select_kind_and_order() {
    let config: BufferConfig = serde_json::from_str(
        r#"{"storage":"heap","order":"little_endian","initial_capacity":8,"max_capacity":16}"#,
    )
    .expect("字段合法");
    let buf = config.allocate().expect("分配");
    assert!(!buf.is_direct());
    assert_eq!(buf.order(), ByteOrder::LittleEndian);
    assert_eq!((buf.capacity(), buf.max_capacity()), (8, 16));
}

#[test]
fn serialization_round_trips() {
    let config = BufferConfig::heap()
        .with_order(ByteOrder::LittleEndian)
        .with_capacity(32, 64);
    let json = serde_json::to_string(&config).expect("序列化");
    assert!(json.contains(r#""storage":"heap""#), "{json}");
    let parsed: BufferConfig = serde_json::from_str(&json).expect("反序列化");
    assert_eq!(parsed, config);
}

#[test]
fn inconsistent_capacities_fail_validation() {
    let config = BufferConfig::direct().with_capacity(64, 32);
    assert!(matches!(
        config.validate(),
        Err(BufferError::InvalidArgument { .. })
    ));
    assert!(config.allocate().is_err());
}

#[test]
fn unknown_storage_is_rejected() {
    let parsed = serde_json::from_str::<BufferConfig>(r#"{"storage":"pooled"}"#);
    assert!(parsed.is_err());
}
