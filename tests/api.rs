use atomic_mapping::{AtomicMapping, Error, Mapping, Value};
use serde_json::json;
use tempfile::tempdir;

fn mapping(value: Value) -> Mapping {
    match value {
        Value::Object(map) => map,
        other => panic!("not an object: {other}"),
    }
}

// ---- read -------------------------------------------------------------------

#[test]
fn read_missing_file_is_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("missing.json");
    let store = AtomicMapping::<Mapping>::new(&path).unwrap();
    assert!(store.read().is_empty());
    assert!(!path.exists(), "read must not create the file");
}

#[test]
fn new_does_not_touch_disk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("later.json");
    let store = AtomicMapping::<Mapping>::new(&path).unwrap();
    assert!(!path.parent().unwrap().exists());
    assert!(store.read().is_empty());
}

#[test]
fn try_read_missing_file_is_default() {
    let dir = tempdir().unwrap();
    let store = AtomicMapping::<Mapping>::new(dir.path().join("m.json")).unwrap();
    assert!(store.try_read().unwrap().is_empty());
}

#[test]
fn path_is_made_absolute_lexically() {
    let dir = tempdir().unwrap();
    let aliased = dir.path().join("x").join("..").join("m.json");
    let store = AtomicMapping::<Mapping>::new(&aliased).unwrap();
    // parent components are kept; no symlink or `..` resolution happens
    assert_eq!(store.path(), aliased.as_path());
    assert!(store
        .path()
        .components()
        .any(|c| c == std::path::Component::ParentDir));
}

#[test]
fn path_accessor_is_absolute() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("m.json");
    let store = AtomicMapping::<Mapping>::new(&path).unwrap();
    assert_eq!(store.path(), path.as_path());

    let relative = AtomicMapping::<Mapping>::new("relative/m.json").unwrap();
    assert!(relative.path().is_absolute());
    assert!(relative.path().ends_with("relative/m.json"));
}

// ---- update -----------------------------------------------------------------

#[test]
fn hash_cache_scenario() {
    let dir = tempdir().unwrap();
    let store = AtomicMapping::<Mapping>::new(dir.path().join("hashes.json")).unwrap();
    assert_eq!(store.read(), Mapping::new());

    let first = mapping(json!({"hash": "abc123"}));
    store.update(&first).commit().wait().unwrap();
    assert_eq!(store.read(), first);

    let second = mapping(json!({"hash": "def456", "size": 42}));
    store.update(&second).commit().wait().unwrap();
    assert_eq!(store.read(), second);
}

#[test]
fn round_trip_nested_values() {
    let dir = tempdir().unwrap();
    let store = AtomicMapping::<Mapping>::new(dir.path().join("nested.json")).unwrap();
    let doc = mapping(json!({
        "files": {"a.js": {"hash": "f00", "deps": ["b.js", "c.js"]}},
        "built": true,
        "ratio": 0.5,
        "missing": null,
        "count": -3
    }));
    store.write(&doc).unwrap();
    assert_eq!(store.read(), doc);
    assert_eq!(store.try_read().unwrap(), doc);
}

#[test]
fn replacement_is_whole_document() {
    let dir = tempdir().unwrap();
    let store = AtomicMapping::<Mapping>::new(dir.path().join("m.json")).unwrap();
    store.write(&mapping(json!({"a": 1, "b": 2}))).unwrap();
    store.write(&mapping(json!({"c": 3}))).unwrap();
    assert_eq!(store.read(), mapping(json!({"c": 3})));
}

#[test]
fn update_snapshots_the_callers_value() {
    let dir = tempdir().unwrap();
    let store = AtomicMapping::<Mapping>::new(dir.path().join("m.json")).unwrap();
    let mut doc = mapping(json!({"hash": "abc"}));
    let staged = store.update(&doc);
    doc.insert("late".into(), json!(true));
    staged.commit().wait().unwrap();

    assert_eq!(store.read(), mapping(json!({"hash": "abc"})));
    assert_eq!(doc.len(), 2);
}

#[test]
fn staged_update_writes_nothing_until_commit() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("m.json");
    let store = AtomicMapping::<Mapping>::new(&path).unwrap();
    let staged = store.update(&mapping(json!({"a": 1})));
    assert!(!path.exists());
    drop(staged);
    assert!(!path.exists());
}

#[test]
fn update_with_sees_current_document() {
    let dir = tempdir().unwrap();
    let store = AtomicMapping::<Mapping>::new(dir.path().join("m.json")).unwrap();
    store.write(&mapping(json!({"a": 1}))).unwrap();

    store
        .update_with(|mut doc| {
            doc.insert("b".into(), json!(2));
            doc
        })
        .commit()
        .wait()
        .unwrap();
    assert_eq!(store.read(), mapping(json!({"a": 1, "b": 2})));
}

#[test]
fn any_json_root_round_trips() {
    let dir = tempdir().unwrap();
    let store = AtomicMapping::<Value>::new(dir.path().join("list.json")).unwrap();
    assert_eq!(store.read(), Value::Null);

    let doc = json!([1, "two", {"three": 3}]);
    store.write(&doc).unwrap();
    assert_eq!(store.read(), doc);
}

#[test]
fn typed_documents_round_trip() {
    use std::collections::BTreeMap;

    let dir = tempdir().unwrap();
    let store = AtomicMapping::<BTreeMap<String, u64>>::new(dir.path().join("sizes.json")).unwrap();
    let sizes = BTreeMap::from([("a.js".to_string(), 10), ("b.css".to_string(), 20)]);
    store.write(&sizes).unwrap();
    assert_eq!(store.read(), sizes);
}

#[test]
fn clones_share_the_file() {
    let dir = tempdir().unwrap();
    let store = AtomicMapping::<Mapping>::new(dir.path().join("m.json")).unwrap();
    let other = store.clone();
    other.write(&mapping(json!({"from": "clone"}))).unwrap();
    assert_eq!(store.read(), mapping(json!({"from": "clone"})));
}

// ---- builder ----------------------------------------------------------------

#[test]
fn default_output_is_pretty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("pretty.json");
    let store = AtomicMapping::<Mapping>::new(&path).unwrap();
    store.write(&mapping(json!({"hello": 1}))).unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert_eq!(raw, "{\n  \"hello\": 1\n}");
}

#[test]
fn builder_compact_json() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("compact.json");
    let store = AtomicMapping::<Mapping>::builder(&path)
        .pretty(false)
        .build()
        .unwrap();
    store.write(&mapping(json!({"hello": 1, "world": 2}))).unwrap();

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(!raw.contains('\n'));
    assert_eq!(store.read(), mapping(json!({"hello": 1, "world": 2})));
}

#[test]
fn builder_create_parent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("a").join("b").join("m.json");
    let store = AtomicMapping::<Mapping>::builder(&path)
        .create_parent(true)
        .sync_dir(false)
        .build()
        .unwrap();
    store.write(&mapping(json!({"deep": true}))).unwrap();
    assert_eq!(store.read(), mapping(json!({"deep": true})));
}

#[test]
fn missing_parent_fails_without_create_parent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("absent").join("m.json");
    let store = AtomicMapping::<Mapping>::new(&path).unwrap();
    let err = store.write(&mapping(json!({"x": 1}))).unwrap_err();
    assert_eq!(err.io_kind(), Some(std::io::ErrorKind::NotFound));
    assert!(!path.exists());
}

#[test]
fn builder_rejects_path_without_file_name() {
    let err = AtomicMapping::<Mapping>::new("/").unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    let err = AtomicMapping::<Mapping>::new("cache/..").unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

// ---- debug ------------------------------------------------------------------

#[test]
fn debug_impls_dont_panic() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("debug.json");
    let store = AtomicMapping::<Mapping>::new(&path).unwrap();

    let dbg_store = format!("{store:?}");
    assert!(dbg_store.contains("AtomicMapping"));
    assert!(dbg_store.contains("path"));

    let staged = store.update(&Mapping::new());
    assert!(format!("{staged:?}").contains("Update"));

    let pending = staged.commit();
    assert!(format!("{pending:?}").contains("Pending"));
    assert_eq!(pending.path(), path.as_path());
    pending.wait().unwrap();

    let builder = AtomicMapping::<Mapping>::builder(&path);
    assert!(format!("{builder:?}").contains("AtomicMappingBuilder"));
}
