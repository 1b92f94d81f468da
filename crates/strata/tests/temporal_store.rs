//! End-to-end scenarios over the in-memory engine.

use std::sync::Arc;

use strata::core::dataset::DataSetDetailData;
use strata::core::meta::Registry;
use strata::core::record::{downcast, DataObject as _};
use strata::core::tid::TemporalId;
use strata::samples::{
    self, BaseSampleData, DerivedSampleData, OtherDerivedSampleData, BASE_SAMPLE_TYPE,
    DERIVED_SAMPLE_TYPE,
};
use strata::{Context, DataSource, DbName, Error, FilterToken, MemoryStore, SourceError};

fn new_source() -> Arc<DataSource> {
    let registry = Arc::new(Registry::new());
    samples::declare(&registry);
    let db = DbName::parse("TEST;Strata;IntegrationTests").expect("valid db name");
    Arc::new(DataSource::new(MemoryStore::new(), db, registry))
}

fn save_base(
    source: &Arc<DataSource>,
    data_set: TemporalId,
    record_id: &str,
    version: i32,
) -> BaseSampleData {
    let mut record = BaseSampleData::new(record_id, 0);
    record.version = Some(version);
    source.save(&mut record, data_set).expect("save");
    record
}

#[test]
fn save_then_load_by_id() {
    let source = new_source();
    let mut record = BaseSampleData::new("Key1", 0);
    let id = source.save(&mut record, TemporalId::EMPTY).expect("save");

    assert!(!id.is_empty());
    assert_eq!(record.id, id);
    assert_eq!(record.data_set, TemporalId::EMPTY);

    let loaded = source
        .load_or_null_as::<BaseSampleData>(id)
        .expect("load")
        .expect("present");
    assert_eq!(loaded.record_id.as_deref(), Some("Key1"));
    assert_eq!(loaded.id, id);
    assert_eq!(loaded.data_set, TemporalId::EMPTY);

    let missing = source
        .load_or_null_as::<BaseSampleData>(TemporalId::from_bytes([0xFF; 16]))
        .expect("load");
    assert!(missing.is_none());
}

#[test]
fn saved_ids_are_strictly_monotonic() {
    let source = new_source();
    let mut prev = TemporalId::EMPTY;
    for n in 0..200 {
        let record = save_base(&source, TemporalId::EMPTY, &format!("Key{n}"), 0);
        assert!(record.id > prev, "id {} must exceed {}", record.id, prev);
        prev = record.id;
    }
}

#[test]
fn versions_in_one_dataset_resolve_to_the_latest() {
    let source = new_source();
    save_base(&source, TemporalId::EMPTY, "Key1", 0);
    save_base(&source, TemporalId::EMPTY, "Key1", 1);

    let reloaded = source
        .reload_or_null_as::<BaseSampleData>("Key1;0", TemporalId::EMPTY)
        .expect("reload")
        .expect("visible");
    assert_eq!(reloaded.version, Some(1));

    // The query stream carries the winner exactly once.
    let results: Vec<_> = source
        .get_query(TemporalId::EMPTY, BASE_SAMPLE_TYPE)
        .filter(FilterToken::eq("record_id", "Key1".to_string()))
        .cursor()
        .expect("cursor")
        .collect::<strata::Result<_>>()
        .expect("results");
    assert_eq!(results.len(), 1);
    let winner = downcast::<BaseSampleData>(results.into_iter().next().unwrap()).unwrap();
    assert_eq!(winner.version, Some(1));
}

#[test]
fn imported_dataset_overrides_resolve_per_dataset() {
    let source = new_source();
    let common = source.create_common().expect("create Common");
    let ds1 = source
        .create_data_set("DS1", &[common], common)
        .expect("create DS1");

    save_base(&source, common, "A", 0);
    save_base(&source, ds1, "A", 1);

    let in_ds1 = source
        .reload_or_null_as::<BaseSampleData>("A;0", ds1)
        .expect("reload")
        .expect("visible");
    assert_eq!(in_ds1.version, Some(1));
    assert_eq!(in_ds1.data_set, ds1);

    let in_common = source
        .reload_or_null_as::<BaseSampleData>("A;0", common)
        .expect("reload")
        .expect("visible");
    assert_eq!(in_common.version, Some(0));
    assert_eq!(in_common.data_set, common);
}

#[test]
fn records_are_visible_through_transitive_imports() {
    let source = new_source();
    let common = source.create_common().expect("Common");
    let mid = source.create_data_set("Mid", &[common], common).expect("Mid");
    let leaf = source.create_data_set("Leaf", &[mid], common).expect("Leaf");

    save_base(&source, common, "G", 7);
    // Root records are visible everywhere; the diamond collapses.
    let seen = source
        .reload_or_null_as::<BaseSampleData>("G;0", leaf)
        .expect("reload")
        .expect("visible");
    assert_eq!(seen.version, Some(7));
}

#[test]
fn tombstone_hides_the_key_without_touching_parents() {
    let source = new_source();
    let common = source.create_common().expect("Common");
    let ds1 = source
        .create_data_set("DS1", &[common], common)
        .expect("DS1");
    save_base(&source, common, "A", 0);
    save_base(&source, ds1, "A", 1);

    source
        .delete_record(BASE_SAMPLE_TYPE, "A;0", ds1)
        .expect("delete");

    let in_ds1 = source
        .reload_or_null_as::<BaseSampleData>("A;0", ds1)
        .expect("reload");
    assert!(in_ds1.is_none(), "tombstone hides the key in DS1");

    let in_common = source
        .reload_or_null_as::<BaseSampleData>("A;0", common)
        .expect("reload")
        .expect("visible");
    assert_eq!(in_common.version, Some(0), "parent reads are unaffected");

    // Tombstones never surface through queries either.
    let results: Vec<_> = source
        .get_query(ds1, BASE_SAMPLE_TYPE)
        .cursor()
        .expect("cursor")
        .collect::<strata::Result<_>>()
        .expect("results");
    assert!(results.is_empty());
}

#[test]
fn cutoff_time_hides_later_records() {
    let source = new_source();
    let common = source.create_common().expect("Common");
    let ds1 = source
        .create_data_set("DS1", &[common], common)
        .expect("DS1");

    save_base(&source, common, "A", 0);
    let cutoff = source.generate_ordered_id();
    save_base(&source, ds1, "A", 1);

    // Without the cutoff the override wins.
    let visible = source
        .reload_or_null_as::<BaseSampleData>("A;0", ds1)
        .expect("reload")
        .expect("visible");
    assert_eq!(visible.version, Some(1));

    let mut detail = DataSetDetailData::new(ds1);
    detail.cutoff_time = Some(cutoff);
    source.save(&mut detail, common).expect("save detail");

    let visible = source
        .reload_or_null_as::<BaseSampleData>("A;0", ds1)
        .expect("reload")
        .expect("visible");
    assert_eq!(visible.version, Some(0), "records at or past the cutoff vanish");
}

#[test]
fn imports_cutoff_spares_the_dataset_itself() {
    let source = new_source();
    let common = source.create_common().expect("Common");
    let ds1 = source
        .create_data_set("DS1", &[common], common)
        .expect("DS1");

    let cutoff = source.generate_ordered_id();
    save_base(&source, common, "A", 0);
    save_base(&source, ds1, "B", 1);

    let mut detail = DataSetDetailData::new(ds1);
    detail.imports_cutoff_time = Some(cutoff);
    source.save(&mut detail, common).expect("save detail");

    // The import (Common) is truncated at the cutoff.
    assert!(source
        .reload_or_null_as::<BaseSampleData>("A;0", ds1)
        .expect("reload")
        .is_none());
    // The dataset's own records are spared.
    assert_eq!(
        source
            .reload_or_null_as::<BaseSampleData>("B;0", ds1)
            .expect("reload")
            .expect("visible")
            .version,
        Some(1)
    );
}

#[test]
fn global_cutoff_combines_with_details_by_taking_the_earlier() {
    let registry = Arc::new(Registry::new());
    samples::declare(&registry);
    let db = DbName::parse("TEST;Strata;IntegrationTests").expect("valid db name");
    let store = MemoryStore::new();

    let staging = Arc::new(DataSource::new(store.clone(), db.clone(), registry.clone()));
    save_base(&staging, TemporalId::EMPTY, "A", 0);
    let global = staging.generate_ordered_id();
    save_base(&staging, TemporalId::EMPTY, "A", 1);

    let pinned = Arc::new(
        DataSource::new(store, db, registry).with_cutoff(Some(global)),
    );
    let visible = pinned
        .reload_or_null_as::<BaseSampleData>("A;0", TemporalId::EMPTY)
        .expect("reload")
        .expect("visible");
    assert_eq!(visible.version, Some(0));
}

#[test]
fn query_by_derived_type_filters_the_hierarchy() {
    let source = new_source();
    let mut base = BaseSampleData::new("A", 0);
    source.save(&mut base, TemporalId::EMPTY).expect("save");
    let mut derived = DerivedSampleData::new("B", 1);
    source.save(&mut derived, TemporalId::EMPTY).expect("save");
    let mut other = OtherDerivedSampleData::new("C", 2);
    source.save(&mut other, TemporalId::EMPTY).expect("save");

    let only_derived: Vec<_> = source
        .get_query(TemporalId::EMPTY, DERIVED_SAMPLE_TYPE)
        .cursor()
        .expect("cursor")
        .collect::<strata::Result<_>>()
        .expect("results");
    assert_eq!(only_derived.len(), 1);

    let whole_hierarchy: Vec<_> = source
        .get_query(TemporalId::EMPTY, BASE_SAMPLE_TYPE)
        .cursor()
        .expect("cursor")
        .collect::<strata::Result<_>>()
        .expect("results");
    assert_eq!(whole_hierarchy.len(), 3);

    // Default ordering is `_key` ascending.
    let keys: Vec<String> = whole_hierarchy
        .iter()
        .map(|object| {
            object
                .get_field("record_id")
                .unwrap()
                .into_opt::<String>("test", "record_id")
                .unwrap()
                .unwrap()
        })
        .collect();
    assert_eq!(keys, vec!["A", "B", "C"]);
}

#[test]
fn user_filters_and_orderings_compose_with_the_pipeline() {
    let source = new_source();
    for (key, version) in [("A", 5), ("B", 3), ("C", 8)] {
        save_base(&source, TemporalId::EMPTY, key, version);
    }

    let sorted: Vec<_> = source
        .get_query(TemporalId::EMPTY, BASE_SAMPLE_TYPE)
        .filter(FilterToken::gt("version", 2))
        .sort_by_desc("version")
        .cursor()
        .expect("cursor")
        .collect::<strata::Result<_>>()
        .expect("results");
    let versions: Vec<Option<i32>> = sorted
        .iter()
        .map(|object| {
            object
                .get_field("version")
                .unwrap()
                .into_opt::<i32>("test", "version")
                .unwrap()
        })
        .collect();
    assert_eq!(versions, vec![Some(8), Some(5), Some(3)]);

    let unknown = source
        .get_query(TemporalId::EMPTY, BASE_SAMPLE_TYPE)
        .filter(FilterToken::eq("no_such_field", 1))
        .cursor();
    assert!(matches!(
        unknown,
        Err(Error::Source(SourceError::UnknownFilterField { .. }))
    ));
}

#[test]
fn projection_returns_tuples_of_the_selected_fields() {
    let source = new_source();
    save_base(&source, TemporalId::EMPTY, "A", 4);
    save_base(&source, TemporalId::EMPTY, "B", 9);

    let rows: Vec<_> = source
        .get_query(TemporalId::EMPTY, BASE_SAMPLE_TYPE)
        .select(&["record_id", "version"])
        .expect("select")
        .collect::<strata::Result<_>>()
        .expect("rows");
    assert_eq!(rows.len(), 2);
    let first = &rows[0];
    assert_eq!(first.len(), 2);
    assert_eq!(
        first[0]
            .clone()
            .into_opt::<String>("tuple", "record_id")
            .unwrap()
            .as_deref(),
        Some("A")
    );
    assert_eq!(
        first[1].clone().into_opt::<i32>("tuple", "version").unwrap(),
        Some(4)
    );
}

#[test]
fn read_only_dataset_rejects_writes_without_side_effects() {
    let source = new_source();
    let common = source.create_common().expect("Common");
    let ds1 = source
        .create_data_set("DS1", &[common], common)
        .expect("DS1");

    let mut detail = DataSetDetailData::new(ds1);
    detail.read_only = Some(true);
    source.save(&mut detail, common).expect("save detail");

    let mut record = BaseSampleData::new("A", 0);
    let err = source.save(&mut record, ds1).expect_err("read-only save");
    assert!(matches!(err, Error::Source(SourceError::ReadOnly { .. })));

    let err = source
        .delete_record(BASE_SAMPLE_TYPE, "A;0", ds1)
        .expect_err("read-only delete");
    assert!(matches!(err, Error::Source(SourceError::ReadOnly { .. })));

    // No side effects are visible to a subsequent read.
    assert!(source
        .reload_or_null_as::<BaseSampleData>("A;0", ds1)
        .expect("reload")
        .is_none());
}

#[test]
fn read_only_source_rejects_every_mutation() {
    let registry = Arc::new(Registry::new());
    samples::declare(&registry);
    let db = DbName::parse("TEST;Strata;IntegrationTests").expect("valid db name");
    let source = DataSource::new(MemoryStore::new(), db, registry).with_read_only(true);

    let mut record = BaseSampleData::new("A", 0);
    let err = source
        .save(&mut record, TemporalId::EMPTY)
        .expect_err("read-only source");
    assert!(matches!(err, Error::Source(SourceError::SourceReadOnly)));
}

#[test]
fn data_set_resolution_strict_and_lenient() {
    let source = new_source();
    let common = source.create_common().expect("Common");
    assert_eq!(source.get_data_set("Common", common).expect("resolve"), common);
    assert_eq!(
        source
            .get_data_set_or_empty("Nowhere", common)
            .expect("lenient resolve"),
        TemporalId::EMPTY
    );
    assert!(matches!(
        source.get_data_set("Nowhere", common),
        Err(Error::Source(SourceError::MissingDataSet { .. }))
    ));
}

#[test]
fn empty_key_is_a_validation_error() {
    let source = new_source();
    let mut nameless = strata::core::dataset::DataSetData::default();
    let err = source
        .save(&mut nameless, TemporalId::EMPTY)
        .expect_err("empty key");
    assert!(matches!(err, Error::Source(SourceError::EmptyKey { .. })));
}

#[test]
fn delete_db_is_gated_by_environment() {
    let registry = Arc::new(Registry::new());
    samples::declare(&registry);
    let store = MemoryStore::new();

    let prod = DataSource::new(
        store.clone(),
        DbName::parse("PROD;Strata;Live").expect("valid"),
        registry.clone(),
    );
    assert!(matches!(
        prod.delete_db(),
        Err(Error::Source(SourceError::EnvForbidden { .. }))
    ));

    let test = DataSource::new(
        store,
        DbName::parse("TEST;Strata;Scratch").expect("valid"),
        registry,
    );
    test.delete_db().expect("test databases may be dropped");
}

#[test]
fn point_read_of_a_foreign_type_is_a_type_mismatch() {
    let source = new_source();
    let mut derived = DerivedSampleData::new("A", 0);
    let id = source.save(&mut derived, TemporalId::EMPTY).expect("save");

    // Same collection, sibling type: surfaced as a mismatch, not null.
    let err = source
        .load_or_null_as::<OtherDerivedSampleData>(id)
        .expect_err("sibling type is not a subtype");
    assert!(matches!(
        err,
        Error::Source(SourceError::TypeMismatch { .. })
    ));

    // The base type accepts any member of its hierarchy.
    assert!(source
        .load_or_null(BASE_SAMPLE_TYPE, id)
        .expect("load")
        .is_some());
}

#[test]
fn declared_indexes_are_created_on_the_collection() {
    use strata::{Collection, DataStore};

    let registry = Arc::new(Registry::new());
    samples::declare(&registry);
    let store = MemoryStore::new();
    let db = DbName::parse("TEST;Strata;IntegrationTests").expect("valid db name");
    let source = DataSource::new(store.clone(), db, registry);

    source
        .ensure_indexes(DERIVED_SAMPLE_TYPE)
        .expect("ensure indexes");

    let names = store.collection("BaseSample").index_names();
    assert!(names.contains(&"record_id, -record_index".to_string()));
    assert!(names.contains(&"recent_versions".to_string()));

    let declarations = source
        .registry()
        .index_declarations(DERIVED_SAMPLE_TYPE)
        .expect("declarations");
    assert_eq!(declarations.len(), 2);
}

#[test]
fn context_binds_the_current_dataset() {
    let source = new_source();
    let common = source.create_common().expect("Common");
    let ds1 = source
        .create_data_set("DS1", &[common], common)
        .expect("DS1");

    let common_context = Context::new(source.clone()).with_data_set(common);
    let ds1_context = common_context.with_data_set(ds1);

    let mut record = BaseSampleData::new("A", 0);
    record.version = Some(0);
    common_context.save(&mut record).expect("save");
    let mut record = BaseSampleData::new("A", 0);
    record.version = Some(1);
    ds1_context.save(&mut record).expect("save");

    assert_eq!(
        common_context
            .reload_or_null::<BaseSampleData>("A;0")
            .expect("reload")
            .expect("visible")
            .version,
        Some(0)
    );
    assert_eq!(
        ds1_context
            .reload_or_null::<BaseSampleData>("A;0")
            .expect("reload")
            .expect("visible")
            .version,
        Some(1)
    );
    assert_eq!(ds1_context.get_data_set("DS1").expect("resolve"), ds1);

    let typed: Vec<BaseSampleData> = ds1_context
        .query::<BaseSampleData>()
        .cursor()
        .expect("cursor")
        .collect::<strata::Result<_>>()
        .expect("results");
    assert_eq!(typed.len(), 1);
    assert_eq!(typed[0].version, Some(1));
}

#[test]
fn concurrent_saves_stay_strictly_ordered() {
    let source = new_source();
    let mut handles = Vec::new();
    for thread in 0..4 {
        let source = source.clone();
        handles.push(std::thread::spawn(move || {
            let mut ids = Vec::new();
            for n in 0..50 {
                let mut record = BaseSampleData::new(format!("T{thread}-{n}"), n);
                ids.push(source.save(&mut record, TemporalId::EMPTY).expect("save"));
            }
            ids
        }));
    }
    let mut all: Vec<TemporalId> = handles
        .into_iter()
        .flat_map(|handle| handle.join().expect("thread"))
        .collect();
    let total = all.len();
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len(), total, "every save produced a distinct id");
}
