//! In-memory storage engine.
//!
//! Collections hold documents in a `BTreeMap` keyed by `_id`, so scans come
//! back in id order without an explicit sort. The aggregation pipeline is
//! evaluated stage by stage over a snapshot; cursors never observe writes
//! that happen after `aggregate` returns.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use strata_core::tid::TemporalId;
use strata_core::value::{Doc, Value};

use super::{Collection, DataStore, DocCursor, Stage, StorageError};

/// In-memory database: a named-collection map behind one lock.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<BTreeMap<String, Arc<MemoryCollection>>>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl DataStore for MemoryStore {
    fn collection(&self, name: &str) -> Arc<dyn Collection> {
        let mut collections = self.collections.write().expect("store lock");
        collections
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(MemoryCollection {
                    name: name.to_string(),
                    docs: RwLock::new(BTreeMap::new()),
                    indexes: RwLock::new(Vec::new()),
                })
            })
            .clone()
    }

    fn collection_names(&self) -> Vec<String> {
        self.collections
            .read()
            .expect("store lock")
            .keys()
            .cloned()
            .collect()
    }

    fn drop_db(&self) -> Result<(), StorageError> {
        self.collections.write().expect("store lock").clear();
        Ok(())
    }
}

/// Declared index shape; the engine records but does not use them.
#[derive(Clone, Debug, PartialEq, Eq)]
struct IndexSpec {
    name: String,
    elements: Vec<(String, i32)>,
}

pub struct MemoryCollection {
    name: String,
    docs: RwLock<BTreeMap<TemporalId, Doc>>,
    indexes: RwLock<Vec<IndexSpec>>,
}

impl Collection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert(&self, doc: Doc) -> Result<(), StorageError> {
        let id = doc
            .get("_id")
            .and_then(Value::as_tid)
            .ok_or(StorageError::MissingId)?;
        self.docs.write().expect("collection lock").insert(id, doc);
        Ok(())
    }

    fn aggregate(&self, pipeline: &[Stage]) -> Result<DocCursor, StorageError> {
        let mut docs: Vec<Doc> = self
            .docs
            .read()
            .expect("collection lock")
            .values()
            .cloned()
            .collect();
        for stage in pipeline {
            docs = apply_stage(docs, stage);
        }
        Ok(Box::new(docs.into_iter().map(Ok)))
    }

    fn ensure_index(&self, elements: &[(String, i32)], name: &str) -> Result<(), StorageError> {
        let spec = IndexSpec {
            name: name.to_string(),
            elements: elements.to_vec(),
        };
        let mut indexes = self.indexes.write().expect("collection lock");
        if !indexes.contains(&spec) {
            indexes.push(spec);
        }
        Ok(())
    }

    fn index_names(&self) -> Vec<String> {
        self.indexes
            .read()
            .expect("collection lock")
            .iter()
            .map(|spec| spec.name.clone())
            .collect()
    }

    fn count(&self) -> Result<usize, StorageError> {
        Ok(self.docs.read().expect("collection lock").len())
    }
}

fn apply_stage(docs: Vec<Doc>, stage: &Stage) -> Vec<Doc> {
    match stage {
        Stage::Match(cond) => docs.into_iter().filter(|doc| matches(doc, cond)).collect(),
        Stage::Sort(keys) => {
            let mut docs = docs;
            docs.sort_by(|a, b| compare_by_keys(a, b, keys));
            docs
        }
        Stage::GroupFirst { by } => {
            let mut seen: Vec<Value> = Vec::new();
            let mut kept = Vec::new();
            for doc in docs {
                let group = doc.get_or_null(by).clone();
                let already = seen
                    .iter()
                    .any(|v| v.canonical_cmp(&group) == Ordering::Equal);
                if !already {
                    seen.push(group);
                    kept.push(doc);
                }
            }
            kept
        }
        Stage::Project(fields) => docs
            .into_iter()
            .map(|doc| {
                fields
                    .iter()
                    .filter_map(|field| {
                        doc.get(field).map(|value| (field.clone(), value.clone()))
                    })
                    .collect()
            })
            .collect(),
        Stage::Limit(n) => {
            let mut docs = docs;
            docs.truncate(*n);
            docs
        }
    }
}

fn compare_by_keys(a: &Doc, b: &Doc, keys: &[(String, i32)]) -> Ordering {
    for (field, direction) in keys {
        let ord = a.get_or_null(field).canonical_cmp(b.get_or_null(field));
        let ord = if *direction < 0 { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Evaluate an encoded filter document. Top-level fields combine with AND.
fn matches(doc: &Doc, cond: &Doc) -> bool {
    cond.iter().all(|(key, value)| match (key.as_str(), value) {
        ("$and", Value::Array(conds)) => conds.iter().all(|c| match c {
            Value::Doc(inner) => matches(doc, inner),
            _ => false,
        }),
        ("$or", Value::Array(conds)) => conds.iter().any(|c| match c {
            Value::Doc(inner) => matches(doc, inner),
            _ => false,
        }),
        (field, Value::Doc(ops)) if ops.iter().any(|(op, _)| op.starts_with('$')) => {
            ops.iter()
                .all(|(op, operand)| eval_op(doc.get_or_null(field), op, operand))
        }
        (field, expected) => equals(doc.get_or_null(field), expected),
    })
}

fn eval_op(actual: &Value, op: &str, operand: &Value) -> bool {
    match op {
        "$eq" => equals(actual, operand),
        "$ne" => !equals(actual, operand),
        "$lt" => compares(actual, operand, |ord| ord == Ordering::Less),
        "$lte" => compares(actual, operand, |ord| ord != Ordering::Greater),
        "$gt" => compares(actual, operand, |ord| ord == Ordering::Greater),
        "$gte" => compares(actual, operand, |ord| ord != Ordering::Less),
        "$in" => match operand {
            Value::Array(members) => members.iter().any(|member| equals(actual, member)),
            _ => false,
        },
        "$nin" => match operand {
            Value::Array(members) => !members.iter().any(|member| equals(actual, member)),
            _ => false,
        },
        _ => false,
    }
}

/// Equality with array-membership semantics: an array field matches when any
/// element equals the operand, which is what makes the `_t` chain queryable.
fn equals(actual: &Value, expected: &Value) -> bool {
    if actual.canonical_cmp(expected) == Ordering::Equal {
        return true;
    }
    match actual {
        Value::Array(items) => items
            .iter()
            .any(|item| item.canonical_cmp(expected) == Ordering::Equal),
        _ => false,
    }
}

fn compares(actual: &Value, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    match actual {
        // Null fields never satisfy range operators.
        Value::Null => false,
        Value::Array(items) => items
            .iter()
            .any(|item| !matches!(item, Value::Null) && accept(item.canonical_cmp(operand))),
        scalar => accept(scalar.canonical_cmp(operand)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(n: u8) -> TemporalId {
        let mut bytes = [0u8; 16];
        bytes[3] = n;
        TemporalId::from_bytes(bytes)
    }

    fn doc(id: u8, key: &str, dataset: u8, version: i32) -> Doc {
        let mut doc = Doc::new();
        doc.push("_id", Value::Tid(tid(id)));
        doc.push("_dataset", Value::Tid(tid(dataset)));
        doc.push("_key", Value::String(key.to_string()));
        doc.push("version", Value::Int(version));
        doc
    }

    fn collection_with(docs: Vec<Doc>) -> Arc<dyn Collection> {
        let store = MemoryStore::new();
        let collection = store.collection("Sample");
        for d in docs {
            collection.insert(d).unwrap();
        }
        collection
    }

    fn run(collection: &Arc<dyn Collection>, pipeline: &[Stage]) -> Vec<Doc> {
        collection
            .aggregate(pipeline)
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn insert_requires_id_and_scans_in_id_order() {
        let collection = collection_with(vec![
            doc(3, "c", 0, 0),
            doc(1, "a", 0, 0),
            doc(2, "b", 0, 0),
        ]);
        assert!(collection.insert(Doc::new()).is_err());
        let docs = run(&collection, &[]);
        let ids: Vec<_> = docs
            .iter()
            .map(|d| d.get("_id").unwrap().as_tid().unwrap())
            .collect();
        assert_eq!(ids, vec![tid(1), tid(2), tid(3)]);
    }

    #[test]
    fn match_supports_operators_and_boolean_nodes() {
        let collection = collection_with(vec![
            doc(1, "a", 0, 1),
            doc(2, "b", 0, 2),
            doc(3, "c", 0, 3),
        ]);

        let mut ops = Doc::new();
        ops.push("$gte", Value::Int(2));
        let mut cond = Doc::new();
        cond.push("version", Value::Doc(ops));
        assert_eq!(run(&collection, &[Stage::Match(cond)]).len(), 2);

        let mut eq_a = Doc::new();
        let mut op = Doc::new();
        op.push("$eq", Value::String("a".into()));
        eq_a.push("_key", Value::Doc(op));
        let mut eq_c = Doc::new();
        let mut op = Doc::new();
        op.push("$eq", Value::String("c".into()));
        eq_c.push("_key", Value::Doc(op));
        let mut or = Doc::new();
        or.push(
            "$or",
            Value::Array(vec![Value::Doc(eq_a), Value::Doc(eq_c)]),
        );
        assert_eq!(run(&collection, &[Stage::Match(or)]).len(), 2);
    }

    #[test]
    fn in_operator_matches_array_fields_by_element() {
        let mut with_chain = doc(1, "a", 0, 1);
        with_chain.push(
            "_t",
            Value::Array(vec![
                Value::String("Base".into()),
                Value::String("Derived".into()),
            ]),
        );
        let collection = collection_with(vec![with_chain]);

        let mut in_op = Doc::new();
        in_op.push("$in", Value::Array(vec![Value::String("Derived".into())]));
        let mut cond = Doc::new();
        cond.push("_t", Value::Doc(in_op));
        assert_eq!(run(&collection, &[Stage::Match(cond)]).len(), 1);
    }

    #[test]
    fn sort_group_keeps_first_per_key() {
        let collection = collection_with(vec![
            doc(1, "a", 0, 0),
            doc(2, "a", 0, 1),
            doc(3, "b", 0, 0),
        ]);
        let pipeline = vec![
            Stage::Sort(vec![
                ("_key".to_string(), 1),
                ("_dataset".to_string(), -1),
                ("_id".to_string(), -1),
            ]),
            Stage::GroupFirst {
                by: "_key".to_string(),
            },
        ];
        let docs = run(&collection, &pipeline);
        assert_eq!(docs.len(), 2);
        // Winner for "a" is the latest id.
        assert_eq!(docs[0].get("version"), Some(&Value::Int(1)));
    }

    #[test]
    fn project_keeps_listed_fields_in_order() {
        let collection = collection_with(vec![doc(1, "a", 0, 9)]);
        let docs = run(
            &collection,
            &[Stage::Project(vec![
                "version".to_string(),
                "_key".to_string(),
            ])],
        );
        let fields: Vec<&str> = docs[0].iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(fields, vec!["version", "_key"]);
    }

    #[test]
    fn null_never_satisfies_range_operators() {
        let collection = collection_with(vec![doc(1, "a", 0, 1)]);
        let mut lt = Doc::new();
        lt.push("$lt", Value::Int(100));
        let mut cond = Doc::new();
        cond.push("missing_field", Value::Doc(lt));
        assert_eq!(run(&collection, &[Stage::Match(cond)]).len(), 0);
    }

    #[test]
    fn drop_db_clears_collections() {
        let store = MemoryStore::new();
        store.collection("A").insert(doc(1, "a", 0, 0)).unwrap();
        assert_eq!(store.collection_names(), vec!["A".to_string()]);
        store.drop_db().unwrap();
        assert!(store.collection_names().is_empty());
    }
}
