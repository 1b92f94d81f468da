//! Temporal pipeline composition.
//!
//! Stage order is load-bearing: the pre-group sort makes the first document
//! per `_key` group the winner (largest dataset, then largest id among the
//! visible set), and the discriminator filter runs after grouping so a
//! tombstone winner removes its key from the result instead of unmasking an
//! older version.

use strata_core::dataset::DataSetLookup;
use strata_core::meta::Registry;
use strata_core::tid::TemporalId;
use strata_core::value::{Doc, Value};

use crate::error::Result;
use crate::storage::Stage;

/// Sort spec shared by the pre-group ordering and the post-sort stabilizer.
fn temporal_order() -> Vec<(String, i32)> {
    vec![
        ("_key".to_string(), 1),
        ("_dataset".to_string(), -1),
        ("_id".to_string(), -1),
    ]
}

/// Compose the full pipeline for one query.
pub(crate) fn build_stages(
    lookup: &DataSetLookup,
    registry: &Registry,
    type_name: &str,
    filters: &[Doc],
    user_sorts: &[(String, i32)],
    limit: Option<usize>,
    projection: Option<&[String]>,
) -> Result<Vec<Stage>> {
    let mut stages = Vec::new();

    // 1. Dataset constraint from the visible set and its cutoffs.
    stages.push(Stage::Match(data_set_constraint(lookup)));

    // 2. User filters, in registration order.
    for filter in filters {
        stages.push(Stage::Match(filter.clone()));
    }

    // 3. Pre-group ordering; the first document per key must be the winner.
    stages.push(Stage::Sort(temporal_order()));

    // 4. One record per logical key.
    stages.push(Stage::GroupFirst {
        by: "_key".to_string(),
    });

    // 5. Discriminator filter over the type and its registered descendants.
    stages.push(Stage::Match(discriminator_filter(registry, type_name)?));

    // 6-7. User ordering with the deterministic tie-break appended.
    let mut sort_keys: Vec<(String, i32)> = user_sorts.to_vec();
    for key in temporal_order() {
        if !sort_keys.iter().any(|(field, _)| *field == key.0) {
            sort_keys.push(key);
        }
    }
    stages.push(Stage::Sort(sort_keys));

    if let Some(fields) = projection {
        stages.push(Stage::Project(fields.to_vec()));
    }
    if let Some(limit) = limit {
        stages.push(Stage::Limit(limit));
    }
    Ok(stages)
}

/// `_dataset ∈ V(D)`, with cutoff datasets truncated at `_id < cutoff`.
fn data_set_constraint(lookup: &DataSetLookup) -> Doc {
    let cutoffs = lookup.cutoffs();
    let uncut: Vec<Value> = lookup
        .sets()
        .iter()
        .filter(|id| !cutoffs.contains_key(id))
        .map(|id| Value::Tid(*id))
        .collect();

    let mut branches: Vec<Value> = Vec::new();
    if !uncut.is_empty() {
        branches.push(Value::Doc(in_constraint(uncut)));
    }
    for (data_set, cutoff) in cutoffs {
        if !lookup.contains(*data_set) {
            continue;
        }
        branches.push(Value::Doc(cutoff_branch(*data_set, *cutoff)));
    }

    if branches.len() == 1 {
        match branches.remove(0) {
            Value::Doc(doc) => doc,
            _ => unreachable!("branches hold documents"),
        }
    } else {
        let mut doc = Doc::new();
        doc.push("$or", Value::Array(branches));
        doc
    }
}

fn in_constraint(members: Vec<Value>) -> Doc {
    let mut op = Doc::new();
    op.push("$in", Value::Array(members));
    let mut doc = Doc::new();
    doc.push("_dataset", Value::Doc(op));
    doc
}

fn cutoff_branch(data_set: TemporalId, cutoff: TemporalId) -> Doc {
    let mut eq = Doc::new();
    eq.push("$eq", Value::Tid(data_set));
    let mut dataset_cond = Doc::new();
    dataset_cond.push("_dataset", Value::Doc(eq));

    let mut lt = Doc::new();
    lt.push("$lt", Value::Tid(cutoff));
    let mut id_cond = Doc::new();
    id_cond.push("_id", Value::Doc(lt));

    let mut doc = Doc::new();
    doc.push(
        "$and",
        Value::Array(vec![Value::Doc(dataset_cond), Value::Doc(id_cond)]),
    );
    doc
}

/// `_t ∈ {mapped(type)} ∪ mapped(derived(type))`, collapsing to equality
/// when the hierarchy has a single member.
fn discriminator_filter(registry: &Registry, type_name: &str) -> Result<Doc> {
    let mut names = vec![registry.require(type_name)?.mapped_name.clone()];
    for derived in registry.derived_types(type_name) {
        if !names.contains(&derived.mapped_name) {
            names.push(derived.mapped_name.clone());
        }
    }

    let mut op = Doc::new();
    if names.len() == 1 {
        op.push("$eq", Value::String(names.pop().expect("one name")));
    } else {
        op.push(
            "$in",
            Value::Array(names.into_iter().map(Value::String).collect()),
        );
    }
    let mut doc = Doc::new();
    doc.push("_t", Value::Doc(op));
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::samples;

    fn tid(n: u8) -> TemporalId {
        let mut bytes = [0u8; 16];
        bytes[3] = n;
        TemporalId::from_bytes(bytes)
    }

    fn registry() -> Registry {
        let registry = Registry::new();
        strata_core::declare_core_types(&registry);
        samples::declare(&registry);
        registry
    }

    fn stages_for(lookup: &DataSetLookup, type_name: &str) -> Vec<Stage> {
        build_stages(lookup, &registry(), type_name, &[], &[], None, None).unwrap()
    }

    #[test]
    fn stage_order_is_fixed() {
        let lookup = DataSetLookup::new(tid(5));
        let stages = stages_for(&lookup, samples::BASE_SAMPLE_TYPE);
        assert!(matches!(stages[0], Stage::Match(_)), "dataset constraint");
        assert!(matches!(stages[1], Stage::Sort(_)), "pre-group sort");
        assert!(matches!(stages[2], Stage::GroupFirst { .. }));
        assert!(matches!(stages[3], Stage::Match(_)), "discriminator filter");
        assert!(matches!(stages[4], Stage::Sort(_)), "stabilized ordering");
        assert_eq!(stages.len(), 5);
    }

    #[test]
    fn dataset_constraint_without_cutoffs_is_a_plain_in() {
        let lookup = DataSetLookup::new(tid(5));
        let constraint = data_set_constraint(&lookup);
        let Some(Value::Doc(op)) = constraint.get("_dataset").cloned() else {
            panic!("expected an `_dataset` constraint, got {constraint:?}");
        };
        let Some(Value::Array(members)) = op.get("$in").cloned() else {
            panic!("expected `$in`, got {op:?}");
        };
        assert_eq!(members.len(), 2);
        assert!(members.contains(&Value::Tid(tid(5))));
        assert!(members.contains(&Value::Tid(TemporalId::EMPTY)));
    }

    #[test]
    fn cutoff_datasets_get_an_id_bounded_branch() {
        let mut lookup = DataSetLookup::new(tid(5));
        lookup.add(tid(3));
        lookup.apply_cutoff(tid(3), tid(9));
        let constraint = data_set_constraint(&lookup);

        let Some(Value::Array(branches)) = constraint.get("$or").cloned() else {
            panic!("expected `$or` branches, got {constraint:?}");
        };
        assert_eq!(branches.len(), 2);
        let cut = branches
            .iter()
            .filter_map(|branch| match branch {
                Value::Doc(doc) => doc.get("$and").cloned(),
                _ => None,
            })
            .next()
            .expect("one `$and` branch for the cutoff dataset");
        let Value::Array(conds) = cut else {
            panic!("expected `$and` array");
        };
        assert_eq!(conds.len(), 2);
    }

    #[test]
    fn discriminator_filter_collapses_to_equality_for_leaves() {
        let registry = registry();
        let derived =
            discriminator_filter(&registry, samples::DERIVED_SAMPLE_TYPE).unwrap();
        let Some(Value::Doc(op)) = derived.get("_t").cloned() else {
            panic!("expected `_t` filter");
        };
        assert_eq!(
            op.get("$eq"),
            Some(&Value::String("DerivedSample".to_string()))
        );

        let base = discriminator_filter(&registry, samples::BASE_SAMPLE_TYPE).unwrap();
        let Some(Value::Doc(op)) = base.get("_t").cloned() else {
            panic!("expected `_t` filter");
        };
        let Some(Value::Array(names)) = op.get("$in").cloned() else {
            panic!("expected `$in` over the hierarchy");
        };
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn user_sort_keys_come_first_and_stabilizers_never_duplicate() {
        let lookup = DataSetLookup::new(tid(5));
        let stages = build_stages(
            &lookup,
            &registry(),
            samples::BASE_SAMPLE_TYPE,
            &[],
            &[("version".to_string(), -1), ("_key".to_string(), 1)],
            None,
            None,
        )
        .unwrap();
        let Some(Stage::Sort(keys)) = stages.last() else {
            panic!("final stage is the stabilized sort");
        };
        assert_eq!(
            keys,
            &vec![
                ("version".to_string(), -1),
                ("_key".to_string(), 1),
                ("_dataset".to_string(), -1),
                ("_id".to_string(), -1),
            ]
        );
    }
}
