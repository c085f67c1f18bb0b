//! Pure set algebra over two schema snapshots: `graph - source` is a delete,
//! `source - graph` is a create, and the intersection is diffed field by
//! field to find alters. No I/O happens here; callers supply already-fetched
//! snapshots so the comparison itself stays trivially testable.

use crate::migration::model::{FieldDiff, SchemaSnapshot, TableDiff};

/// Computes the table diffs for one namespace given its source-of-truth
/// snapshot and the graph's current snapshot. Table and field names are
/// sorted before iterating so the result is deterministic regardless of the
/// snapshot maps' internal ordering.
pub fn diff_schema(source: &SchemaSnapshot, graph: &SchemaSnapshot) -> Vec<TableDiff> {
    let mut out = Vec::new();

    for (name, fields) in source {
        if !graph.contains_key(name) {
            out.push(TableDiff::created(
                name,
                "",
                fields
                    .iter()
                    .map(|(f, t)| FieldDiff::created(f, *t))
                    .collect(),
            ));
        }
    }

    for name in graph.keys() {
        if !source.contains_key(name) {
            out.push(TableDiff::deleted(name, ""));
        }
    }

    for (name, source_fields) in source {
        let Some(graph_fields) = graph.get(name) else {
            continue;
        };
        if source_fields == graph_fields {
            continue;
        }
        let field_diffs = diff_fields(source_fields, graph_fields);
        if !field_diffs.is_empty() {
            out.push(TableDiff::altered(name, "", field_diffs));
        }
    }

    out.sort_by(|a, b| a.name().cmp(b.name()));
    out
}

fn diff_fields(
    source: &crate::migration::model::TableSnapshot,
    graph: &crate::migration::model::TableSnapshot,
) -> Vec<FieldDiff> {
    let mut out = Vec::new();

    for (name, system_type) in source {
        if !graph.contains_key(name) {
            out.push(FieldDiff::created(name, *system_type));
        }
    }
    for (name, system_type) in graph {
        if !source.contains_key(name) {
            out.push(FieldDiff::deleted(name, *system_type));
        }
    }
    for (name, source_type) in source {
        if let Some(graph_type) = graph.get(name) {
            if graph_type != source_type {
                out.push(FieldDiff::altered(name, *graph_type, *source_type));
            }
        }
    }

    out.sort_by(|a, b| a.name().cmp(b.name()));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::SystemType;
    use std::collections::BTreeMap;

    fn snapshot(tables: &[(&str, &[(&str, SystemType)])]) -> SchemaSnapshot {
        tables
            .iter()
            .map(|(name, fields)| {
                let map: BTreeMap<String, SystemType> = fields
                    .iter()
                    .map(|(f, t)| (f.to_string(), *t))
                    .collect();
                (name.to_string(), map)
            })
            .collect()
    }

    #[test]
    fn create_table_when_only_in_source() {
        let source = snapshot(&[("customer_hub", &[("customer_hash_key", SystemType::Str)])]);
        let graph = snapshot(&[]);
        let diffs = diff_schema(&source, &graph);
        assert_eq!(diffs.len(), 1);
        assert!(diffs[0].is_create());
        assert_eq!(diffs[0].name(), "customer_hub");
    }

    #[test]
    fn delete_table_when_only_in_graph() {
        let source = snapshot(&[]);
        let graph = snapshot(&[("legacy_sat", &[("email", SystemType::Str)])]);
        let diffs = diff_schema(&source, &graph);
        assert_eq!(diffs.len(), 1);
        assert!(diffs[0].is_delete());
    }

    #[test]
    fn alter_table_when_field_type_changes() {
        let source = snapshot(&[("customer_hub", &[("email", SystemType::Str)])]);
        let graph = snapshot(&[("customer_hub", &[("email", SystemType::Str)])]);
        assert!(diff_schema(&source, &graph).is_empty());

        let source2 = snapshot(&[("customer_hub", &[("email", SystemType::B64Binary)])]);
        let diffs = diff_schema(&source2, &graph);
        assert_eq!(diffs.len(), 1);
        assert!(diffs[0].is_alter());
        assert_eq!(diffs[0].fields.len(), 1);
    }

    #[test]
    fn idempotent_on_equal_snapshots() {
        let snap = snapshot(&[("a", &[("b", SystemType::Int)])]);
        assert!(diff_schema(&snap, &snap).is_empty());
    }

    #[test]
    fn diff_is_deterministic_regardless_of_input_order() {
        let source = snapshot(&[
            ("z_table", &[("a", SystemType::Int)]),
            ("a_table", &[("a", SystemType::Int)]),
        ]);
        let graph = snapshot(&[]);
        let diffs = diff_schema(&source, &graph);
        assert_eq!(diffs[0].name(), "a_table");
        assert_eq!(diffs[1].name(), "z_table");
    }
}
