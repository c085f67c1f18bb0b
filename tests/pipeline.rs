use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;

use graph_schema_migrator::apply::Applier;
use graph_schema_migrator::classify::{classify_schema, CompiledPatterns};
use graph_schema_migrator::differ::diff_schema;
use graph_schema_migrator::error::Error;
use graph_schema_migrator::graph::{GraphStore, NamespaceName};
use graph_schema_migrator::metadata::{FieldRow, SystemType};
use graph_schema_migrator::migration::model::{MigrationPattern, SchemaDiff, SchemaSnapshot};

/// An in-memory stand-in for the Apache AGE store: good enough to exercise
/// the Differ -> Classifier -> Applier pipeline end to end without a real
/// Postgres/AGE instance.
#[derive(Default)]
struct FakeGraphStore {
    tables: Mutex<BTreeMap<String, BTreeMap<String, SystemType>>>,
    statements: Mutex<Vec<String>>,
}

#[async_trait]
impl GraphStore for FakeGraphStore {
    async fn list_tables(&self, _ns: &NamespaceName) -> Result<BTreeSet<String>, Error> {
        Ok(self.tables.lock().unwrap().keys().cloned().collect())
    }

    async fn list_single_table(
        &self,
        _ns: &NamespaceName,
        name: &str,
    ) -> Result<BTreeSet<String>, Error> {
        let tables = self.tables.lock().unwrap();
        Ok(if tables.contains_key(name) {
            BTreeSet::from([name.to_string()])
        } else {
            BTreeSet::new()
        })
    }

    async fn describe(
        &self,
        ns: &NamespaceName,
        tables: &BTreeSet<String>,
    ) -> Result<Vec<FieldRow>, Error> {
        let store = self.tables.lock().unwrap();
        let mut out = Vec::new();
        for table in tables {
            if let Some(fields) = store.get(table) {
                for (field, system_type) in fields {
                    out.push(FieldRow {
                        db: ns.to_string(),
                        table: table.clone(),
                        field: field.clone(),
                        system_type: *system_type,
                    });
                }
            }
        }
        Ok(out)
    }

    async fn execute_batch(&self, _ns: &NamespaceName, statement: &str) -> Result<(), Error> {
        self.statements.lock().unwrap().push(statement.to_string());
        Ok(())
    }
}

fn snapshot(tables: &[(&str, &[(&str, SystemType)])]) -> SchemaSnapshot {
    tables
        .iter()
        .map(|(name, fields)| {
            let map: BTreeMap<String, SystemType> =
                fields.iter().map(|(f, t)| (f.to_string(), *t)).collect();
            (name.to_string(), map)
        })
        .collect()
}

#[tokio::test]
async fn create_hub_end_to_end() {
    let source = snapshot(&[(
        "customer_hub",
        &[
            ("customer_hash_key", SystemType::Str),
            ("name", SystemType::Str),
        ],
    )]);
    let graph = snapshot(&[]);

    let mut tables = diff_schema(&source, &graph);
    for t in &mut tables {
        t.db = "demo.dv_raw".to_string();
    }
    let schema = SchemaDiff {
        name: "demo.dv_raw".to_string(),
        tables,
    };

    let patterns = CompiledPatterns::compile(&MigrationPattern::default()).unwrap();
    let plan = classify_schema(&schema, &patterns);
    assert_eq!(plan.hubs_to_create.len(), 1);
    assert_eq!(
        plan.hubs_to_create[0].pk.as_deref(),
        Some("customer_hash_key")
    );

    let store = FakeGraphStore::default();
    let applier = Applier::new(&store);
    let ns = NamespaceName::from_string("demo.dv_raw".to_string());
    applier.apply(&ns, &plan, &patterns).await.unwrap();

    let statements = store.statements.lock().unwrap();
    assert_eq!(statements.len(), 1);
    assert!(statements[0].contains("customer_hub"));
}

#[tokio::test]
async fn delete_table_end_to_end() {
    let mut graph_tables = BTreeMap::new();
    graph_tables.insert(
        "legacy_sat".to_string(),
        BTreeMap::from([("email".to_string(), SystemType::Str)]),
    );
    let store = FakeGraphStore {
        tables: Mutex::new(graph_tables),
        statements: Mutex::new(Vec::new()),
    };

    let source = snapshot(&[]);
    let graph = snapshot(&[("legacy_sat", &[("email", SystemType::Str)])]);
    let tables = diff_schema(&source, &graph);
    let schema = SchemaDiff {
        name: "demo.dv_raw".to_string(),
        tables,
    };

    let patterns = CompiledPatterns::compile(&MigrationPattern::default()).unwrap();
    let plan = classify_schema(&schema, &patterns);
    assert_eq!(plan.tables_to_delete, vec!["legacy_sat".to_string()]);

    let applier = Applier::new(&store);
    let ns = NamespaceName::from_string("demo.dv_raw".to_string());
    applier.apply(&ns, &plan, &patterns).await.unwrap();

    let statements = store.statements.lock().unwrap();
    assert!(statements.iter().any(|s| s.contains("legacy_sat") && s.contains("DETACH DELETE")));
}

#[tokio::test]
async fn idempotent_apply_issues_no_statements() {
    let store = FakeGraphStore::default();
    let applier = Applier::new(&store);
    let ns = NamespaceName::from_string("demo.dv_raw".to_string());
    let patterns = CompiledPatterns::compile(&MigrationPattern::default()).unwrap();
    let plan = Default::default();
    applier.apply(&ns, &plan, &patterns).await.unwrap();
    assert!(store.statements.lock().unwrap().is_empty());
}
