use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metadata::SystemType;

/// A table's fields as seen from either the source or the graph, keyed by
/// field name. Used by the Differ as the unit of comparison.
pub type TableSnapshot = BTreeMap<String, SystemType>;

/// `table name -> its fields`, one schema's worth of tables.
pub type SchemaSnapshot = BTreeMap<String, TableSnapshot>;

/// `namespace -> schema snapshot`.
pub type SourceSnapshot = BTreeMap<String, SchemaSnapshot>;

/// One field's three-state diff: created, deleted, or altered (type change).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDiff {
    pub old_name: Option<String>,
    pub new_name: Option<String>,
    pub old_type: Option<SystemType>,
    pub new_type: Option<SystemType>,
    /// Set by the Classifier when the name matches the primary-key pattern.
    pub is_key: bool,
}

impl FieldDiff {
    pub fn created(name: &str, system_type: SystemType) -> Self {
        Self {
            old_name: None,
            new_name: Some(name.to_string()),
            old_type: None,
            new_type: Some(system_type),
            is_key: false,
        }
    }

    pub fn deleted(name: &str, system_type: SystemType) -> Self {
        Self {
            old_name: Some(name.to_string()),
            new_name: None,
            old_type: Some(system_type),
            new_type: None,
            is_key: false,
        }
    }

    pub fn altered(name: &str, old_type: SystemType, new_type: SystemType) -> Self {
        Self {
            old_name: Some(name.to_string()),
            new_name: Some(name.to_string()),
            old_type: Some(old_type),
            new_type: Some(new_type),
            is_key: false,
        }
    }

    pub fn name(&self) -> &str {
        self.new_name
            .as_deref()
            .or(self.old_name.as_deref())
            .expect("a field diff always carries at least one name")
    }
}

/// One table's three-state diff: created, deleted, or altered (field diffs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDiff {
    pub old_name: Option<String>,
    pub new_name: Option<String>,
    pub db: String,
    pub fields: Vec<FieldDiff>,
}

impl TableDiff {
    pub fn created(name: &str, db: &str, fields: Vec<FieldDiff>) -> Self {
        Self {
            old_name: None,
            new_name: Some(name.to_string()),
            db: db.to_string(),
            fields,
        }
    }

    pub fn deleted(name: &str, db: &str) -> Self {
        Self {
            old_name: Some(name.to_string()),
            new_name: None,
            db: db.to_string(),
            fields: Vec::new(),
        }
    }

    pub fn altered(name: &str, db: &str, fields: Vec<FieldDiff>) -> Self {
        Self {
            old_name: Some(name.to_string()),
            new_name: Some(name.to_string()),
            db: db.to_string(),
            fields,
        }
    }

    pub fn name(&self) -> &str {
        self.new_name
            .as_deref()
            .or(self.old_name.as_deref())
            .expect("a table diff always carries at least one name")
    }

    pub fn is_create(&self) -> bool {
        self.old_name.is_none() && self.new_name.is_some()
    }

    pub fn is_delete(&self) -> bool {
        self.old_name.is_some() && self.new_name.is_none()
    }

    pub fn is_alter(&self) -> bool {
        self.old_name.is_some() && self.new_name.is_some()
    }
}

/// One namespace's worth of table diffs within a migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaDiff {
    pub name: String,
    pub tables: Vec<TableDiff>,
}

/// An immutable, versioned record of one diff run, chained to the previous
/// migration for the same `db_source`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Migration {
    pub guid: Uuid,
    pub name: String,
    pub db_source: String,
    pub prev_migration: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schemas: Vec<SchemaDiff>,
}

impl Migration {
    pub fn table_count(&self) -> usize {
        self.schemas.iter().map(|s| s.tables.len()).sum()
    }
}

/// The patterns used to classify tables by role; compiled once per request.
#[derive(Debug, Clone)]
pub struct MigrationPattern {
    pub hub_prefix: String,
    pub pk_pattern: String,
    pub fk_pattern: String,
    /// Fallback regex to extract a satellite/link's parent-hub stem from its
    /// own table name, tried when `fk_pattern`-based resolution fails.
    pub fk_table: Option<String>,
}

impl Default for MigrationPattern {
    fn default() -> Self {
        Self {
            hub_prefix: String::new(),
            pk_pattern: "hash_key".to_string(),
            fk_pattern: r"^(?:id)?(\w*)_hash_fkey$".to_string(),
            fk_table: None,
        }
    }
}
