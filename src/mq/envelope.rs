use serde::{Deserialize, Serialize};

use crate::migration::model::MigrationPattern as ModelMigrationPattern;

/// Wire shape of the `migration_pattern` sub-object; mirrors
/// [`ModelMigrationPattern`] but keeps its own `Deserialize` defaults so a
/// request may omit any subset of the patterns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationPatternIn {
    #[serde(default)]
    pub hub_prefix: String,
    #[serde(default = "default_pk_pattern")]
    pub pk_pattern: String,
    #[serde(default = "default_fk_pattern")]
    pub fk_pattern: String,
    /// Fallback regex to extract a satellite/link's parent-hub stem from its
    /// own table name, tried when `fk_pattern`-based resolution fails.
    #[serde(default)]
    pub fk_table: Option<String>,
}

fn default_pk_pattern() -> String {
    "hash_key".to_string()
}

fn default_fk_pattern() -> String {
    r"^(?:id)?(\w*)_hash_fkey$".to_string()
}

impl Default for MigrationPatternIn {
    fn default() -> Self {
        Self {
            hub_prefix: String::new(),
            pk_pattern: default_pk_pattern(),
            fk_pattern: default_fk_pattern(),
            fk_table: None,
        }
    }
}

impl From<MigrationPatternIn> for ModelMigrationPattern {
    fn from(v: MigrationPatternIn) -> Self {
        Self {
            hub_prefix: v.hub_prefix,
            pk_pattern: v.pk_pattern,
            fk_pattern: v.fk_pattern,
            fk_table: v.fk_table,
        }
    }
}

/// The `task`-routed request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRequest {
    pub name: String,
    pub conn_string: String,
    #[serde(default)]
    pub object_name: Option<String>,
    #[serde(default)]
    pub object_db_path: Option<String>,
    #[serde(default)]
    pub migration_pattern: MigrationPatternIn,
    pub source_guid: String,
    pub source_name: String,
    #[serde(default)]
    pub object_guid: Option<String>,
    #[serde(default)]
    pub sync_type: Option<String>,
    #[serde(default)]
    pub identity_id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

/// The read-facing migration shape returned both over HTTP and embedded in
/// a successful result envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationOut {
    pub name: String,
    pub schemas: Vec<SchemaOut>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaOut {
    pub name: String,
    pub tables_to_create: Vec<String>,
    pub tables_to_alter: Vec<String>,
    pub tables_to_delete: Vec<String>,
}

/// The `result`-routed response envelope. Failure results omit
/// `graph_migration`/`count` and carry only correlation fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    pub status: ResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conn_string: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_migration: Option<MigrationOut>,
    pub source_guid: String,
    pub source_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_guid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Failure,
}

impl MigrationResult {
    pub fn failure(request: &MigrationRequest) -> Self {
        Self {
            status: ResultStatus::Failure,
            count: None,
            conn_string: None,
            graph_migration: None,
            source_guid: request.source_guid.clone(),
            source_name: request.source_name.clone(),
            object_guid: request.object_guid.clone(),
            object_name: request.object_name.clone(),
            model: request.model.clone(),
            sync_type: request.sync_type.clone(),
            identity_id: request.identity_id.clone(),
        }
    }

    pub fn success(request: &MigrationRequest, count: usize, migration: MigrationOut) -> Self {
        Self {
            status: ResultStatus::Success,
            count: Some(count),
            conn_string: Some(request.conn_string.clone()),
            graph_migration: Some(migration),
            source_guid: request.source_guid.clone(),
            source_name: request.source_name.clone(),
            object_guid: request.object_guid.clone(),
            object_name: request.object_name.clone(),
            model: request.model.clone(),
            sync_type: request.sync_type.clone(),
            identity_id: request.identity_id.clone(),
        }
    }
}
