pub mod mongodb;
pub mod postgres;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Error};

/// A table's fully-qualified identity: `namespace -> table name`.
pub type NamespaceTables = BTreeMap<String, BTreeSet<String>>;

/// One row of `describe`: a field and its canonical type, scoped to a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRow {
    pub db: String,
    pub table: String,
    pub field: String,
    pub system_type: SystemType,
}

/// The canonical set of types every backend's native types are mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemType {
    Bool,
    Str,
    Int,
    Float,
    Date,
    Datetime,
    Json,
    Xml,
    List,
    B64Binary,
    /// The native type had no mapping; treated as "unspecified" downstream.
    Unspecified,
}

impl SystemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemType::Bool => "bool",
            SystemType::Str => "str",
            SystemType::Int => "int",
            SystemType::Float => "float",
            SystemType::Date => "date",
            SystemType::Datetime => "datetime",
            SystemType::Json => "json",
            SystemType::Xml => "xml",
            SystemType::List => "list",
            SystemType::B64Binary => "b64binary",
            SystemType::Unspecified => "",
        }
    }
}

impl std::fmt::Display for SystemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discovers namespaces, tables and columns from a source backend, mapping
/// native types onto the canonical [`SystemType`] set.
#[async_trait]
pub trait MetadataExtractor: Send + Sync {
    async fn list_namespaces_and_tables(&self) -> Result<NamespaceTables, Error>;

    /// Looks up a single table by name, optionally anchored to `db_path =
    /// source.schema.name`. Returns an entry with an empty table set when the
    /// table is absent, so the caller's namespace is still present for diffing.
    async fn list_single_table(
        &self,
        name: &str,
        db_path: Option<&str>,
    ) -> Result<NamespaceTables, Error>;

    async fn describe(&self, ns: &str, tables: &BTreeSet<String>) -> Result<Vec<FieldRow>, Error>;

    async fn count_tables(&self) -> Result<usize, Error>;
}

/// Builds an extractor for a connection string by dispatching on its URL scheme,
/// the same way the source system keys its factory off `conn_string.split("://")`.
pub fn build(conn_string: &str) -> Result<Box<dyn MetadataExtractor>, Error> {
    let scheme = conn_string
        .split_once("://")
        .map(|(scheme, _)| scheme)
        .unwrap_or(conn_string);
    match scheme {
        "postgresql" | "postgres" => Ok(Box::new(postgres::PostgresExtractor::new(conn_string))),
        "mongodb" | "mongodb+srv" => Ok(Box::new(mongodb::MongoExtractor::new(conn_string))),
        other => Err(ClientError::UnknownBackend(other.to_string()).into()),
    }
}

/// Checks whether a string's bytes round-trip through standard base64, used to
/// refine an otherwise-textual column into [`SystemType::B64Binary`].
pub fn is_base64(value: &str) -> bool {
    use base64::Engine;
    if value.is_empty() || value.len() % 4 != 0 {
        return false;
    }
    base64::engine::general_purpose::STANDARD
        .decode(value)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_round_trip_detected() {
        assert!(is_base64("aGVsbG8="));
        assert!(!is_base64("not base64 at all!"));
    }
}
