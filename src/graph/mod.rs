pub mod query;
pub mod store;

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::metadata::FieldRow;

/// `db_source.schema`: one Apache AGE sub-graph per namespace.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NamespaceName(String);

impl NamespaceName {
    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    /// The AGE graph identifier derived from this namespace: dots are not
    /// valid in an AGE graph name, so they are replaced with underscores.
    pub fn graph_name(&self) -> String {
        self.0.replace(['.', '-'], "_")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NamespaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NamespaceName({:?})", self.0)
    }
}

impl fmt::Display for NamespaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NamespaceName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Read/write adapter over the labeled property graph that models the Data
/// Vault. Every method is scoped to a single namespace (one AGE sub-graph).
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn list_tables(&self, ns: &NamespaceName) -> Result<BTreeSet<String>, Error>;

    async fn list_single_table(
        &self,
        ns: &NamespaceName,
        name: &str,
    ) -> Result<BTreeSet<String>, Error>;

    async fn describe(
        &self,
        ns: &NamespaceName,
        tables: &BTreeSet<String>,
    ) -> Result<Vec<FieldRow>, Error>;

    /// Executes a single batched mutation statement and commits it.
    async fn execute_batch(&self, ns: &NamespaceName, statement: &str) -> Result<(), Error>;
}
