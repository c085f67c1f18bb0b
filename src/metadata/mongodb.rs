use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use mongodb::bson::{Bson, Document};
use mongodb::Client;

use super::{FieldRow, MetadataExtractor, NamespaceTables, SystemType};
use crate::error::{BackendError, Error};

/// Bounds how many documents per collection are sampled when inferring a
/// schema for an otherwise schemaless store.
const SAMPLE_SIZE: i64 = 50;

fn bson_type(value: &Bson) -> SystemType {
    match value {
        Bson::Boolean(_) => SystemType::Bool,
        Bson::String(_) => SystemType::Str,
        Bson::Int32(_) | Bson::Int64(_) => SystemType::Int,
        Bson::Double(_) => SystemType::Float,
        Bson::DateTime(_) => SystemType::Datetime,
        Bson::Document(_) => SystemType::Json,
        Bson::Array(_) => SystemType::List,
        Bson::ObjectId(_) => SystemType::Str,
        Bson::Binary(_) => SystemType::B64Binary,
        _ => SystemType::Unspecified,
    }
}

/// Discovers collections of a MongoDB source by sampling a bounded number of
/// documents per collection and unioning their top-level field types. This
/// is deliberately best-effort: documents are schemaless, so there is no
/// authoritative "columns" list the way there is for a relational source,
/// and nested documents are not flattened.
pub struct MongoExtractor {
    conn_string: String,
}

impl MongoExtractor {
    pub fn new(conn_string: &str) -> Self {
        Self {
            conn_string: conn_string.to_string(),
        }
    }

    async fn connect(&self) -> Result<Client, Error> {
        Client::with_uri_str(&self.conn_string)
            .await
            .map_err(|e| BackendError::SourceUnavailable(e.to_string()).into())
    }
}

#[async_trait]
impl MetadataExtractor for MongoExtractor {
    async fn list_namespaces_and_tables(&self) -> Result<NamespaceTables, Error> {
        let client = self.connect().await?;
        let db_names = client.list_database_names(None, None).await?;
        let mut out: NamespaceTables = BTreeMap::new();
        for db_name in db_names {
            if db_name == "admin" || db_name == "local" || db_name == "config" {
                continue;
            }
            let db = client.database(&db_name);
            let collections = db.list_collection_names(None).await?;
            out.insert(db_name, collections.into_iter().collect());
        }
        Ok(out)
    }

    async fn list_single_table(
        &self,
        name: &str,
        db_path: Option<&str>,
    ) -> Result<NamespaceTables, Error> {
        let all = self.list_namespaces_and_tables().await?;
        let mut out: NamespaceTables = BTreeMap::new();
        for (ns, tables) in all {
            if tables.contains(name) {
                out.entry(ns).or_default().insert(name.to_string());
            }
        }
        if out.is_empty() {
            if let Some(db_path) = db_path {
                if let Some((ns, _)) = db_path.rsplit_once('.') {
                    out.entry(ns.to_string()).or_default();
                }
            }
        }
        Ok(out)
    }

    async fn describe(&self, ns: &str, tables: &BTreeSet<String>) -> Result<Vec<FieldRow>, Error> {
        let client = self.connect().await?;
        let db = client.database(ns);
        let mut out = Vec::new();
        for table in tables {
            let collection = db.collection::<Document>(table);
            let mut cursor = collection.find(None, None).await?;
            let mut seen: BTreeMap<String, SystemType> = BTreeMap::new();
            let mut n = 0i64;
            use futures::stream::StreamExt;
            while n < SAMPLE_SIZE {
                match cursor.next().await {
                    Some(Ok(doc)) => {
                        for (field, value) in doc {
                            if field == "_id" {
                                continue;
                            }
                            seen.entry(field).or_insert_with(|| bson_type(&value));
                        }
                        n += 1;
                    }
                    _ => break,
                }
            }
            for (field, system_type) in seen {
                out.push(FieldRow {
                    db: ns.to_string(),
                    table: table.clone(),
                    field,
                    system_type,
                });
            }
        }
        out.sort_by(|a, b| (&a.table, &a.field).cmp(&(&b.table, &b.field)));
        Ok(out)
    }

    async fn count_tables(&self) -> Result<usize, Error> {
        let namespaces = self.list_namespaces_and_tables().await?;
        Ok(namespaces.values().map(|t| t.len()).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bson_types_map_to_canonical_set() {
        assert_eq!(bson_type(&Bson::Boolean(true)), SystemType::Bool);
        assert_eq!(bson_type(&Bson::Int32(1)), SystemType::Int);
        assert_eq!(bson_type(&Bson::Array(vec![].into())), SystemType::List);
    }
}
