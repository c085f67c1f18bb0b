use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use tokio_postgres::NoTls;

use super::{is_base64, FieldRow, MetadataExtractor, NamespaceTables, SystemType};
use crate::error::{BackendError, Error};

/// Maps `information_schema.columns.data_type` onto the canonical type set.
/// Unmapped native types fall through to [`SystemType::Unspecified`].
static TYPE_MAP: Lazy<BTreeMap<&'static str, SystemType>> = Lazy::new(|| {
    use SystemType::*;
    BTreeMap::from([
        ("boolean", Bool),
        ("character varying", Str),
        ("character", Str),
        ("uuid", Str),
        ("text", Str),
        ("smallint", Int),
        ("integer", Int),
        ("bigint", Int),
        ("double precision", Float),
        ("real", Float),
        ("numeric", Float),
        ("decimal", Float),
        ("date", Date),
        ("timestamp without time zone", Datetime),
        ("timestamp with time zone", Datetime),
        ("jsonb", Json),
        ("json", Json),
        ("xml", Xml),
        ("ARRAY", List),
    ])
});

fn map_native_type(native: &str) -> SystemType {
    TYPE_MAP.get(native).copied().unwrap_or(SystemType::Unspecified)
}

/// Discovers tables/columns of a Postgres source database via
/// `information_schema`, refining `str` columns that happen to be base64 into
/// [`SystemType::B64Binary`].
pub struct PostgresExtractor {
    conn_string: String,
}

impl PostgresExtractor {
    pub fn new(conn_string: &str) -> Self {
        Self {
            conn_string: conn_string.to_string(),
        }
    }

    /// Best-effort: samples one non-null value of `schema.table.field` and
    /// checks whether it round-trips through base64. Quoting here is safe
    /// because `schema`/`table`/`field` all come from `information_schema`,
    /// never from request input.
    async fn sample_is_base64(
        &self,
        client: &tokio_postgres::Client,
        schema: &str,
        table: &str,
        field: &str,
    ) -> bool {
        let query = format!(
            "SELECT \"{field}\"::text FROM \"{schema}\".\"{table}\" WHERE \"{field}\" IS NOT NULL LIMIT 1",
            field = field,
            schema = schema,
            table = table,
        );
        match client.query_opt(&query, &[]).await {
            Ok(Some(row)) => row
                .try_get::<_, String>(0)
                .map(|v| is_base64(&v))
                .unwrap_or(false),
            _ => false,
        }
    }

    async fn connect(&self) -> Result<tokio_postgres::Client, Error> {
        let (client, connection) = tokio_postgres::connect(&self.conn_string, NoTls)
            .await
            .map_err(|e| BackendError::SourceUnavailable(e.to_string()))?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("postgres source connection closed: {e}");
            }
        });
        Ok(client)
    }
}

#[async_trait]
impl MetadataExtractor for PostgresExtractor {
    async fn list_namespaces_and_tables(&self) -> Result<NamespaceTables, Error> {
        let client = self.connect().await?;
        let rows = client
            .query(
                "SELECT table_schema, table_name FROM information_schema.tables \
                 WHERE table_type = 'BASE TABLE' \
                   AND table_schema NOT IN ('pg_catalog', 'information_schema') \
                 ORDER BY table_schema, table_name",
                &[],
            )
            .await?;
        let mut out: NamespaceTables = BTreeMap::new();
        for row in rows {
            let schema: String = row.get(0);
            let table: String = row.get(1);
            out.entry(schema).or_default().insert(table);
        }
        Ok(out)
    }

    async fn list_single_table(
        &self,
        name: &str,
        db_path: Option<&str>,
    ) -> Result<NamespaceTables, Error> {
        let client = self.connect().await?;
        let rows = client
            .query(
                "SELECT table_schema, table_name FROM information_schema.tables \
                 WHERE table_type = 'BASE TABLE' AND table_name = $1",
                &[&name],
            )
            .await?;
        let mut out: NamespaceTables = BTreeMap::new();
        for row in rows {
            let schema: String = row.get(0);
            let table: String = row.get(1);
            out.entry(schema).or_default().insert(table);
        }
        if out.is_empty() {
            if let Some(db_path) = db_path {
                // `source.schema.name`; the namespace is `source.schema`.
                if let Some((ns, _)) = db_path.rsplit_once('.') {
                    out.entry(ns.to_string()).or_default();
                }
            }
        }
        Ok(out)
    }

    async fn describe(&self, ns: &str, tables: &BTreeSet<String>) -> Result<Vec<FieldRow>, Error> {
        if tables.is_empty() {
            return Ok(Vec::new());
        }
        let schema = ns.rsplit_once('.').map(|(_, s)| s).unwrap_or(ns);
        let client = self.connect().await?;
        let rows = client
            .query(
                "SELECT table_name, column_name, data_type FROM information_schema.columns \
                 WHERE table_schema = $1 AND table_name = ANY($2) \
                 ORDER BY table_name, column_name",
                &[&schema, &tables.iter().cloned().collect::<Vec<_>>()],
            )
            .await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let table: String = row.get(0);
            let field: String = row.get(1);
            let native: String = row.get(2);
            let mut system_type = map_native_type(&native);
            if system_type == SystemType::Str {
                // Heuristic carried from the source system: a textual column
                // whose sampled values round-trip through base64 is modeled
                // as binary, not string, payload.
                if self.sample_is_base64(&client, schema, &table, &field).await {
                    system_type = SystemType::B64Binary;
                }
            }
            out.push(FieldRow {
                db: ns.to_string(),
                table,
                field,
                system_type,
            });
        }
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
    fn known_types_map() {
        assert_eq!(map_native_type("boolean"), SystemType::Bool);
        assert_eq!(map_native_type("bigint"), SystemType::Int);
        assert_eq!(map_native_type("jsonb"), SystemType::Json);
    }

    #[test]
    fn unknown_type_is_unspecified() {
        assert_eq!(map_native_type("tsvector"), SystemType::Unspecified);
    }
}
