use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio::sync::Mutex;
use tokio_postgres::NoTls;

use super::query::QueryBuilder;
use super::{GraphStore, NamespaceName};
use crate::error::{BackendError, Error};
use crate::metadata::{FieldRow, SystemType};

/// Apache AGE-backed [`GraphStore`]. AGE has no async Rust driver, so graph
/// mutations are issued as raw SQL wrapping openCypher via
/// `ag_catalog.cypher(...)`, the same technique the source system used
/// through `psycopg2` directly against the `ag_catalog` extension.
pub struct AgeGraphStore {
    pool: Pool,
    /// Graphs already confirmed to exist this process, to avoid a
    /// `create_graph` round-trip on every call.
    known_graphs: Arc<Mutex<BTreeSet<String>>>,
}

impl AgeGraphStore {
    pub fn connect(conn_string: &str) -> Result<Self, Error> {
        let pg_config: tokio_postgres::Config = conn_string
            .parse()
            .map_err(|e: tokio_postgres::Error| BackendError::GraphUnavailable(e.to_string()))?;
        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(8)
            .build()
            .map_err(|e| BackendError::GraphUnavailable(e.to_string()))?;
        Ok(Self {
            pool,
            known_graphs: Arc::new(Mutex::new(BTreeSet::new())),
        })
    }

    /// Liveness probe with a single reconnect retry, mirroring the source
    /// system's `check_on_conn_alive`: a `SELECT 1` that on failure causes a
    /// fresh checkout from the pool (deadpool already recycles the
    /// connection behind the scenes; this just forces the probe).
    async fn ensure_connection(&self) -> Result<deadpool_postgres::Client, Error> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| BackendError::GraphUnavailable(e.to_string()))?;
        if client.simple_query("SELECT 1").await.is_ok() {
            return Ok(client);
        }
        tracing::warn!("graph store connection stale, retrying once");
        self.pool
            .get()
            .await
            .map_err(|e| BackendError::GraphUnavailable(e.to_string()))
    }

    async fn ensure_graph(&self, graph: &str) -> Result<(), Error> {
        {
            let known = self.known_graphs.lock().await;
            if known.contains(graph) {
                return Ok(());
            }
        }
        let client = self.ensure_connection().await?;
        client
            .batch_execute(&QueryBuilder::create_graph_if_missing(graph))
            .await?;
        self.known_graphs.lock().await.insert(graph.to_string());
        Ok(())
    }

    fn parse_agtype_string(raw: &str) -> String {
        raw.trim_matches('"').to_string()
    }

    fn parse_system_type(raw: &str) -> SystemType {
        match Self::parse_agtype_string(raw).as_str() {
            "bool" => SystemType::Bool,
            "str" => SystemType::Str,
            "int" => SystemType::Int,
            "float" => SystemType::Float,
            "date" => SystemType::Date,
            "datetime" => SystemType::Datetime,
            "json" => SystemType::Json,
            "xml" => SystemType::Xml,
            "list" => SystemType::List,
            "b64binary" => SystemType::B64Binary,
            _ => SystemType::Unspecified,
        }
    }
}

#[async_trait]
impl GraphStore for AgeGraphStore {
    async fn list_tables(&self, ns: &NamespaceName) -> Result<BTreeSet<String>, Error> {
        let graph = ns.graph_name();
        self.ensure_graph(&graph).await?;
        let client = self.ensure_connection().await?;
        let rows = client.query(&QueryBuilder::list_tables(&graph), &[]).await?;
        Ok(rows
            .iter()
            .map(|r| Self::parse_agtype_string(&r.get::<_, String>(0)))
            .collect())
    }

    async fn list_single_table(
        &self,
        ns: &NamespaceName,
        name: &str,
    ) -> Result<BTreeSet<String>, Error> {
        let graph = ns.graph_name();
        self.ensure_graph(&graph).await?;
        let client = self.ensure_connection().await?;
        let stmt = QueryBuilder::list_single_table(&graph, name)?;
        let rows = client.query(&stmt, &[]).await?;
        Ok(rows
            .iter()
            .map(|r| Self::parse_agtype_string(&r.get::<_, String>(0)))
            .collect())
    }

    async fn describe(
        &self,
        ns: &NamespaceName,
        tables: &BTreeSet<String>,
    ) -> Result<Vec<FieldRow>, Error> {
        if tables.is_empty() {
            return Ok(Vec::new());
        }
        let graph = ns.graph_name();
        self.ensure_graph(&graph).await?;
        let client = self.ensure_connection().await?;
        let names: Vec<String> = tables.iter().cloned().collect();
        let stmt = QueryBuilder::describe(&graph, &names)?;
        let rows = client.query(&stmt, &[]).await?;
        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            let db: String = Self::parse_agtype_string(&r.get::<_, String>(0));
            let table: String = Self::parse_agtype_string(&r.get::<_, String>(1));
            let field: String = Self::parse_agtype_string(&r.get::<_, String>(2));
            let dbtype: String = Self::parse_agtype_string(&r.get::<_, String>(3));
            out.push(FieldRow {
                db,
                table,
                field,
                system_type: Self::parse_system_type(&dbtype),
            });
        }
        out.sort_by(|a, b| (&a.db, &a.table, &a.field).cmp(&(&b.db, &b.table, &b.field)));
        Ok(out)
    }

    async fn execute_batch(&self, ns: &NamespaceName, statement: &str) -> Result<(), Error> {
        let graph = ns.graph_name();
        self.ensure_graph(&graph).await?;
        let mut client = self.ensure_connection().await?;
        let txn = client.transaction().await?;
        txn.batch_execute(statement).await?;
        txn.commit().await?;
        Ok(())
    }
}
