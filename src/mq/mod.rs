pub mod envelope;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicRejectOptions,
    ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Connection, ConnectionProperties, ExchangeKind};
use uuid::Uuid;

use crate::classify::{classify_schema, CompiledPatterns};
use crate::config::Config;
use crate::differ::diff_schema;
use crate::error::Error;
use crate::graph::store::AgeGraphStore;
use crate::graph::{GraphStore, NamespaceName};
use crate::metadata;
use crate::migration::model::{Migration, MigrationPattern, SchemaDiff, SchemaSnapshot};
use crate::migration::MigrationStore;

use envelope::{MigrationOut, MigrationRequest, MigrationResult, SchemaOut};

/// Drives the migration pipeline from AMQP messages: consumes one `task`
/// message at a time (single-threaded-per-consumer ordering guarantee),
/// runs metadata acquisition -> diff -> persist -> classify -> apply, and
/// publishes a `result` envelope. Acks on success; rejects with no requeue
/// on any failure so a poison message cannot loop forever.
pub struct Lifecycle {
    config: Arc<Config>,
    migration_store: Arc<MigrationStore>,
    graph_store: Arc<AgeGraphStore>,
}

impl Lifecycle {
    pub fn new(
        config: Arc<Config>,
        migration_store: Arc<MigrationStore>,
        graph_store: Arc<AgeGraphStore>,
    ) -> Self {
        Self {
            config,
            migration_store,
            graph_store,
        }
    }

    pub async fn run(&self) -> Result<(), Error> {
        let options = ConnectionProperties::default()
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio);
        let connection = Connection::connect(&self.config.mq_connection_string, options).await?;
        let channel = connection.create_channel().await?;

        channel
            .exchange_declare(
                &self.config.migration_exchange,
                ExchangeKind::Direct,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_declare(
                &self.config.migration_request_queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_bind(
                &self.config.migration_request_queue,
                &self.config.migration_exchange,
                "task",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_declare(
                &self.config.migrations_result_queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_bind(
                &self.config.migrations_result_queue,
                &self.config.migration_exchange,
                "result",
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        let mut consumer = channel
            .basic_consume(
                &self.config.migration_request_queue,
                "graph-schema-migrater",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        while let Some(delivery) = consumer.next().await {
            let delivery = match delivery {
                Ok(d) => d,
                Err(e) => {
                    tracing::error!("failed to receive delivery: {e}");
                    continue;
                }
            };
            let delivery_tag = delivery.delivery_tag;

            match self.handle_message(&delivery.data).await {
                Ok(()) => {
                    channel.basic_ack(delivery_tag, BasicAckOptions::default()).await?;
                }
                Err(e) => {
                    tracing::error!("migration request failed: {e}");
                    channel
                        .basic_reject(delivery_tag, BasicRejectOptions { requeue: false })
                        .await?;
                }
            }
        }

        Ok(())
    }

    async fn handle_message(&self, body: &[u8]) -> Result<(), Error> {
        let request: MigrationRequest = serde_json::from_slice(body)?;
        let span = tracing::info_span!(
            "migration_request",
            source_guid = %request.source_guid,
            source_name = %request.source_name,
        );
        let _enter = span.enter();

        let channel = self.publish_channel().await?;
        match self.synchronize(&request).await {
            Ok((count, migration)) => {
                let result = MigrationResult::success(&request, count, migration);
                self.publish(&channel, &result).await
            }
            Err(e) => {
                tracing::warn!("synchronize failed, publishing failure result: {e}");
                let result = MigrationResult::failure(&request);
                self.publish(&channel, &result).await?;
                Err(e)
            }
        }
    }

    async fn publish_channel(&self) -> Result<lapin::Channel, Error> {
        let options = ConnectionProperties::default()
            .with_executor(tokio_executor_trait::Tokio::current())
            .with_reactor(tokio_reactor_trait::Tokio);
        let connection = Connection::connect(&self.config.mq_connection_string, options).await?;
        Ok(connection.create_channel().await?)
    }

    async fn publish(&self, channel: &lapin::Channel, result: &MigrationResult) -> Result<(), Error> {
        let payload = serde_json::to_vec(result)?;
        channel
            .basic_publish(
                &self.config.migration_exchange,
                "result",
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default(),
            )
            .await?;
        Ok(())
    }

    /// The full pipeline for one request: metadata acquisition, diff,
    /// persist, classify, apply — in that order, so the audit record always
    /// exists before the graph is touched.
    async fn synchronize(&self, request: &MigrationRequest) -> Result<(usize, MigrationOut), Error> {
        let source = metadata::build(&request.conn_string)?;
        let pattern: MigrationPattern = request.migration_pattern.clone().into();
        let patterns = CompiledPatterns::compile(&pattern)?;

        let source_tables = match &request.object_name {
            Some(name) => source.list_single_table(name, request.object_db_path.as_deref()).await?,
            None => source.list_namespaces_and_tables().await?,
        };

        let mut schema_diffs = Vec::new();

        for (ns_str, tables) in &source_tables {
            let ns = NamespaceName::from_string(ns_str.clone());
            let source_fields = source.describe(ns_str, tables).await?;
            let mut source_snapshot: SchemaSnapshot = BTreeMap::new();
            for row in source_fields {
                source_snapshot
                    .entry(row.table.clone())
                    .or_default()
                    .insert(row.field, row.system_type);
            }
            for table in tables {
                source_snapshot.entry(table.clone()).or_default();
            }

            let graph_tables = match &request.object_name {
                Some(name) => self.graph_store.list_single_table(&ns, name).await?,
                None => self.graph_store.list_tables(&ns).await?,
            };
            let graph_fields = self.graph_store.describe(&ns, &graph_tables).await?;
            let mut graph_snapshot: SchemaSnapshot = BTreeMap::new();
            for row in graph_fields {
                graph_snapshot
                    .entry(row.table.clone())
                    .or_default()
                    .insert(row.field, row.system_type);
            }
            for table in &graph_tables {
                graph_snapshot.entry(table.clone()).or_default();
            }

            // `db` on a table diff is the table's own qualified path
            // (`schema.table_name`), not the namespace it was diffed under.
            let schema_part = ns_str.rsplit_once('.').map(|(_, s)| s).unwrap_or(ns_str.as_str());
            let mut tables_diff = diff_schema(&source_snapshot, &graph_snapshot);
            for t in &mut tables_diff {
                t.db = format!("{schema_part}.{}", t.name());
            }

            schema_diffs.push(SchemaDiff {
                name: ns_str.clone(),
                tables: tables_diff,
            });
        }

        let now = Utc::now();
        let migration = Migration {
            guid: Uuid::new_v4(),
            name: request.name.clone(),
            db_source: request.source_name.clone(),
            prev_migration: None,
            created_at: now,
            updated_at: now,
            schemas: schema_diffs,
        };
        let count = migration.table_count();
        self.migration_store.save(&migration).await?;

        // Reload the just-persisted migration so the Formatter/Applier work
        // from the audit record, not from transient in-memory diffs.
        let persisted = self.migration_store.load(migration.guid).await?;

        let mut schema_outs = Vec::with_capacity(persisted.schemas.len());
        let applier = crate::apply::Applier::new(self.graph_store.as_ref() as &dyn GraphStore);
        for schema in &persisted.schemas {
            let ns = NamespaceName::from_string(schema.name.clone());
            let plan = classify_schema(schema, &patterns);
            applier.apply(&ns, &plan, &patterns).await?;

            schema_outs.push(SchemaOut {
                name: schema.name.clone(),
                tables_to_create: schema
                    .tables
                    .iter()
                    .filter(|t| t.is_create())
                    .map(|t| t.name().to_string())
                    .collect(),
                tables_to_alter: schema
                    .tables
                    .iter()
                    .filter(|t| t.is_alter())
                    .map(|t| t.name().to_string())
                    .collect(),
                tables_to_delete: plan.tables_to_delete.clone(),
            });
        }

        Ok((
            count,
            MigrationOut {
                name: persisted.name,
                schemas: schema_outs,
            },
        ))
    }
}
