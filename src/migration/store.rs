use deadpool_postgres::{Client, Pool};
use tokio_postgres::GenericClient;
use uuid::Uuid;

use super::model::{FieldDiff, Migration, SchemaDiff, TableDiff};
use crate::error::{ClientError, Error};
use crate::metadata::SystemType;

/// Creates the four audit tables if they do not already exist: a straight
/// relational mirror of the Migration/Schema/Table/Field object graph.
pub async fn setup_migration_tables(client: &Client) -> Result<(), Error> {
    client
        .batch_execute(
            "CREATE TABLE IF NOT EXISTS migrations (
                id BIGSERIAL PRIMARY KEY,
                parent_id BIGINT REFERENCES migrations(id),
                guid UUID UNIQUE NOT NULL,
                name TEXT NOT NULL,
                db_source TEXT NOT NULL,
                created_at TIMESTAMPTZ NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            );
            CREATE TABLE IF NOT EXISTS schemas (
                id BIGSERIAL PRIMARY KEY,
                migration_id BIGINT NOT NULL REFERENCES migrations(id),
                name TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS tables (
                id BIGSERIAL PRIMARY KEY,
                schema_id BIGINT NOT NULL REFERENCES schemas(id),
                old_name TEXT,
                new_name TEXT,
                db TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS fields (
                id BIGSERIAL PRIMARY KEY,
                table_id BIGINT NOT NULL REFERENCES tables(id),
                old_name TEXT,
                new_name TEXT,
                old_type TEXT,
                new_type TEXT,
                is_key BOOLEAN NOT NULL DEFAULT false
            );
            CREATE INDEX IF NOT EXISTS migrations_db_source_idx ON migrations (db_source, created_at);",
        )
        .await?;
    Ok(())
}

/// Persists the audit store and reloads it for the apply/format path.
pub struct MigrationStore {
    pool: Pool,
}

impl MigrationStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn client(&self) -> Result<Client, Error> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::Internal(format!("audit store pool error: {e}")))
    }

    /// Finds the most recently created migration for `db_source`, used to
    /// chain `prev_migration`. Generic over `GenericClient` so it can run
    /// against either a plain `Client` or an open `Transaction`.
    async fn last_migration_id(
        &self,
        client: &impl GenericClient,
        db_source: &str,
    ) -> Result<Option<i64>, Error> {
        let row = client
            .query_opt(
                "SELECT id FROM migrations WHERE db_source = $1 ORDER BY created_at DESC LIMIT 1",
                &[&db_source],
            )
            .await?;
        Ok(row.map(|r| r.get(0)))
    }

    /// Persists the full migration tree in one transaction: either it all
    /// commits, or none of it does.
    pub async fn save(&self, migration: &Migration) -> Result<i64, Error> {
        let mut client = self.client().await?;
        let txn = client.transaction().await?;

        let parent_id = self.last_migration_id(&txn, &migration.db_source).await?;

        let row = txn
            .query_one(
                "INSERT INTO migrations (parent_id, guid, name, db_source, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
                &[
                    &parent_id,
                    &migration.guid,
                    &migration.name,
                    &migration.db_source,
                    &migration.created_at,
                    &migration.updated_at,
                ],
            )
            .await?;
        let migration_id: i64 = row.get(0);

        for schema in &migration.schemas {
            let row = txn
                .query_one(
                    "INSERT INTO schemas (migration_id, name) VALUES ($1, $2) RETURNING id",
                    &[&migration_id, &schema.name],
                )
                .await?;
            let schema_id: i64 = row.get(0);
            self.save_tables(&txn, schema_id, &schema.tables).await?;
        }

        txn.commit().await?;
        Ok(migration_id)
    }

    async fn save_tables(
        &self,
        txn: &deadpool_postgres::Transaction<'_>,
        schema_id: i64,
        tables: &[TableDiff],
    ) -> Result<(), Error> {
        for table in tables {
            let row = txn
                .query_one(
                    "INSERT INTO tables (schema_id, old_name, new_name, db) \
                     VALUES ($1, $2, $3, $4) RETURNING id",
                    &[&schema_id, &table.old_name, &table.new_name, &table.db],
                )
                .await?;
            let table_id: i64 = row.get(0);
            for field in &table.fields {
                txn.execute(
                    "INSERT INTO fields (table_id, old_name, new_name, old_type, new_type, is_key) \
                     VALUES ($1, $2, $3, $4, $5, $6)",
                    &[
                        &table_id,
                        &field.old_name,
                        &field.new_name,
                        &field.old_type.map(|t| t.as_str()),
                        &field.new_type.map(|t| t.as_str()),
                        &field.is_key,
                    ],
                )
                .await?;
            }
        }
        Ok(())
    }

    /// Eagerly loads the full tree (schemas -> tables -> fields), batching
    /// each level with a single `WHERE id = ANY($1)` round-trip rather than
    /// one query per row.
    pub async fn load(&self, guid: Uuid) -> Result<Migration, Error> {
        let client = self.client().await?;
        let row = client
            .query_opt(
                "SELECT id, guid, name, db_source, parent_id, created_at, updated_at \
                 FROM migrations WHERE guid = $1",
                &[&guid],
            )
            .await?
            .ok_or_else(|| ClientError::MigrationNotFound(guid.to_string()))?;

        let migration_id: i64 = row.get(0);
        let parent_id: Option<i64> = row.get(4);
        let prev_migration = match parent_id {
            Some(id) => {
                let r = client
                    .query_opt("SELECT guid FROM migrations WHERE id = $1", &[&id])
                    .await?;
                r.map(|r| r.get(0))
            }
            None => None,
        };

        let schema_rows = client
            .query(
                "SELECT id, name FROM schemas WHERE migration_id = $1 ORDER BY id",
                &[&migration_id],
            )
            .await?;
        let schema_ids: Vec<i64> = schema_rows.iter().map(|r| r.get(0)).collect();

        let table_rows = if schema_ids.is_empty() {
            Vec::new()
        } else {
            client
                .query(
                    "SELECT id, schema_id, old_name, new_name, db FROM tables \
                     WHERE schema_id = ANY($1) ORDER BY id",
                    &[&schema_ids],
                )
                .await?
        };
        let table_ids: Vec<i64> = table_rows.iter().map(|r| r.get(0)).collect();

        let field_rows = if table_ids.is_empty() {
            Vec::new()
        } else {
            client
                .query(
                    "SELECT table_id, old_name, new_name, old_type, new_type, is_key FROM fields \
                     WHERE table_id = ANY($1) ORDER BY id",
                    &[&table_ids],
                )
                .await?
        };

        let mut schemas = Vec::with_capacity(schema_rows.len());
        for schema_row in &schema_rows {
            let schema_id: i64 = schema_row.get(0);
            let mut tables = Vec::new();
            for table_row in table_rows.iter().filter(|t| t.get::<_, i64>(1) == schema_id) {
                let table_id: i64 = table_row.get(0);
                let mut fields = Vec::new();
                for field_row in field_rows.iter().filter(|f| f.get::<_, i64>(0) == table_id) {
                    fields.push(FieldDiff {
                        old_name: field_row.get(1),
                        new_name: field_row.get(2),
                        old_type: field_row
                            .get::<_, Option<String>>(3)
                            .and_then(|s| parse_system_type(&s)),
                        new_type: field_row
                            .get::<_, Option<String>>(4)
                            .and_then(|s| parse_system_type(&s)),
                        is_key: field_row.get(5),
                    });
                }
                tables.push(TableDiff {
                    old_name: table_row.get(2),
                    new_name: table_row.get(3),
                    db: table_row.get(4),
                    fields,
                });
            }
            schemas.push(SchemaDiff {
                name: schema_row.get(1),
                tables,
            });
        }

        Ok(Migration {
            guid,
            name: row.get(2),
            db_source: row.get(3),
            prev_migration,
            created_at: row.get(5),
            updated_at: row.get(6),
            schemas,
        })
    }

    /// Returns the most recently saved migration, if any exist at all.
    pub async fn load_latest(&self) -> Result<Migration, Error> {
        let client = self.client().await?;
        let row = client
            .query_opt("SELECT guid FROM migrations ORDER BY created_at DESC LIMIT 1", &[])
            .await?
            .ok_or_else(|| ClientError::MigrationNotFound("<none>".to_string()))?;
        self.load(row.get(0)).await
    }
}

fn parse_system_type(s: &str) -> Option<SystemType> {
    match s {
        "bool" => Some(SystemType::Bool),
        "str" => Some(SystemType::Str),
        "int" => Some(SystemType::Int),
        "float" => Some(SystemType::Float),
        "date" => Some(SystemType::Date),
        "datetime" => Some(SystemType::Datetime),
        "json" => Some(SystemType::Json),
        "xml" => Some(SystemType::Xml),
        "list" => Some(SystemType::List),
        "b64binary" => Some(SystemType::B64Binary),
        _ => Some(SystemType::Unspecified),
    }
}
