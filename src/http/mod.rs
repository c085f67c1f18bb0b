use std::sync::Arc;

use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use uuid::Uuid;

use crate::error::{ClientError, Error};
use crate::migration::MigrationStore;
use crate::mq::envelope::{MigrationOut, SchemaOut};

#[derive(Clone)]
pub struct AppState {
    pub migration_store: Arc<MigrationStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/migrations/", get(latest_migration))
        .route("/migrations/:guid", get(migration_by_guid))
        .with_state(state)
}

async fn ping() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn migration_by_guid(
    State(state): State<AppState>,
    Path(guid): Path<String>,
) -> Result<Json<MigrationOut>, Error> {
    let guid = Uuid::parse_str(&guid)
        .map_err(|_| ClientError::InvalidMigrationRequest(format!("not a guid: {guid}")))?;
    let migration = state.migration_store.load(guid).await?;
    Ok(Json(to_migration_out(migration)))
}

async fn latest_migration(State(state): State<AppState>) -> Result<Json<MigrationOut>, Error> {
    let migration = state.migration_store.load_latest().await?;
    Ok(Json(to_migration_out(migration)))
}

fn to_migration_out(migration: crate::migration::Migration) -> MigrationOut {
    MigrationOut {
        name: migration.name,
        schemas: migration
            .schemas
            .into_iter()
            .map(|s| SchemaOut {
                name: s.name,
                tables_to_create: s
                    .tables
                    .iter()
                    .filter(|t| t.is_create())
                    .map(|t| t.name().to_string())
                    .collect(),
                tables_to_alter: s
                    .tables
                    .iter()
                    .filter(|t| t.is_alter())
                    .map(|t| t.name().to_string())
                    .collect(),
                tables_to_delete: s
                    .tables
                    .iter()
                    .filter(|t| t.is_delete())
                    .map(|t| t.name().to_string())
                    .collect(),
            })
            .collect(),
    }
}
