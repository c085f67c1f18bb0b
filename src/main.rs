use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::NoTls;
use tracing_subscriber::EnvFilter;

use graph_schema_migrator::graph::store::AgeGraphStore;
use graph_schema_migrator::http::{self, AppState};
use graph_schema_migrator::migration::store::setup_migration_tables;
use graph_schema_migrator::migration::MigrationStore;
use graph_schema_migrator::mq::Lifecycle;
use graph_schema_migrator::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Arc::new(Config::parse());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.log_filter()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let pg_config: tokio_postgres::Config = config.db_connection_string.parse()?;
    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };
    let manager = Manager::from_config(pg_config, NoTls, mgr_config);
    let audit_pool = Pool::builder(manager).max_size(8).build()?;

    {
        let client = audit_pool.get().await?;
        setup_migration_tables(&client).await?;
    }

    let migration_store = Arc::new(MigrationStore::new(audit_pool));
    let graph_store = Arc::new(AgeGraphStore::connect(&config.age_connection_string)?);

    let lifecycle = Lifecycle::new(config.clone(), migration_store.clone(), graph_store.clone());

    let app_state = AppState {
        migration_store: migration_store.clone(),
    };
    let app = http::router(app_state).layer(tower_http::trace::TraceLayer::new_for_http());
    let listen_addr = config.listen_addr;

    tracing::info!(%listen_addr, "starting graph-schema-migrater");

    let http_server = axum::Server::bind(&listen_addr).serve(app.into_make_service());

    tokio::select! {
        res = http_server => {
            if let Err(e) = res {
                tracing::error!("http server exited: {e}");
            }
        }
        res = lifecycle.run() => {
            if let Err(e) = res {
                tracing::error!("migration lifecycle exited: {e}");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
    }

    Ok(())
}
