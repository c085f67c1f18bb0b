use std::collections::HashMap;
use std::net::SocketAddr;

use clap::Parser;

/// Synchronizes a relational source schema into a Data Vault property graph.
#[derive(Debug, Parser)]
#[command(name = "graph-schema-migrater")]
#[command(about = "Data Vault graph schema migrater", long_about = None)]
pub struct Config {
    /// The address and port the HTTP surface listens to.
    #[clap(long, env = "DWH_GRAPH_DB_MIGRATER_LISTEN_ADDR", default_value = "0.0.0.0:8081")]
    pub listen_addr: SocketAddr,

    /// Enable verbose logging.
    #[clap(long, env = "DWH_GRAPH_DB_MIGRATER_DEBUG", default_value_t = false)]
    pub debug: bool,

    /// Connection string for the audit store (Postgres) that persists migration records.
    #[clap(long, env = "DWH_GRAPH_DB_MIGRATER_DB_CONNECTION_STRING")]
    pub db_connection_string: String,

    /// Connection string for the Apache AGE graph store.
    #[clap(long, env = "DWH_GRAPH_DB_MIGRATER_AGE_CONNECTION_STRING")]
    pub age_connection_string: String,

    /// Connection string for the AMQP message broker.
    #[clap(long, env = "DWH_GRAPH_DB_MIGRATER_MQ_CONNECTION_STRING")]
    pub mq_connection_string: String,

    /// Name of the direct exchange migration requests/results are routed through.
    #[clap(long, env = "DWH_GRAPH_DB_MIGRATER_MIGRATION_EXCHANGE", default_value = "migrations")]
    pub migration_exchange: String,

    /// Queue bound to the exchange with routing key `task`.
    #[clap(long, env = "DWH_GRAPH_DB_MIGRATER_MIGRATION_REQUEST_QUEUE", default_value = "migration_task")]
    pub migration_request_queue: String,

    /// Queue bound to the exchange with routing key `result`.
    #[clap(long, env = "DWH_GRAPH_DB_MIGRATER_MIGRATIONS_RESULT_QUEUE", default_value = "migration_result")]
    pub migrations_result_queue: String,

    /// Opaque identity-and-access-management token checked by the auth seam.
    #[clap(long, env = "DWH_GRAPH_DB_MIGRATER_API_IAM", default_value = "")]
    pub api_iam: String,

    /// `name -> connection string` table used when a request omits its own `conn_string`.
    #[clap(skip)]
    pub db_sources: HashMap<String, String>,
}

impl Config {
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "graph_schema_migrator=debug,tower_http=debug"
        } else {
            "graph_schema_migrator=info,tower_http=info"
        }
    }
}
