//! ScyllaDB session handling

use crate::error::PersistenceError;
use crate::schema;
use scylla::{Session, SessionBuilder};
use std::sync::Arc;
use voice_webhook_config::PersistenceConfig;

/// Cluster and keyspace the analysis store lives in
#[derive(Debug, Clone)]
pub struct ScyllaConfig {
    pub hosts: Vec<String>,
    pub keyspace: String,
    pub replication_factor: u8,
}

impl From<&PersistenceConfig> for ScyllaConfig {
    fn from(config: &PersistenceConfig) -> Self {
        Self {
            hosts: config.scylla_hosts.clone(),
            keyspace: config.keyspace.clone(),
            replication_factor: config.replication_factor,
        }
    }
}

/// Shared session plus the keyspace it writes to
#[derive(Clone)]
pub struct ScyllaClient {
    session: Arc<Session>,
    config: ScyllaConfig,
}

impl ScyllaClient {
    pub async fn connect(config: ScyllaConfig) -> Result<Self, PersistenceError> {
        if config.hosts.is_empty() {
            return Err(PersistenceError::Connection(
                "no ScyllaDB hosts configured".to_string(),
            ));
        }
        tracing::info!(hosts = ?config.hosts, keyspace = %config.keyspace, "Connecting to ScyllaDB");

        let session = SessionBuilder::new().known_nodes(&config.hosts).build().await?;

        Ok(Self {
            session: Arc::new(session),
            config,
        })
    }

    /// Connect and create the keyspace and tables when missing
    pub async fn connect_with_schema(config: ScyllaConfig) -> Result<Self, PersistenceError> {
        let client = Self::connect(config).await?;
        schema::create_keyspace(
            &client.session,
            &client.config.keyspace,
            client.config.replication_factor,
        )
        .await?;
        schema::create_tables(&client.session, &client.config.keyspace).await?;
        tracing::info!(keyspace = %client.config.keyspace, "Schema ensured");
        Ok(client)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn keyspace(&self) -> &str {
        &self.config.keyspace
    }

    /// `keyspace.table`
    pub fn table(&self, name: &str) -> String {
        format!("{}.{}", self.config.keyspace, name)
    }

    /// Round trip to the coordinator
    pub async fn ping(&self) -> Result<(), PersistenceError> {
        self.session
            .query_unpaged("SELECT release_version FROM system.local", &[])
            .await
            .map(|_| ())
            .map_err(|e| PersistenceError::Unavailable(e.to_string()))
    }
}
