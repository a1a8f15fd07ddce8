//! Catalog database administration over a Postgres connection.

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, warn};

use super::{CatalogAdmin, CatalogAdminSession};
use crate::config::PostgresDescriptor;
use crate::error::AssessError;
use crate::plan::sql::quote_ident;

/// Database every Postgres server has, used for administration.
const ADMIN_DATABASE: &str = "postgres";

/// [`CatalogAdmin`] connecting to the server's administrative database.
pub struct PostgresCatalogAdmin {
    config: tokio_postgres::Config,
    address: String,
}

impl PostgresCatalogAdmin {
    pub fn new(catalog: &PostgresDescriptor) -> Result<Self, AssessError> {
        let address = catalog.address();
        let mut config: tokio_postgres::Config = catalog
            .connection_string(ADMIN_DATABASE)
            .expose()
            .parse()
            .map_err(|e| AssessError::CatalogConnect {
                address: address.clone(),
                source: Box::new(e),
            })?;
        config.application_name("floe");

        Ok(Self { config, address })
    }
}

#[async_trait]
impl CatalogAdmin for PostgresCatalogAdmin {
    async fn connect(&self) -> Result<Box<dyn CatalogAdminSession>, AssessError> {
        let (client, connection) =
            self.config
                .connect(NoTls)
                .await
                .map_err(|e| AssessError::CatalogConnect {
                    address: self.address.clone(),
                    source: Box::new(e),
                })?;

        let address = self.address.clone();
        let connection = tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!(%address, "Catalog admin connection error: {}", e);
            }
        });

        debug!(address = %self.address, "Connected to catalog admin database");
        Ok(Box::new(PostgresAdminSession { client, connection }))
    }
}

/// Statements run outside any transaction, so `CREATE DATABASE` is allowed.
struct PostgresAdminSession {
    client: Client,
    connection: JoinHandle<()>,
}

impl Drop for PostgresAdminSession {
    fn drop(&mut self) {
        self.connection.abort();
    }
}

fn failed(database: &str, source: tokio_postgres::Error) -> AssessError {
    AssessError::CatalogDatabase {
        database: database.to_string(),
        source: Box::new(source),
    }
}

#[async_trait]
impl CatalogAdminSession for PostgresAdminSession {
    async fn database_exists(&self, database: &str) -> Result<bool, AssessError> {
        let row = self
            .client
            .query_opt("SELECT 1 FROM pg_database WHERE datname = $1", &[&database])
            .await
            .map_err(|e| failed(database, e))?;
        Ok(row.is_some())
    }

    async fn create_database(&self, database: &str) -> Result<(), AssessError> {
        self.client
            .batch_execute(&format!("CREATE DATABASE {}", quote_ident(database)))
            .await
            .map_err(|e| failed(database, e))
    }
}
