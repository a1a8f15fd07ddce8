//! Statements that register secrets and mount endpoints in the engine.
//!
//! Every builder validates its input and returns a [`PlanError`] instead of
//! emitting a broken statement. [`Statement::soft`] turns that error into a
//! harmless no-op so the attach sequence can carry on with other endpoints.
//!
//! Credentials only ever appear in `CREATE SECRET` statements, which are
//! built as [`SecretStatement`] and never formatted in plaintext. Attach
//! statements reference secrets by name, so they are safe to log.

pub mod sql;

use floe_core::config::is_identifier;
use floe_core::{Secret, SourceKey};
use snafu::prelude::*;
use tracing::error;

use crate::config::{CatalogEndpoint, PostgresDescriptor, StorageDescriptor, StorageEndpoint};
use crate::error::{InvalidIdentifierSnafu, MissingFieldSnafu, PlanError};
use sql::quote_literal;

/// Statement executed in place of one that could not be built.
pub const NOOP: &str = "SELECT 1";

const REDACTED: &str = "[REDACTED]";

/// A `CREATE SECRET` statement and the credentials embedded in it.
#[derive(Debug, Clone)]
pub struct SecretStatement {
    name: String,
    sql: Secret,
    credentials: Vec<Secret>,
}

impl SecretStatement {
    fn new(name: &str, sql: String, credentials: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            sql: Secret::new(sql),
            credentials: credentials.iter().map(|c| Secret::new(*c)).collect(),
        }
    }

    /// Name the secret is registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sql(&self) -> &Secret {
        &self.sql
    }

    /// Replace every embedded credential in `text`, quoted or not.
    ///
    /// Engine errors may echo the statement they failed on.
    pub fn redact(&self, text: &str) -> String {
        let mut text = text.to_string();
        for credential in self.credentials.iter().filter(|c| !c.is_empty()) {
            let escaped = credential.expose().replace('\'', "''");
            text = text.replace(&escaped, REDACTED);
            text = text.replace(credential.expose(), REDACTED);
        }
        text
    }
}

/// A planned statement, or the reason it was replaced with [`NOOP`].
#[derive(Debug)]
pub enum Statement {
    Ready(String),
    Secret(SecretStatement),
    Fallback { alias: String, reason: PlanError },
}

impl From<String> for Statement {
    fn from(sql: String) -> Self {
        Statement::Ready(sql)
    }
}

impl From<SecretStatement> for Statement {
    fn from(secret: SecretStatement) -> Self {
        Statement::Secret(secret)
    }
}

impl Statement {
    /// Accept a planning result, logging and falling back on failure.
    pub fn soft<S: Into<Statement>>(alias: &SourceKey, planned: Result<S, PlanError>) -> Self {
        match planned {
            Ok(statement) => statement.into(),
            Err(reason) => {
                error!(%alias, error = %reason, "Cannot build statement, skipping endpoint");
                Statement::Fallback {
                    alias: alias.to_string(),
                    reason,
                }
            }
        }
    }
}

fn identifier(name: &str) -> Result<&str, PlanError> {
    ensure!(is_identifier(name), InvalidIdentifierSnafu { alias: name });
    Ok(name)
}

fn present<'a>(alias: &str, field: &'static str, value: &'a str) -> Result<&'a str, PlanError> {
    ensure!(!value.is_empty(), MissingFieldSnafu { alias, field });
    Ok(value)
}

/// `CREATE SECRET` for an S3-compatible store, scoped to its bucket.
pub fn storage_secret(name: &str, storage: &StorageDescriptor) -> Result<SecretStatement, PlanError> {
    let name = identifier(name)?;
    let key_id = present(name, "access_key", storage.access_key.expose())?;
    let secret = present(name, "secret", storage.secret.expose())?;
    present(name, "scope", storage.bucket())?;

    let sql = format!(
        "CREATE OR REPLACE SECRET {name} (TYPE s3, KEY_ID {}, SECRET {}, ENDPOINT {}, REGION {}, SCOPE {}, USE_SSL {}, URL_STYLE {})",
        quote_literal(key_id),
        quote_literal(secret),
        quote_literal(&storage.endpoint()),
        quote_literal(&storage.region),
        quote_literal(&storage.scope_url()),
        storage.secure,
        quote_literal(storage.url_style.as_str()),
    );
    Ok(SecretStatement::new(name, sql, &[key_id, secret]))
}

/// `CREATE SECRET` holding Postgres credentials.
pub fn postgres_secret(name: &str, postgres: &PostgresDescriptor) -> Result<SecretStatement, PlanError> {
    let name = identifier(name)?;
    let user = present(name, "username", postgres.username.expose())?;
    let database = present(name, "database", &postgres.database)?;
    let password = postgres.password.expose();

    let sql = format!(
        "CREATE OR REPLACE SECRET {name} (TYPE postgres, HOST {}, PORT {}, DATABASE {}, USER {}, PASSWORD {})",
        quote_literal(&postgres.host),
        postgres.port,
        quote_literal(database),
        quote_literal(user),
        quote_literal(password),
    );
    Ok(SecretStatement::new(name, sql, &[user, password]))
}

/// Mount a Postgres database under `alias` using the secret `{alias}_secret`.
pub fn postgres_attach(alias: &SourceKey, postgres: &PostgresDescriptor) -> Result<String, PlanError> {
    let name = identifier(alias.id())?;
    let database = present(name, "database", &postgres.database)?;

    Ok(format!(
        "ATTACH IF NOT EXISTS {} AS {name} (TYPE postgres, SECRET {})",
        quote_literal(&format!("dbname={database}")),
        alias.secret_name(Some("secret")),
    ))
}

/// Mount the lake catalog with its data files under the destination scope.
pub fn catalog_attach(catalog: &CatalogEndpoint, storage: &StorageEndpoint) -> Result<String, PlanError> {
    let name = identifier(catalog.alias.id())?;
    let database = present(name, "database", &catalog.connection.database)?;
    present(name, "scope", storage.connection.bucket())?;

    Ok(format!(
        "ATTACH IF NOT EXISTS {} AS {name} (DATA_PATH {}, METADATA_PARAMETERS MAP {{'TYPE': 'postgres', 'SECRET': {}}})",
        quote_literal(&format!("ducklake:postgres:dbname={database}")),
        quote_literal(&format!("{}/", storage.connection.scope_url())),
        quote_literal(&catalog.secret_name()),
    ))
}

/// Install and load an extension.
pub fn install_extension(extension: &str) -> Result<String, PlanError> {
    let extension = identifier(extension)?;
    Ok(format!("INSTALL {extension}; LOAD {extension};"))
}

/// Make `alias` the default database.
pub fn use_database(alias: &SourceKey) -> Result<String, PlanError> {
    Ok(format!("USE {}", identifier(alias.id())?))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> StorageDescriptor {
        serde_yaml::from_str("{host: minio, port: 9000, access_key: AK, secret: \"s'k\", scope: bucket1}")
            .unwrap()
    }

    fn postgres() -> PostgresDescriptor {
        serde_yaml::from_str("{host: pg, username: reader, password: pw, database: orders}").unwrap()
    }

    #[test]
    fn test_storage_secret() {
        let secret = storage_secret("s3a_secret", &storage()).unwrap();
        assert_eq!(secret.name(), "s3a_secret");
        assert_eq!(
            secret.sql().expose(),
            "CREATE OR REPLACE SECRET s3a_secret (TYPE s3, KEY_ID 'AK', SECRET 's''k', \
             ENDPOINT 'minio:9000', REGION 'us-east-1', SCOPE 's3://bucket1', USE_SSL false, URL_STYLE 'path')"
        );
    }

    #[test]
    fn test_storage_secret_requires_credentials() {
        let mut s = storage();
        s.access_key = "".into();
        let err = storage_secret("s3a_secret", &s).unwrap_err();
        assert!(matches!(err, PlanError::MissingField { field: "access_key", .. }));
    }

    #[test]
    fn test_postgres_secret_and_attach() {
        let secret = postgres_secret("pgsrc_secret", &postgres()).unwrap();
        assert_eq!(
            secret.sql().expose(),
            "CREATE OR REPLACE SECRET pgsrc_secret (TYPE postgres, HOST 'pg', PORT 5432, \
             DATABASE 'orders', USER 'reader', PASSWORD 'pw')"
        );

        let attach = postgres_attach(&SourceKey::new("pgsrc"), &postgres()).unwrap();
        assert_eq!(
            attach,
            "ATTACH IF NOT EXISTS 'dbname=orders' AS pgsrc (TYPE postgres, SECRET pgsrc_secret)"
        );
    }

    #[test]
    fn test_catalog_attach_has_no_credentials() {
        let catalog: CatalogEndpoint = serde_yaml::from_str(
            "{alias: lake, host: pg, username: lake, password: topsecret, database: lake_catalog}",
        )
        .unwrap();
        let storage: StorageEndpoint = serde_yaml::from_str(
            "{alias: lake_files, access_key: AK, secret: SK, scope: lake}",
        )
        .unwrap();

        let sql = catalog_attach(&catalog, &storage).unwrap();
        assert_eq!(
            sql,
            "ATTACH IF NOT EXISTS 'ducklake:postgres:dbname=lake_catalog' AS lake \
             (DATA_PATH 's3://lake/', METADATA_PARAMETERS MAP {'TYPE': 'postgres', 'SECRET': 'lake_secret'})"
        );
        assert!(!sql.contains("topsecret"));
        assert!(!sql.contains("SK"));
    }

    #[test]
    fn test_invalid_alias_falls_back() {
        let alias = SourceKey::new("bad alias");
        let statement = Statement::soft(&alias, postgres_attach(&alias, &postgres()));

        assert!(matches!(statement, Statement::Fallback { .. }));
    }

    #[test]
    fn test_secret_statement_is_never_printed() {
        let secret = storage_secret("s3a_secret", &storage()).unwrap();
        let shown = format!("{secret:?} {:?}", Statement::from(secret.clone()));
        assert!(!shown.contains("s''k"));
        assert!(!shown.contains("KEY_ID"));
    }

    #[test]
    fn test_redact_removes_credentials() {
        let secret = storage_secret("s3a_secret", &storage()).unwrap();
        let echoed = format!("Parser Error: near line 1\n{}", secret.sql().expose());

        let redacted = secret.redact(&echoed);
        assert!(!redacted.contains("s''k"));
        assert!(!redacted.contains("'AK'"));
        assert!(redacted.contains("KEY_ID '[REDACTED]', SECRET '[REDACTED]'"));
        assert_eq!(secret.redact("no credentials here"), "no credentials here");
    }

    #[test]
    fn test_install_extension() {
        assert_eq!(install_extension("httpfs").unwrap(), "INSTALL httpfs; LOAD httpfs;");
        assert!(install_extension("httpfs; DROP").is_err());
    }

    #[test]
    fn test_use_database() {
        assert_eq!(use_database(&SourceKey::new("lake")).unwrap(), "USE lake");
    }
}
