use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use lostfound_domain::DomainResult;
use lostfound_domain::error::DomainError;
use surrealdb::{
    Surreal,
    engine::remote::ws::{Client, Ws},
    opt::auth::Root,
};
use tokio::time::timeout;

use crate::config::AppConfig;

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub endpoint: String,
    pub namespace: String,
    pub database: String,
    pub username: String,
    pub password: String,
    pub store_timeout: Duration,
}

impl DbConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            endpoint: config.surreal_endpoint.clone(),
            namespace: config.surreal_ns.clone(),
            database: config.surreal_db.clone(),
            username: config.surreal_user.clone(),
            password: config.surreal_pass.clone(),
            store_timeout: Duration::from_millis(config.store_timeout_ms.max(1)),
        }
    }
}

/// Tables every repository reads from. SurrealDB rejects reads against a
/// table that was never defined, so a fresh database gets them up front.
pub const SCHEMA: &str = "DEFINE TABLE IF NOT EXISTS lost_item SCHEMALESS; \
    DEFINE TABLE IF NOT EXISTS notification SCHEMALESS; \
    DEFINE TABLE IF NOT EXISTS user SCHEMALESS;";

/// Opens one shared client; every Surreal repository clones the `Arc`.
pub async fn connect(db_config: &DbConfig) -> anyhow::Result<Arc<Surreal<Client>>> {
    let db = Surreal::<Client>::init();
    db.connect::<Ws>(&db_config.endpoint).await?;
    db.signin(Root {
        username: db_config.username.clone(),
        password: db_config.password.clone(),
    })
    .await?;
    db.use_ns(&db_config.namespace)
        .use_db(&db_config.database)
        .await?;
    ensure_schema(&db).await?;
    tracing::info!(
        endpoint = %db_config.endpoint,
        namespace = %db_config.namespace,
        database = %db_config.database,
        "connected to surrealdb"
    );
    Ok(Arc::new(db))
}

pub async fn ensure_schema(db: &Surreal<Client>) -> anyhow::Result<()> {
    db.query(SCHEMA).await?.check()?;
    Ok(())
}

/// Bounds a store call. Expiry surfaces as `Unavailable`.
pub async fn with_store_timeout<T, F>(
    limit: Duration,
    operation: &'static str,
    future: F,
) -> DomainResult<T>
where
    F: Future<Output = DomainResult<T>>,
{
    match timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = limit.as_millis() as u64, "store call timed out");
            Err(DomainError::Unavailable(format!("{operation} timed out")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_defines_every_repository_table() {
        for table in ["lost_item", "notification", "user"] {
            assert!(
                SCHEMA.contains(&format!("DEFINE TABLE IF NOT EXISTS {table} SCHEMALESS;")),
                "{table} is not defined"
            );
        }
    }

    #[tokio::test]
    async fn store_timeout_maps_to_unavailable() {
        let result: DomainResult<()> =
            with_store_timeout(Duration::from_millis(5), "item lookup", async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(DomainError::Unavailable(message)) if message == "item lookup timed out"));
    }

    #[tokio::test]
    async fn store_timeout_passes_through_results() {
        let result = with_store_timeout(Duration::from_secs(1), "item lookup", async {
            Err::<(), _>(DomainError::NotFound("item not found".into()))
        })
        .await;
        assert!(matches!(result, Err(DomainError::NotFound(_))));
    }
}
