use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use lostfound_domain::DomainResult;
use lostfound_domain::ports::BoxFuture;
use lostfound_domain::ports::users::UserDirectory;
use serde_json::Value;
use surrealdb::{Surreal, engine::remote::ws::Client};
use tokio::sync::RwLock;

use super::rows::{decode_count, invalid_result, map_surreal_error};
use crate::db::with_store_timeout;

/// User ids known to this process. Accounts are owned elsewhere, so the set
/// is seeded from configuration or by tests.
pub struct InMemoryUserDirectory {
    user_ids: Arc<RwLock<HashSet<String>>>,
}

impl InMemoryUserDirectory {
    pub fn seeded<I, S>(user_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user_ids: Arc::new(RwLock::new(user_ids.into_iter().map(Into::into).collect())),
        }
    }

    pub async fn insert(&self, user_id: impl Into<String>) {
        self.user_ids.write().await.insert(user_id.into());
    }
}

impl UserDirectory for InMemoryUserDirectory {
    fn exists(&self, user_id: &str) -> BoxFuture<'_, DomainResult<bool>> {
        let user_id = user_id.to_string();
        let user_ids = self.user_ids.clone();
        Box::pin(async move { Ok(user_ids.read().await.contains(&user_id)) })
    }
}

/// Looks users up in the shared `user` table.
#[derive(Clone)]
pub struct SurrealUserDirectory {
    client: Arc<Surreal<Client>>,
    store_timeout: Duration,
}

impl SurrealUserDirectory {
    pub fn with_client(client: Arc<Surreal<Client>>, store_timeout: Duration) -> Self {
        Self {
            client,
            store_timeout,
        }
    }
}

impl UserDirectory for SurrealUserDirectory {
    fn exists(&self, user_id: &str) -> BoxFuture<'_, DomainResult<bool>> {
        let user_id = user_id.to_string();
        Box::pin(with_store_timeout(self.store_timeout, "user lookup", async move {
            let mut response = self
                .client
                .query("SELECT count() AS total FROM user WHERE user_id = $user_id GROUP ALL")
                .bind(("user_id", user_id))
                .await
                .map_err(map_surreal_error)?;
            let rows: Vec<Value> = response.take(0).map_err(invalid_result)?;
            Ok(decode_count(rows, "total")? > 0)
        }))
    }
}
