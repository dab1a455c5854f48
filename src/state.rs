use std::sync::Arc;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::store::{MemoryStore, PgStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store = match &config.database_url {
            Some(url) => {
                let db = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(url)
                    .await
                    .context("connect to database")?;
                let store = PgStore::new(db);
                if let Err(e) = store.migrate().await {
                    warn!(error = %e, "migration failed; continuing");
                }
                info!("using postgres store");
                Arc::new(store) as Arc<dyn Store>
            }
            None => {
                warn!("DATABASE_URL not set; data lives in memory and is lost on exit");
                Arc::new(MemoryStore::new()) as Arc<dyn Store>
            }
        };

        Ok(Self { store, config })
    }

    #[cfg(test)]
    pub fn in_memory() -> Self {
        let config = Arc::new(AppConfig {
            database_url: None,
            max_connections: 1,
            host: "127.0.0.1".into(),
            port: 0,
            admin_email: None,
            admin_password: None,
        });
        Self {
            store: Arc::new(MemoryStore::new()),
            config,
        }
    }
}
