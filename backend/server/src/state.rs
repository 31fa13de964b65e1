use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use super::{
    auth::{Passwords, TokenKeys},
    config::Config,
    database::init_postgres,
    mail::Mailer,
    store::{PgStore, Store},
};

pub struct State {
    pub config: Config,
    pub store: Arc<dyn Store>,
    pub tokens: TokenKeys,
    pub passwords: Passwords,
    pub mailer: Option<Mailer>,
}

impl State {
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let pool = init_postgres(&config.database_url).await?;
        let store = PgStore::new(pool);

        if config.auto_migrate {
            info!("Running migrations...");
            store.migrate().await?;
        }

        Self::with_store(config, Arc::new(store))
    }

    pub fn with_store(config: Config, store: Arc<dyn Store>) -> Result<Arc<Self>> {
        let mailer = match config.mail.as_ref().map(Mailer::new).transpose() {
            Ok(mailer) => mailer,
            Err(e) => {
                warn!("Mail disabled: {e:#}");
                None
            }
        };

        Ok(Arc::new(Self {
            tokens: TokenKeys::new(&config.jwt_secret, config.jwt_expires_in),
            passwords: Passwords::new(config.password_memory_kib)?,
            mailer,
            store,
            config,
        }))
    }

    pub fn link(&self, path: &str) -> String {
        format!("{}{path}", self.config.frontend_url)
    }
}
