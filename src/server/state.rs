use std::sync::Arc;
use std::time::Duration;

use crate::auth::{CredentialStore, DigestAuth};
use crate::config::Config;
use crate::error::Result;
use crate::pool::BufferPool;
use crate::service::ServiceDispatcher;

/// Everything connections share, built once at startup and handed to every
/// connection task behind an `Arc`.
#[derive(Debug)]
pub struct AppState {
    pub config: Config,
    /// `None` when authentication is disabled
    pub auth: Option<DigestAuth>,
    pub dispatcher: ServiceDispatcher,
    pub pool: BufferPool,
}

impl AppState {
    /// Builds the shared state and allocates the buffer pool.
    pub fn new(config: Config) -> Result<Self> {
        let auth = config.auth.enabled.then(|| {
            let credentials = Arc::new(CredentialStore::new(config.auth.users.clone()));
            DigestAuth::new(
                config.auth.realm.clone(),
                Duration::from_secs(config.auth.nonce_validity_secs),
                credentials,
            )
            .with_basic(config.auth.allow_basic)
        });

        let pool = BufferPool::new(config.buffer_pool.buffers, config.buffer_pool.buffer_size);
        pool.init()?;

        Ok(Self {
            config,
            auth,
            dispatcher: ServiceDispatcher::new(),
            pool,
        })
    }

    /// Unregisters every service and frees the buffer pool.
    pub fn shutdown(&self) {
        self.dispatcher.shutdown();
        self.pool.cleanup();
    }
}
