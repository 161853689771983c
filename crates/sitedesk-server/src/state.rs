use std::sync::{Arc, Mutex};

use sitedesk_core::config::Config;
use sitedesk_core::session::{CodeSender, LogSender};
use sitedesk_core::Store;

use crate::error::AppError;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<Store>>,
    pub config: Arc<Config>,
    pub sender: Arc<dyn CodeSender>,
}

impl AppState {
    pub fn new(store: Store, config: Config) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            config: Arc::new(config),
            sender: Arc::new(LogSender),
        }
    }

    /// Replace the code sender (tests capture codes instead of logging them).
    pub fn with_sender(mut self, sender: Arc<dyn CodeSender>) -> Self {
        self.sender = sender;
        self
    }

    /// Run `f` against the store on the blocking pool.
    pub async fn with_store<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut Store) -> sitedesk_core::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = self.store.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = store
                .lock()
                .map_err(|_| anyhow::anyhow!("store lock poisoned"))?;
            f(&mut *guard).map_err(anyhow::Error::from)
        })
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn with_store_returns_closure_result() {
        let state = AppState::new(Store::open_in_memory().unwrap(), Config::default());
        let version = state.with_store(|store| store.version()).await.unwrap();
        assert_eq!(version, sitedesk_core::db::schema_version());
    }
}
