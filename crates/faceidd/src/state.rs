use std::sync::Arc;

use faceid_core::EuclideanMatcher;
use faceid_store::{DescriptorCipher, Store};

use crate::auth::SessionKeys;
use crate::config::Config;

/// Shared state handed to every request handler.
pub struct AppState {
    pub store: Store,
    pub sessions: SessionKeys,
    pub matcher: EuclideanMatcher,
    pub google_auth_enabled: bool,
}

impl AppState {
    /// Open the database and derive keys from `config`.
    pub async fn from_config(config: &Config) -> anyhow::Result<Arc<Self>> {
        let cipher = config
            .descriptor_key
            .as_deref()
            .map(DescriptorCipher::from_secret);
        if cipher.is_none() {
            tracing::warn!("FACEID_DESCRIPTOR_KEY not set; descriptors are stored unencrypted");
        }
        let store = Store::open(&config.db_path, cipher).await?;
        tracing::info!(path = %store.path().display(), "database opened");
        Ok(Arc::new(Self::new(store, config)))
    }

    pub fn new(store: Store, config: &Config) -> Self {
        Self {
            store,
            sessions: SessionKeys::new(
                &config.token_secret,
                config.token_ttl_days,
                config.production,
            ),
            matcher: EuclideanMatcher {
                threshold: config.match_threshold,
            },
            google_auth_enabled: config.google_auth_enabled,
        }
    }
}
