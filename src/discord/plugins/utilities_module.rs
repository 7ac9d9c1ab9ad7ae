use crate::core::handlers::{Data, HandlerError};
use crate::core::plugins::PluginHooks;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::info;

/// Settings written by the hooks are global, not tied to a guild.
const GLOBAL_SCOPE: u64 = 0;

pub fn loaded_at_key(module: &str) -> String {
    format!("module:{module}:loaded_at")
}

/// Lifecycle hooks of the `utilities` module: remembers when it was loaded.
pub struct UtilitiesHooks;

#[async_trait]
impl PluginHooks for UtilitiesHooks {
    async fn init(&self, module: &str, data: &Data) -> Result<(), HandlerError> {
        if let Some(cache) = &data.cache {
            let now = json!(Utc::now().to_rfc3339());
            cache
                .set_setting(GLOBAL_SCOPE, &loaded_at_key(module), &now, None)
                .await?;
        }
        info!(module, "Module initialised");
        Ok(())
    }

    async fn destroy(&self, module: &str, data: &Data) -> Result<(), HandlerError> {
        if let Some(cache) = &data.cache {
            cache
                .set_setting(GLOBAL_SCOPE, &loaded_at_key(module), &json!(null), Some(0))
                .await?;
        }
        info!(module, "Module destroyed");
        Ok(())
    }
}
