// Entry point of the bot.
//
// - `core/` = registries, dispatch, cooldowns, events, modules, storage ports
// - `infra/` = storage backends (SQLite cache, Supabase REST)
// - `discord/` = built-in actions and the serenity adapter
//
// This file wires them together and owns the process lifecycle.

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

mod app_config;

use crate::app_config::AppConfig;
use crate::core::client::{BotClient, GatewayConnection};
use crate::core::handlers::Data;
use crate::core::moderation::ModerationGateway;
use crate::core::storage::{CacheStore, DurableStore};
use crate::discord::builtin_catalog;
use crate::discord::gateway::{CommandScope, GatewayBridge, SerenityConnection, SerenityModeration};
use crate::infra::storage::{SqliteCacheStore, SupabaseStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Periodically purge expired cache rows, settings and sessions.
fn spawn_cache_cleanup(cache: Arc<SqliteCacheStore>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick fires immediately; skip it so startup stays quiet.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match cache.cleanup().await {
                Ok(report) if report.total() > 0 => info!(
                    cache = report.cache,
                    settings = report.settings,
                    sessions = report.sessions,
                    "Expired cache rows purged"
                ),
                Ok(_) => debug!("Cache cleanup found nothing to purge"),
                Err(e) => warn!(error = %e, "Cache cleanup failed"),
            }
        }
    });
}

async fn connect_durable(config: &AppConfig) -> Option<Arc<SupabaseStore>> {
    let supabase = config.supabase.as_ref()?;
    let store = match SupabaseStore::new(&supabase.url, &supabase.key) {
        Ok(store) => store,
        Err(e) => {
            warn!(error = %e, "Durable store misconfigured, continuing without it");
            return None;
        }
    };

    // An unreachable durable store is not fatal; handlers see it as disconnected.
    match store.connect().await {
        Ok(()) => match store.run_migrations(&supabase.migrations_dir).await {
            Ok(applied) if !applied.is_empty() => info!(?applied, "Durable migrations applied"),
            Ok(_) => debug!("Durable schema up to date"),
            Err(e) => warn!(error = %e, "Durable migrations failed"),
        },
        Err(e) => warn!(error = %e, "Durable store unreachable, continuing without it"),
    }
    Some(Arc::new(store))
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            std::process::exit(1);
        }
    };
    info!(mode = ?config.run_mode, handlers = %config.handlers_dir.display(), "Starting bot");

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================

    let cache = match SqliteCacheStore::open(&config.cache_db_path).await {
        Ok(cache) => Arc::new(cache),
        Err(e) => {
            error!(error = %e, path = %config.cache_db_path.display(), "Failed to open cache store");
            std::process::exit(1);
        }
    };

    let moderation = Arc::new(SerenityModeration::new());
    let moderation_port: Arc<dyn ModerationGateway> = moderation.clone();
    let cache_port: Arc<dyn CacheStore> = cache.clone();
    let mut data = Data::new(moderation_port).with_cache(cache_port);
    let durable = connect_durable(&config).await;
    if let Some(durable) = &durable {
        let durable_port: Arc<dyn DurableStore> = durable.clone();
        data = data.with_durable(durable_port);
    }

    let client = Arc::new(BotClient::new(builtin_catalog(), data));
    if let Err(e) = client.load_components(&config.handlers_dir).await {
        error!(error = %e, "Failed to load handlers");
        std::process::exit(1);
    }
    info!(modules = ?client.modules().list_loaded(), "Modules active");

    spawn_cache_cleanup(Arc::clone(&cache), config.cleanup_interval);

    // ========================================================================
    // GATEWAY
    // ========================================================================

    let scope = match config.command_guild() {
        Some(guild_id) => CommandScope::Guild(guild_id),
        None => CommandScope::Global,
    };
    let bridge = GatewayBridge::new(Arc::clone(&client), moderation, scope);
    let connection: Arc<dyn GatewayConnection> =
        match SerenityConnection::connect(&config.discord_token, bridge).await {
            Ok(connection) => Arc::new(connection),
            Err(e) => {
                error!(error = %e, "Error creating client");
                std::process::exit(1);
            }
        };

    let runner = Arc::clone(&client);
    let mut gateway = tokio::spawn(async move { runner.start(connection).await });

    let exit_code = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            if let Err(e) = client.stop().await {
                warn!(error = %e, "Client did not stop cleanly");
            }
            // Give the shards a moment to close before the runtime drops them.
            let _ = tokio::time::timeout(Duration::from_secs(5), &mut gateway).await;
            0
        }
        finished = &mut gateway => match finished {
            Ok(Ok(())) => {
                info!("Gateway connection closed");
                0
            }
            Ok(Err(e)) => {
                error!(error = %e, "Gateway connection failed");
                1
            }
            Err(e) => {
                error!(error = %e, "Gateway task panicked");
                1
            }
        },
    };

    if let Some(durable) = &durable {
        durable.disconnect();
    }
    cache.close().await;
    std::process::exit(exit_code);
}
