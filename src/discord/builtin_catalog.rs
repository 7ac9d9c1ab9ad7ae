// Every action the shipped manifests can name.

use crate::core::handlers::ActionCatalog;
use crate::discord::commands::{
    cooldowns::Cooldowns, events::Events, help::Help, kick::Kick, modules::Modules, ping::Ping,
    recent_accounts::RecentAccounts, reload::Reload, storage::Storage, uptime::Uptime,
};
use crate::discord::events::{MemberJoinLog, ReadyLog};
use crate::discord::plugins::UtilitiesHooks;
use std::sync::Arc;

pub fn builtin_catalog() -> ActionCatalog {
    ActionCatalog::new()
        .command("utility.ping", || Ping)
        .command("utility.help", || Help)
        // Stateless; every load reuses one instance.
        .shared_command("utility.uptime", Arc::new(Uptime))
        .command("moderation.kick", || Kick)
        .command("moderation.recent_accounts", || RecentAccounts)
        .command("admin.reload", || Reload)
        .command("admin.cooldowns", || Cooldowns)
        .command("admin.events", || Events)
        .command("admin.modules", || Modules)
        .command("admin.storage", || Storage)
        .shared_event("events.ready", Arc::new(ReadyLog))
        .event("events.member_join", || MemberJoinLog)
        .hooks("modules.utilities", || UtilitiesHooks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::client::{BotClient, LoadSummary};
    use crate::core::events::BotEvent;
    use crate::core::handlers::Data;
    use crate::core::storage::CacheStore;
    use crate::discord::plugins::utilities_module::loaded_at_key;
    use crate::infra::storage::SqliteCacheStore;
    use std::path::Path;
    use tempfile::TempDir;

    fn shipped_handlers() -> &'static Path {
        Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/handlers"))
    }

    #[tokio::test]
    async fn shipped_manifests_all_resolve() {
        let client = BotClient::new(builtin_catalog(), Data::detached());
        let summary = client.load_components(shipped_handlers()).await.unwrap();

        assert_eq!(
            summary,
            LoadSummary {
                events: 2,
                commands: 9,
                modules: 1
            }
        );

        let commands = client.registry().commands();
        let mut names = commands.list();
        names.sort();
        assert_eq!(
            names,
            vec![
                "cooldowns",
                "events",
                "help",
                "kick",
                "modules",
                "ping",
                "recent-accounts",
                "reload",
                "storage",
                "uptime"
            ]
        );
        assert_eq!(
            commands.get("kick").unwrap().meta.permissions,
            vec!["KickMembers".to_string()]
        );
        assert_eq!(client.modules().list_loaded(), vec!["utilities".to_string()]);
    }

    #[test]
    fn stateless_actions_are_shared_across_loads() {
        let catalog = builtin_catalog();

        let first = catalog.resolve_command("utility.uptime").unwrap();
        let second = catalog.resolve_command("utility.uptime").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let ready = catalog.resolve_event("events.ready").unwrap();
        assert!(Arc::ptr_eq(&ready, &catalog.resolve_event("events.ready").unwrap()));

        let ping = catalog.resolve_command("utility.ping").unwrap();
        assert!(!Arc::ptr_eq(&ping, &catalog.resolve_command("utility.ping").unwrap()));
    }

    #[tokio::test]
    async fn joins_and_module_load_reach_the_cache_store() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(SqliteCacheStore::open(&dir.path().join("cache.db")).await.unwrap());
        let data = Data::detached().with_cache(cache.clone());

        let client = BotClient::new(builtin_catalog(), data);
        client.load_components(shipped_handlers()).await.unwrap();

        assert!(cache
            .get_setting(0, &loaded_at_key("utilities"))
            .await
            .unwrap()
            .is_some());

        client
            .emit(BotEvent::MemberJoin {
                guild_id: 5,
                user_id: 6,
                user_name: "newcomer".into(),
            })
            .await;
        assert_eq!(cache.stats().await.unwrap().log_lines, 1);
    }
}
