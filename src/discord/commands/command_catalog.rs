// Built-in slash commands. Each command gets its own file; manifests under
// `handlers/commands` bind to them by catalog key.

pub mod cooldowns;
pub mod events;
pub mod help;
pub mod kick;
pub mod modules;
pub mod ping;
pub mod recent_accounts;
pub mod reload;
pub mod storage;
pub mod uptime;

#[cfg(test)]
pub mod testing {
    use crate::core::cooldowns::CooldownTracker;
    use crate::core::dispatch::interaction::testing::{guild_interaction, Sent};
    use crate::core::dispatch::{OptionValue, Reply};
    use crate::core::events::EventBus;
    use crate::core::handlers::{ActionCatalog, CommandAction, CommandContext, Controls, Data, Registry};
    use crate::core::plugins::ModuleLoader;
    use std::sync::Arc;

    /// A registry, module loader and cooldown ledger to run admin commands against.
    pub struct AdminBench {
        pub data: Arc<Data>,
        pub registry: Arc<Registry>,
        pub modules: ModuleLoader,
        pub cooldowns: CooldownTracker,
    }

    impl AdminBench {
        pub fn new(catalog: ActionCatalog, data: Data) -> Self {
            let data = Arc::new(data);
            let registry = Arc::new(Registry::new(
                Arc::new(catalog),
                Arc::new(EventBus::new()),
                Arc::clone(&data),
            ));
            let modules = ModuleLoader::new(Arc::clone(&registry), Arc::clone(&data));
            Self {
                data,
                registry,
                modules,
                cooldowns: CooldownTracker::new(),
            }
        }

        /// Run `action` as an administrator and return the single reply it sent.
        pub async fn run(
            &self,
            action: &dyn CommandAction,
            command: &str,
            options: &[(&str, OptionValue)],
        ) -> Reply {
            let (mut interaction, transport) = guild_interaction(command, 1, &["Administrator"]);
            for (name, value) in options {
                interaction.invocation = interaction
                    .invocation
                    .clone()
                    .with_option(*name, value.clone());
            }
            let mut ctx = CommandContext::new(
                &interaction.invocation,
                &mut interaction.responder,
                &self.data,
                &self.registry,
            )
            .with_controls(Controls {
                cooldowns: &self.cooldowns,
                modules: &self.modules,
            });
            action.execute(&mut ctx).await.unwrap();

            match transport.log().as_slice() {
                [Sent::Reply(reply)] => reply.clone(),
                other => panic!("expected one reply, got {other:?}"),
            }
        }
    }

    pub fn text(value: &str) -> OptionValue {
        OptionValue::String(value.to_string())
    }
}
