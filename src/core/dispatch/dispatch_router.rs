// Routes one inbound interaction to its command.
//
// Each interaction goes through the same single pass: filter, resolve,
// cooldown gate, permission gate, invoke, commit cooldown. Nothing a handler
// does (error or panic) escapes `dispatch`; the caller gets an apology and the
// log gets the detail.

use super::interaction::{CommandInteraction, InboundInteraction, Reply, Responder};
use crate::core::cooldowns::CooldownTracker;
use crate::core::handlers::{CommandContext, Controls, Data, Registry};
use crate::core::plugins::ModuleLoader;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub const NOT_FOUND_MESSAGE: &str = "Command not found!";
pub const PERMISSION_DENIED_MESSAGE: &str = "You do not have permission to use this command!";
pub const FAILURE_MESSAGE: &str = "An error occurred while executing this command!";

pub fn cooldown_message(remaining_secs: u64) -> String {
    format!("Please wait {remaining_secs} seconds before using this command again.")
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// A gate turned the invocation away. Not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declined {
    CooldownActive { remaining_secs: u64 },
    PermissionDenied { missing: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotHandledReason {
    NotACommand,
    UnknownCommand,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The handler ran. `succeeded` is false when it failed or panicked.
    Handled { succeeded: bool },
    Declined(Declined),
    NotHandled(NotHandledReason),
}

// ============================================================================
// ROUTER
// ============================================================================

pub struct DispatchRouter {
    registry: Arc<Registry>,
    cooldowns: Arc<CooldownTracker>,
    modules: Arc<ModuleLoader>,
    data: Arc<Data>,
}

impl DispatchRouter {
    pub fn new(
        registry: Arc<Registry>,
        cooldowns: Arc<CooldownTracker>,
        modules: Arc<ModuleLoader>,
        data: Arc<Data>,
    ) -> Self {
        Self {
            registry,
            cooldowns,
            modules,
            data,
        }
    }

    pub async fn dispatch(&self, inbound: InboundInteraction<'_>) -> DispatchOutcome {
        let interaction = match inbound {
            InboundInteraction::Command(interaction) => interaction,
            InboundInteraction::Other { kind } => {
                debug!(%kind, "Ignoring non-command interaction");
                return DispatchOutcome::NotHandled(NotHandledReason::NotACommand);
            }
        };

        let CommandInteraction {
            invocation,
            responder,
        } = interaction;
        let name = invocation.command_name.clone();
        let user_id = invocation.caller.id;

        let Some(descriptor) = self.registry.commands().get(&name) else {
            warn!(command = %name, user_id, "Unknown command invoked");
            notify(responder, NOT_FOUND_MESSAGE.to_string()).await;
            return DispatchOutcome::NotHandled(NotHandledReason::UnknownCommand);
        };

        let cooldown = descriptor.meta.cooldown();
        if cooldown.is_some() {
            if let Some(remaining_secs) = self.cooldowns.remaining_seconds(&name, user_id) {
                debug!(command = %name, user_id, remaining_secs, "Command on cooldown");
                notify(responder, cooldown_message(remaining_secs)).await;
                return DispatchOutcome::Declined(Declined::CooldownActive { remaining_secs });
            }
        }

        let required = &descriptor.meta.permissions;
        if !required.is_empty() {
            // No permission context (direct messages) denies anything gated.
            let missing: Vec<String> = match &invocation.permissions {
                Some(granted) => granted
                    .missing(required)
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                None => required.clone(),
            };
            if !missing.is_empty() {
                info!(command = %name, user_id, ?missing, "Permission denied");
                notify(responder, PERMISSION_DENIED_MESSAGE.to_string()).await;
                return DispatchOutcome::Declined(Declined::PermissionDenied { missing });
            }
        }

        let controls = Controls {
            cooldowns: &self.cooldowns,
            modules: &self.modules,
        };
        let mut ctx = CommandContext::new(invocation, responder, &self.data, &self.registry)
            .with_controls(controls);
        let outcome = AssertUnwindSafe(descriptor.action.execute(&mut ctx))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {
                if let Some(cooldown) = cooldown {
                    self.cooldowns.mark_used(&name, user_id, cooldown);
                }
                info!(command = %name, user_id, "Command executed");
                DispatchOutcome::Handled { succeeded: true }
            }
            Ok(Err(e)) => {
                error!(command = %name, user_id, error = %e, "Command failed");
                apologize(responder).await;
                DispatchOutcome::Handled { succeeded: false }
            }
            Err(_) => {
                error!(command = %name, user_id, "Command panicked");
                apologize(responder).await;
                DispatchOutcome::Handled { succeeded: false }
            }
        }
    }
}

async fn notify(responder: &mut Responder, message: String) {
    if let Err(e) = responder.reply(Reply::text(message).ephemeral()).await {
        warn!(error = %e, "Could not send gate reply");
    }
}

/// Best-effort failure notice on whichever channel is still open.
async fn apologize(responder: &mut Responder) {
    let notice = Reply::text(FAILURE_MESSAGE).ephemeral();
    let sent = if responder.has_responded() {
        responder.follow_up(notice).await
    } else {
        responder.reply(notice).await
    };
    if let Err(e) = sent {
        warn!(error = %e, "Could not send failure notice");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cooldowns::ManualClock;
    use crate::core::dispatch::interaction::testing::{guild_interaction, Sent};
    use crate::core::dispatch::{Caller, Invocation};
    use crate::core::embeds::{Embed, EmbedColor};
    use crate::core::events::EventBus;
    use crate::core::handlers::{
        ActionCatalog, CommandAction, CommandDescriptor, HandlerError, HandlerMeta,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EmbedReply;

    #[async_trait]
    impl CommandAction for EmbedReply {
        async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<(), HandlerError> {
            let embed = Embed::new().title("Pong!").color(EmbedColor::Success);
            ctx.reply(Reply::embed(embed)).await?;
            Ok(())
        }
    }

    struct Counted(Arc<AtomicUsize>);

    #[async_trait]
    impl CommandAction for Counted {
        async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<(), HandlerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            ctx.reply(Reply::text("done")).await?;
            Ok(())
        }
    }

    struct Failing {
        defer_first: bool,
    }

    #[async_trait]
    impl CommandAction for Failing {
        async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<(), HandlerError> {
            if self.defer_first {
                ctx.defer(false).await?;
            }
            Err("upstream timed out".into())
        }
    }

    /// Clears the caller's cooldowns through the lent controls.
    struct ClearOwn;

    #[async_trait]
    impl CommandAction for ClearOwn {
        async fn execute(&self, ctx: &mut CommandContext<'_>) -> Result<(), HandlerError> {
            let cleared = ctx.controls()?.cooldowns.clear_for_user(ctx.invocation.caller.id);
            ctx.reply(Reply::text(cleared.to_string())).await?;
            Ok(())
        }
    }

    struct Panicking;

    #[async_trait]
    impl CommandAction for Panicking {
        async fn execute(&self, _ctx: &mut CommandContext<'_>) -> Result<(), HandlerError> {
            panic!("index out of bounds");
        }
    }

    struct Harness {
        router: DispatchRouter,
        registry: Arc<Registry>,
        cooldowns: Arc<CooldownTracker>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let data = Arc::new(Data::detached());
        let registry = Arc::new(Registry::new(
            Arc::new(ActionCatalog::new()),
            Arc::new(EventBus::new()),
            Arc::clone(&data),
        ));
        let clock = ManualClock::starting_at(1_000_000);
        let cooldowns = Arc::new(CooldownTracker::with_clock(clock.clone()));
        let modules = Arc::new(ModuleLoader::new(Arc::clone(&registry), Arc::clone(&data)));
        Harness {
            router: DispatchRouter::new(
                Arc::clone(&registry),
                Arc::clone(&cooldowns),
                modules,
                data,
            ),
            registry,
            cooldowns,
            clock,
        }
    }

    impl Harness {
        fn command(&self, meta: HandlerMeta, action: Arc<dyn CommandAction>) {
            self.registry
                .commands()
                .register(CommandDescriptor::new(meta, action))
                .unwrap();
        }

        async fn run(&self, interaction: &mut CommandInteraction) -> DispatchOutcome {
            self.router
                .dispatch(InboundInteraction::Command(interaction))
                .await
        }
    }

    fn only_text(sent: &[Sent]) -> Option<String> {
        match sent {
            [Sent::Reply(reply)] | [_, Sent::FollowUp(reply)] => reply.content.clone(),
            _ => None,
        }
    }

    #[tokio::test]
    async fn ping_replies_with_an_embed_and_arms_nothing() {
        let h = harness();
        h.command(HandlerMeta::named("ping"), Arc::new(EmbedReply));
        let (mut interaction, transport) = guild_interaction("ping", 7, &[]);

        assert_eq!(
            h.run(&mut interaction).await,
            DispatchOutcome::Handled { succeeded: true }
        );
        match transport.log().as_slice() {
            [Sent::Reply(reply)] => assert_eq!(reply.embeds[0].title.as_deref(), Some("Pong!")),
            other => panic!("unexpected replies: {other:?}"),
        }
        assert_eq!(h.cooldowns.len(), 0);
    }

    #[tokio::test]
    async fn kick_cooldown_blocks_the_immediate_retry() {
        let h = harness();
        let runs = Arc::new(AtomicUsize::new(0));
        h.command(
            HandlerMeta::named("kick")
                .permissions(["KickMembers"])
                .cooldown_ms(5000),
            Arc::new(Counted(Arc::clone(&runs))),
        );

        let (mut first, _) = guild_interaction("kick", 7, &["KickMembers"]);
        assert_eq!(
            h.run(&mut first).await,
            DispatchOutcome::Handled { succeeded: true }
        );
        assert!(h.cooldowns.is_on_cooldown("kick", 7));

        let (mut second, transport) = guild_interaction("kick", 7, &["KickMembers"]);
        assert_eq!(
            h.run(&mut second).await,
            DispatchOutcome::Declined(Declined::CooldownActive { remaining_secs: 5 })
        );
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(only_text(&transport.log()), Some(cooldown_message(5)));
    }

    #[tokio::test]
    async fn cooldown_lapses_after_the_window() {
        let h = harness();
        let runs = Arc::new(AtomicUsize::new(0));
        h.command(
            HandlerMeta::named("daily").cooldown_ms(5000),
            Arc::new(Counted(Arc::clone(&runs))),
        );

        let (mut first, _) = guild_interaction("daily", 7, &[]);
        h.run(&mut first).await;
        h.clock.advance(5000);
        let (mut second, _) = guild_interaction("daily", 7, &[]);

        assert_eq!(
            h.run(&mut second).await,
            DispatchOutcome::Handled { succeeded: true }
        );
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_command_is_reported_and_nothing_is_created() {
        let h = harness();
        let (mut interaction, transport) = guild_interaction("ghost", 7, &[]);

        assert_eq!(
            h.run(&mut interaction).await,
            DispatchOutcome::NotHandled(NotHandledReason::UnknownCommand)
        );
        assert_eq!(only_text(&transport.log()).as_deref(), Some(NOT_FOUND_MESSAGE));
        assert!(h.registry.commands().is_empty());
        assert_eq!(h.registry.events().len(), 0);
        assert_eq!(h.cooldowns.len(), 0);
    }

    #[tokio::test]
    async fn non_command_interactions_are_ignored() {
        let h = harness();
        let outcome = h
            .router
            .dispatch(InboundInteraction::Other {
                kind: "component".into(),
            })
            .await;
        assert_eq!(
            outcome,
            DispatchOutcome::NotHandled(NotHandledReason::NotACommand)
        );
    }

    #[tokio::test]
    async fn every_declared_permission_is_required() {
        let h = harness();
        let runs = Arc::new(AtomicUsize::new(0));
        h.command(
            HandlerMeta::named("purge").permissions(["A", "B"]),
            Arc::new(Counted(Arc::clone(&runs))),
        );

        let (mut partial, transport) = guild_interaction("purge", 7, &["A"]);
        assert_eq!(
            h.run(&mut partial).await,
            DispatchOutcome::Declined(Declined::PermissionDenied {
                missing: vec!["B".to_string()]
            })
        );
        assert_eq!(
            only_text(&transport.log()).as_deref(),
            Some(PERMISSION_DENIED_MESSAGE)
        );

        let (mut full, _) = guild_interaction("purge", 7, &["A", "B"]);
        assert_eq!(
            h.run(&mut full).await,
            DispatchOutcome::Handled { succeeded: true }
        );
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn direct_messages_fail_any_permission_gate() {
        let h = harness();
        h.command(
            HandlerMeta::named("kick").permissions(["KickMembers"]),
            Arc::new(EmbedReply),
        );
        let transport = crate::core::dispatch::interaction::testing::RecordingTransport::default();
        let invocation = Invocation::new(
            "kick",
            Caller {
                id: 7,
                name: "someone".into(),
            },
        );
        let mut interaction = CommandInteraction::new(invocation, Box::new(transport.clone()));

        assert!(matches!(
            h.run(&mut interaction).await,
            DispatchOutcome::Declined(Declined::PermissionDenied { .. })
        ));
    }

    #[tokio::test]
    async fn failure_apologises_and_arms_no_cooldown() {
        let h = harness();
        h.command(
            HandlerMeta::named("fetch").cooldown_ms(5000),
            Arc::new(Failing { defer_first: false }),
        );
        let (mut interaction, transport) = guild_interaction("fetch", 7, &[]);

        assert_eq!(
            h.run(&mut interaction).await,
            DispatchOutcome::Handled { succeeded: false }
        );
        assert_eq!(only_text(&transport.log()).as_deref(), Some(FAILURE_MESSAGE));
        assert!(!h.cooldowns.is_on_cooldown("fetch", 7));
    }

    #[tokio::test]
    async fn failure_after_defer_uses_follow_up() {
        let h = harness();
        h.command(HandlerMeta::named("fetch"), Arc::new(Failing { defer_first: true }));
        let (mut interaction, transport) = guild_interaction("fetch", 7, &[]);

        h.run(&mut interaction).await;

        let log = transport.log();
        assert_eq!(log[0], Sent::Defer { ephemeral: false });
        assert!(matches!(&log[1], Sent::FollowUp(reply) if reply.content.as_deref() == Some(FAILURE_MESSAGE)));
    }

    #[tokio::test]
    async fn routed_commands_reach_the_runtime_controls() {
        let h = harness();
        h.command(HandlerMeta::named("daily").cooldown_ms(5000), Arc::new(EmbedReply));
        h.command(HandlerMeta::named("reset"), Arc::new(ClearOwn));

        let (mut daily, _) = guild_interaction("daily", 7, &[]);
        h.run(&mut daily).await;
        assert!(h.cooldowns.is_on_cooldown("daily", 7));

        let (mut reset, transport) = guild_interaction("reset", 7, &[]);
        assert_eq!(
            h.run(&mut reset).await,
            DispatchOutcome::Handled { succeeded: true }
        );
        assert_eq!(only_text(&transport.log()).as_deref(), Some("1"));
        assert!(!h.cooldowns.is_on_cooldown("daily", 7));
    }

    #[tokio::test]
    async fn panics_are_contained() {
        let h = harness();
        h.command(HandlerMeta::named("crash"), Arc::new(Panicking));
        let (mut interaction, transport) = guild_interaction("crash", 7, &[]);

        assert_eq!(
            h.run(&mut interaction).await,
            DispatchOutcome::Handled { succeeded: false }
        );
        assert_eq!(only_text(&transport.log()).as_deref(), Some(FAILURE_MESSAGE));
    }
}
