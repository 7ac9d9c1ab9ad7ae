// Compiled-in actions that manifests refer to by key.
//
// A manifest's `execute` field names a catalog key. An entry either builds a
// fresh action each time it is resolved (so a reload really swaps the
// instance) or hands out one shared instance.

use super::handler_models::{CommandAction, EventAction};
use crate::core::plugins::PluginHooks;
use std::collections::HashMap;
use std::sync::Arc;

pub enum ActionSource<A: ?Sized> {
    Factory(Arc<dyn Fn() -> Arc<A> + Send + Sync>),
    Shared(Arc<A>),
}

impl<A: ?Sized> ActionSource<A> {
    pub fn produce(&self) -> Arc<A> {
        match self {
            ActionSource::Factory(build) => build(),
            ActionSource::Shared(instance) => Arc::clone(instance),
        }
    }
}

#[derive(Default)]
pub struct ActionCatalog {
    commands: HashMap<String, ActionSource<dyn CommandAction>>,
    events: HashMap<String, ActionSource<dyn EventAction>>,
    hooks: HashMap<String, ActionSource<dyn PluginHooks>>,
}

impl ActionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn command<F, T>(mut self, key: impl Into<String>, build: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: CommandAction + 'static,
    {
        let factory = move || Arc::new(build()) as Arc<dyn CommandAction>;
        self.commands
            .insert(key.into(), ActionSource::Factory(Arc::new(factory)));
        self
    }

    pub fn shared_command(mut self, key: impl Into<String>, action: Arc<dyn CommandAction>) -> Self {
        self.commands
            .insert(key.into(), ActionSource::Shared(action));
        self
    }

    pub fn event<F, T>(mut self, key: impl Into<String>, build: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: EventAction + 'static,
    {
        let factory = move || Arc::new(build()) as Arc<dyn EventAction>;
        self.events
            .insert(key.into(), ActionSource::Factory(Arc::new(factory)));
        self
    }

    pub fn shared_event(mut self, key: impl Into<String>, action: Arc<dyn EventAction>) -> Self {
        self.events.insert(key.into(), ActionSource::Shared(action));
        self
    }

    pub fn hooks<F, T>(mut self, key: impl Into<String>, build: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: PluginHooks + 'static,
    {
        let factory = move || Arc::new(build()) as Arc<dyn PluginHooks>;
        self.hooks
            .insert(key.into(), ActionSource::Factory(Arc::new(factory)));
        self
    }

    pub fn resolve_command(&self, key: &str) -> Option<Arc<dyn CommandAction>> {
        self.commands.get(key).map(ActionSource::produce)
    }

    pub fn resolve_event(&self, key: &str) -> Option<Arc<dyn EventAction>> {
        self.events.get(key).map(ActionSource::produce)
    }

    pub fn resolve_hooks(&self, key: &str) -> Option<Arc<dyn PluginHooks>> {
        self.hooks.get(key).map(ActionSource::produce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::handlers::handler_context::{CommandContext, EventContext};
    use crate::core::handlers::HandlerError;
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl CommandAction for Noop {
        async fn execute(&self, _ctx: &mut CommandContext<'_>) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[async_trait]
    impl EventAction for Noop {
        async fn execute(&self, _ctx: &EventContext<'_>) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[test]
    fn factories_build_a_new_instance_per_resolve() {
        let catalog = ActionCatalog::new().command("noop", || Noop);
        let first = catalog.resolve_command("noop").unwrap();
        let second = catalog.resolve_command("noop").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn shared_entries_reuse_the_instance() {
        let catalog = ActionCatalog::new().shared_event("noop", Arc::new(Noop));
        let first = catalog.resolve_event("noop").unwrap();
        let second = catalog.resolve_event("noop").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn kinds_do_not_share_keys() {
        let catalog = ActionCatalog::new().command("noop", || Noop);
        assert!(catalog.resolve_event("noop").is_none());
        assert!(catalog.resolve_command("missing").is_none());
    }
}
