// The one registry object shared by the loader, the router and the client.

use super::action_catalog::ActionCatalog;
use super::command_registry::CommandRegistry;
use super::event_registry::EventRegistry;
use super::handler_context::Data;
use super::handler_loader::HandlerLoader;
use super::handler_models::{CommandDescriptor, EventDescriptor, HandlerKind};
use super::registry_error::RegistryError;
use crate::core::events::EventBus;
use std::path::Path;
use std::sync::Arc;

pub struct Registry {
    commands: CommandRegistry,
    events: EventRegistry,
    loader: HandlerLoader,
}

impl Registry {
    pub fn new(catalog: Arc<ActionCatalog>, bus: Arc<EventBus>, data: Arc<Data>) -> Self {
        Self {
            commands: CommandRegistry::new(),
            events: EventRegistry::new(bus, data),
            loader: HandlerLoader::new(catalog),
        }
    }

    pub fn commands(&self) -> &CommandRegistry {
        &self.commands
    }

    pub fn events(&self) -> &EventRegistry {
        &self.events
    }

    pub fn loader(&self) -> &HandlerLoader {
        &self.loader
    }

    pub fn load_commands(&self, dir: &Path) -> Result<Vec<CommandDescriptor>, RegistryError> {
        self.loader.load_from_directory(&self.commands, dir)
    }

    pub fn load_events(&self, dir: &Path) -> Result<Vec<EventDescriptor>, RegistryError> {
        self.loader.load_from_directory(&self.events, dir)
    }

    #[allow(dead_code)]
    pub fn load_command(&self, path: &Path) -> Result<CommandDescriptor, RegistryError> {
        self.loader.load_one(&self.commands, path)
    }

    #[allow(dead_code)]
    pub fn load_event(&self, path: &Path) -> Result<EventDescriptor, RegistryError> {
        self.loader.load_one(&self.events, path)
    }

    pub fn reload_command(&self, name: &str) -> Result<CommandDescriptor, RegistryError> {
        self.loader.reload(&self.commands, name)
    }

    pub fn reload_event(&self, name: &str) -> Result<EventDescriptor, RegistryError> {
        self.loader.reload(&self.events, name)
    }

    /// Reload whichever handler carries `name`, commands first.
    pub fn reload(&self, name: &str) -> Result<HandlerKind, RegistryError> {
        if self.commands.contains(name) {
            self.reload_command(name).map(|_| HandlerKind::Command)
        } else if self.events.contains(name) {
            self.reload_event(name).map(|_| HandlerKind::Event)
        } else {
            Err(RegistryError::NotFound {
                kind: HandlerKind::Command,
                name: name.to_string(),
            })
        }
    }
}
