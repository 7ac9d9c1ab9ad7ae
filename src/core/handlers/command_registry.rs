// Commands registry: strict uniqueness by name.

use super::handler_models::{CommandAction, CommandDescriptor, CommandInfo, HandlerKind};
use super::handler_table::HandlerTable;
use super::handler_validation::validate_meta;
use super::registry_error::RegistryError;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct CommandRegistry {
    table: HandlerTable<dyn CommandAction>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            table: HandlerTable::new(HandlerKind::Command),
        }
    }

    /// Register a command. A name already in use is refused and the existing
    /// registration stays untouched.
    pub fn register(&self, descriptor: CommandDescriptor) -> Result<(), RegistryError> {
        validate_meta(HandlerKind::Command, &descriptor.meta)
            .map_err(|e| RegistryError::validation(HandlerKind::Command, e))?;

        let name = descriptor.meta.name.clone();
        self.table.insert_unique(descriptor)?;
        info!(command = %name, "Command registered");
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Result<CommandDescriptor, RegistryError> {
        let removed = self.table.remove(name)?;
        debug!(command = %name, "Command unregistered");
        Ok(removed)
    }

    pub fn get(&self, name: &str) -> Option<CommandDescriptor> {
        self.table.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table.contains(name)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names in registration order.
    pub fn list(&self) -> Vec<String> {
        self.all().into_iter().map(|d| d.meta.name).collect()
    }

    pub fn all(&self) -> Vec<CommandDescriptor> {
        self.table.ordered()
    }

    /// Commands whose category matches case-insensitively. Commands without a
    /// category belong to "general".
    pub fn by_category(&self, category: &str) -> Vec<CommandDescriptor> {
        self.table
            .filter(|meta| meta.category_or_default().eq_ignore_ascii_case(category))
    }

    pub fn info(&self) -> Vec<CommandInfo> {
        self.all()
            .iter()
            .map(|descriptor| CommandInfo::from(&descriptor.meta))
            .collect()
    }

    pub fn search(&self, query: &str) -> Vec<CommandDescriptor> {
        self.table.search(query)
    }

    pub(crate) fn record_source(&self, name: &str, path: &Path) {
        self.table.record_source(name, path);
    }

    pub fn source_of(&self, name: &str) -> Option<PathBuf> {
        self.table.source(name)
    }
}
