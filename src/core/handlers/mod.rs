// Handler registries: commands and events, their on-disk manifests, and the
// catalog of compiled-in actions manifests point at.

pub mod action_catalog;
pub mod command_registry;
pub mod event_registry;
pub mod handler_context;
pub mod handler_loader;
pub mod handler_models;
mod handler_table;
pub mod handler_validation;
pub mod registry;
pub mod registry_error;

pub use action_catalog::ActionCatalog;
pub use command_registry::CommandRegistry;
pub use event_registry::EventRegistry;
pub use handler_context::{CommandContext, Controls, Data, EventContext};
pub use handler_loader::{collect_manifest_files, read_manifest};
pub use handler_models::*;
pub use handler_validation::ValidationError;
pub use registry::Registry;
pub use registry_error::RegistryError;
