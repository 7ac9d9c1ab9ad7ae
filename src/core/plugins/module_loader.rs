// Plugin modules: a manifest bundling commands and events with optional
// lifecycle hooks, loaded and unloaded as one unit.

use crate::core::handlers::{
    collect_manifest_files, read_manifest, CommandDescriptor, CommandRegistry, Data,
    EventDescriptor, EventRegistry, HandlerError, HandlerKind, Registry, RegistryError,
    ValidationError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

// ============================================================================
// HOOKS
// ============================================================================

#[async_trait]
pub trait PluginHooks: Send + Sync {
    async fn init(&self, module: &str, data: &Data) -> Result<(), HandlerError>;
    async fn destroy(&self, module: &str, data: &Data) -> Result<(), HandlerError>;
}

// ============================================================================
// MODELS
// ============================================================================

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("module manifest rejected: {0}")]
    Validation(ValidationError),

    #[error("module `{0}` is already loaded")]
    AlreadyLoaded(String),

    #[error("module `{0}` is not loaded")]
    NotFound(String),

    #[error("module `{module}` {stage} hook failed: {reason}")]
    Hook {
        module: String,
        stage: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

pub struct LoadedModule {
    pub name: String,
    pub version: String,
    pub description: String,
    pub commands: Vec<String>,
    pub events: Vec<String>,
    hooks: Option<Arc<dyn PluginHooks>>,
}

impl std::fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("commands", &self.commands)
            .field("events", &self.events)
            .field("has_hooks", &self.hooks.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct LoadedModuleRecord {
    pub source_path: PathBuf,
    pub module: Arc<LoadedModule>,
    pub loaded_at: DateTime<Utc>,
}

/// Everything resolved from a module manifest before anything is registered.
struct ModulePlan {
    name: String,
    version: String,
    description: String,
    commands: Vec<CommandDescriptor>,
    events: Vec<EventDescriptor>,
    hooks: Option<Arc<dyn PluginHooks>>,
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ModuleError {
    ModuleError::Validation(ValidationError::new(field, reason))
}

fn required_string(manifest: &Value, field: &str) -> Result<String, ModuleError> {
    match manifest.get(field) {
        Some(Value::String(value)) if !value.trim().is_empty() => Ok(value.clone()),
        _ => Err(invalid(field, "must be a non-empty string")),
    }
}

fn handler_list<'a>(manifest: &'a Value, field: &str) -> Result<&'a [Value], ModuleError> {
    match manifest.get(field) {
        None | Some(Value::Null) => Ok(&[][..]),
        Some(Value::Array(items)) => Ok(items.as_slice()),
        Some(_) => Err(invalid(field, "must be a list of handler manifests")),
    }
}

// ============================================================================
// LOADER
// ============================================================================

pub struct ModuleLoader {
    registry: Arc<Registry>,
    data: Arc<Data>,
    records: DashMap<String, LoadedModuleRecord>,
}

impl ModuleLoader {
    pub fn new(registry: Arc<Registry>, data: Arc<Data>) -> Self {
        Self {
            registry,
            data,
            records: DashMap::new(),
        }
    }

    fn plan(&self, manifest: Value) -> Result<ModulePlan, ModuleError> {
        if !manifest.is_object() {
            return Err(invalid("<root>", "must be a JSON object"));
        }

        let name = required_string(&manifest, "name")?;
        let version = required_string(&manifest, "version")?;
        let description = match manifest.get("description") {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(text)) => text.clone(),
            Some(_) => return Err(invalid("description", "must be a string")),
        };

        let loader = self.registry.loader();
        let commands = handler_list(&manifest, "commands")?
            .iter()
            .map(|entry| loader.resolve_value::<CommandRegistry>(entry.clone()))
            .collect::<Result<Vec<_>, _>>()?;
        let events = handler_list(&manifest, "events")?
            .iter()
            .map(|entry| loader.resolve_value::<EventRegistry>(entry.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        let hooks = match manifest.get("hooks") {
            None | Some(Value::Null) => None,
            Some(Value::String(key)) => Some(
                loader
                    .catalog()
                    .resolve_hooks(key)
                    .ok_or_else(|| invalid("hooks", format!("names no known hooks `{key}`")))?,
            ),
            Some(_) => return Err(invalid("hooks", "must be a string")),
        };

        Ok(ModulePlan {
            name,
            version,
            description,
            commands,
            events,
            hooks,
        })
    }

    fn unregister_all(&self, commands: &[String], events: &[String]) {
        for name in commands {
            if let Err(e) = self.registry.commands().unregister(name) {
                debug!(command = %name, error = %e, "Module command already gone");
            }
        }
        for name in events {
            if let Err(e) = self.registry.events().unregister(name) {
                debug!(event = %name, error = %e, "Module event already gone");
            }
        }
    }

    /// Register every bundled handler, or none of them.
    ///
    /// Bundled events are strict-unique: the event registry would otherwise
    /// replace a standalone handler of the same name and unloading the
    /// module could not bring it back.
    fn register_all(&self, plan: &ModulePlan) -> Result<(Vec<String>, Vec<String>), ModuleError> {
        let mut commands = Vec::new();
        let mut events = Vec::new();

        let outcome = (|| {
            for descriptor in &plan.commands {
                self.registry.commands().register(descriptor.clone())?;
                commands.push(descriptor.meta.name.clone());
            }
            for descriptor in &plan.events {
                if self.registry.events().contains(&descriptor.meta.name) {
                    return Err(RegistryError::DuplicateName {
                        kind: HandlerKind::Event,
                        name: descriptor.meta.name.clone(),
                    });
                }
                self.registry.events().register(descriptor.clone())?;
                events.push(descriptor.meta.name.clone());
            }
            Ok::<(), RegistryError>(())
        })();

        match outcome {
            Ok(()) => Ok((commands, events)),
            Err(e) => {
                self.unregister_all(&commands, &events);
                Err(e.into())
            }
        }
    }

    pub async fn load_module(&self, path: &Path) -> Result<LoadedModuleRecord, ModuleError> {
        let path = fs::canonicalize(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let plan = self.plan(read_manifest(&path)?)?;

        if self.records.contains_key(&plan.name) {
            return Err(ModuleError::AlreadyLoaded(plan.name));
        }

        let (commands, events) = self.register_all(&plan)?;

        if let Some(hooks) = &plan.hooks {
            if let Err(e) = hooks.init(&plan.name, &self.data).await {
                self.unregister_all(&commands, &events);
                return Err(ModuleError::Hook {
                    module: plan.name,
                    stage: "init",
                    reason: e.to_string(),
                });
            }
        }

        let record = LoadedModuleRecord {
            source_path: path,
            module: Arc::new(LoadedModule {
                name: plan.name.clone(),
                version: plan.version,
                description: plan.description,
                commands,
                events,
                hooks: plan.hooks,
            }),
            loaded_at: Utc::now(),
        };
        self.records.insert(plan.name.clone(), record.clone());

        info!(
            module = %plan.name,
            version = %record.module.version,
            commands = record.module.commands.len(),
            events = record.module.events.len(),
            "Module loaded"
        );
        Ok(record)
    }

    /// Load every module manifest under `dir`; a bad module is logged and skipped.
    pub async fn load_from_directory(
        &self,
        dir: &Path,
    ) -> Result<Vec<LoadedModuleRecord>, ModuleError> {
        let mut loaded = Vec::new();
        for path in collect_manifest_files(dir)? {
            match self.load_module(&path).await {
                Ok(record) => loaded.push(record),
                Err(e) => error!(path = %path.display(), error = %e, "Skipping module"),
            }
        }
        Ok(loaded)
    }

    /// Run the destroy hook, then drop the module's handlers.
    pub async fn unload_module(&self, name: &str) -> Result<LoadedModuleRecord, ModuleError> {
        let (_, record) = self
            .records
            .remove(name)
            .ok_or_else(|| ModuleError::NotFound(name.to_string()))?;

        if let Some(hooks) = &record.module.hooks {
            if let Err(e) = hooks.destroy(name, &self.data).await {
                warn!(module = %name, error = %e, "Module destroy hook failed");
            }
        }
        self.unregister_all(&record.module.commands, &record.module.events);

        info!(module = %name, "Module unloaded");
        Ok(record)
    }

    pub async fn reload_module(&self, name: &str) -> Result<LoadedModuleRecord, ModuleError> {
        let path = self
            .records
            .get(name)
            .map(|record| record.source_path.clone())
            .ok_or_else(|| ModuleError::NotFound(name.to_string()))?;

        self.unload_module(name).await?;
        self.load_module(&path).await
    }

    pub fn list_loaded(&self) -> Vec<String> {
        let mut names: Vec<String> = self.records.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    pub fn module_info(&self, name: &str) -> Option<LoadedModuleRecord> {
        self.records.get(name).map(|record| record.clone())
    }
}
