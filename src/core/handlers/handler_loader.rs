// Turns manifest files into registered handlers.
//
// Resolution (read, parse, validate, bind the action) never touches a
// registry, so reload can prepare the replacement before dropping the
// current registration.

use super::action_catalog::ActionCatalog;
use super::command_registry::CommandRegistry;
use super::event_registry::EventRegistry;
use super::handler_models::{
    CommandAction, EventAction, HandlerDescriptor, HandlerKind, HandlerMeta,
};
use super::handler_validation::{validate_manifest, ValidationError};
use super::registry_error::RegistryError;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

// ============================================================================
// TARGETS
// ============================================================================

/// A registry the loader can fill.
pub trait LoadTarget {
    type Action: ?Sized + Send + Sync + 'static;
    const KIND: HandlerKind;

    fn bind(catalog: &ActionCatalog, key: &str) -> Option<Arc<Self::Action>>;
    fn register(&self, descriptor: HandlerDescriptor<Self::Action>) -> Result<(), RegistryError>;
    fn unregister(&self, name: &str) -> Result<HandlerDescriptor<Self::Action>, RegistryError>;
    fn contains(&self, name: &str) -> bool;
    fn record_source(&self, name: &str, path: &Path);
    fn source_of(&self, name: &str) -> Option<PathBuf>;
}

impl LoadTarget for CommandRegistry {
    type Action = dyn CommandAction;
    const KIND: HandlerKind = HandlerKind::Command;

    fn bind(catalog: &ActionCatalog, key: &str) -> Option<Arc<Self::Action>> {
        catalog.resolve_command(key)
    }

    fn register(&self, descriptor: HandlerDescriptor<Self::Action>) -> Result<(), RegistryError> {
        CommandRegistry::register(self, descriptor)
    }

    fn unregister(&self, name: &str) -> Result<HandlerDescriptor<Self::Action>, RegistryError> {
        CommandRegistry::unregister(self, name)
    }

    fn contains(&self, name: &str) -> bool {
        CommandRegistry::contains(self, name)
    }

    fn record_source(&self, name: &str, path: &Path) {
        CommandRegistry::record_source(self, name, path)
    }

    fn source_of(&self, name: &str) -> Option<PathBuf> {
        CommandRegistry::source_of(self, name)
    }
}

impl LoadTarget for EventRegistry {
    type Action = dyn EventAction;
    const KIND: HandlerKind = HandlerKind::Event;

    fn bind(catalog: &ActionCatalog, key: &str) -> Option<Arc<Self::Action>> {
        catalog.resolve_event(key)
    }

    fn register(&self, descriptor: HandlerDescriptor<Self::Action>) -> Result<(), RegistryError> {
        EventRegistry::register(self, descriptor)
    }

    fn unregister(&self, name: &str) -> Result<HandlerDescriptor<Self::Action>, RegistryError> {
        EventRegistry::unregister(self, name)
    }

    fn contains(&self, name: &str) -> bool {
        EventRegistry::contains(self, name)
    }

    fn record_source(&self, name: &str, path: &Path) {
        EventRegistry::record_source(self, name, path)
    }

    fn source_of(&self, name: &str) -> Option<PathBuf> {
        EventRegistry::source_of(self, name)
    }
}

// ============================================================================
// DISCOVERY
// ============================================================================

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|name| name.to_string_lossy().starts_with('.'))
        .unwrap_or(false)
}

fn walk(dir: &Path, files: &mut Vec<PathBuf>, top_level: bool) -> Result<(), RegistryError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(source) if top_level => {
            return Err(RegistryError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Skipping unreadable directory");
            return Ok(());
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| !is_hidden(path))
        .collect();
    paths.sort();

    for path in paths {
        if path.is_dir() {
            walk(&path, files, false)?;
        } else if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    Ok(())
}

/// Every visible `*.json` file under `dir`, depth first, in name order.
pub fn collect_manifest_files(dir: &Path) -> Result<Vec<PathBuf>, RegistryError> {
    let mut files = Vec::new();
    walk(dir, &mut files, true)?;
    Ok(files)
}

pub fn read_manifest(path: &Path) -> Result<Value, RegistryError> {
    let raw = fs::read_to_string(path).map_err(|source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| RegistryError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

// ============================================================================
// LOADER
// ============================================================================

pub struct HandlerLoader {
    catalog: Arc<ActionCatalog>,
}

impl HandlerLoader {
    pub fn new(catalog: Arc<ActionCatalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ActionCatalog {
        &self.catalog
    }

    /// Validate a manifest value and bind its `execute` key to an action.
    pub fn resolve_value<T: LoadTarget>(
        &self,
        mut manifest: Value,
    ) -> Result<HandlerDescriptor<T::Action>, RegistryError> {
        validate_manifest(T::KIND, &manifest)
            .map_err(|e| RegistryError::validation(T::KIND, e))?;

        let key = manifest
            .get("execute")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let action = T::bind(&self.catalog, &key).ok_or_else(|| {
            RegistryError::validation(
                T::KIND,
                ValidationError::new("execute", format!("names no known {} action `{key}`", T::KIND)),
            )
        })?;

        // Validation treats null as absent; decoding must agree.
        if let Value::Object(fields) = &mut manifest {
            fields.retain(|_, value| !value.is_null());
        }

        let meta: HandlerMeta = serde_json::from_value(manifest).map_err(|e| {
            RegistryError::validation(T::KIND, ValidationError::new("<root>", e.to_string()))
        })?;

        Ok(HandlerDescriptor::new(meta, action))
    }

    pub fn resolve<T: LoadTarget>(
        &self,
        path: &Path,
    ) -> Result<HandlerDescriptor<T::Action>, RegistryError> {
        self.resolve_value::<T>(read_manifest(path)?)
    }

    /// Load, register and remember one file so it can be reloaded by name.
    pub fn load_one<T: LoadTarget>(
        &self,
        target: &T,
        path: &Path,
    ) -> Result<HandlerDescriptor<T::Action>, RegistryError> {
        let path = fs::canonicalize(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let descriptor = self.resolve::<T>(&path)?;
        target.register(descriptor.clone())?;
        target.record_source(&descriptor.meta.name, &path);
        Ok(descriptor)
    }

    /// Load every manifest under `dir`.
    ///
    /// A missing or unreadable `dir` is an error. A bad file is logged and
    /// skipped; its siblings still load.
    pub fn load_from_directory<T: LoadTarget>(
        &self,
        target: &T,
        dir: &Path,
    ) -> Result<Vec<HandlerDescriptor<T::Action>>, RegistryError> {
        let kind = T::KIND;
        let mut loaded = Vec::new();

        for path in collect_manifest_files(dir)? {
            match self.load_one(target, &path) {
                Ok(descriptor) => loaded.push(descriptor),
                Err(e) => error!(
                    %kind,
                    path = %path.display(),
                    error = %e,
                    "Skipping handler file"
                ),
            }
        }

        info!(%kind, dir = %dir.display(), count = loaded.len(), "Handlers loaded");
        Ok(loaded)
    }

    /// Re-read the file a handler came from and swap it in.
    ///
    /// The replacement is fully resolved first. If it fails to resolve or to
    /// register, the previous registration stays active.
    pub fn reload<T: LoadTarget>(
        &self,
        target: &T,
        name: &str,
    ) -> Result<HandlerDescriptor<T::Action>, RegistryError> {
        let path = target.source_of(name).ok_or_else(|| {
            if target.contains(name) {
                RegistryError::NoSource {
                    kind: T::KIND,
                    name: name.to_string(),
                }
            } else {
                RegistryError::NotFound {
                    kind: T::KIND,
                    name: name.to_string(),
                }
            }
        })?;

        let kind = T::KIND;
        let fresh = self.resolve::<T>(&path)?;
        let previous = target.unregister(name)?;

        if let Err(e) = target.register(fresh.clone()) {
            match target.register(previous) {
                Ok(()) => target.record_source(name, &path),
                Err(restore) => error!(
                    %kind,
                    name,
                    error = %restore,
                    "Could not restore handler after failed reload"
                ),
            }
            return Err(e);
        }

        target.record_source(&fresh.meta.name, &path);
        info!(%kind, name, "Handler reloaded");
        Ok(fresh)
    }
}
