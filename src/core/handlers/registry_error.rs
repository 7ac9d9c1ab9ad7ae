use super::handler_models::HandlerKind;
use super::handler_validation::ValidationError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{kind} rejected: {source}")]
    Validation {
        kind: HandlerKind,
        #[source]
        source: ValidationError,
    },

    #[error("{kind} `{name}` is already registered")]
    DuplicateName { kind: HandlerKind, name: String },

    #[error("{kind} `{name}` is not registered")]
    NotFound { kind: HandlerKind, name: String },

    #[error("{kind} `{name}` was not loaded from a file, so it cannot be reloaded")]
    NoSource { kind: HandlerKind, name: String },

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} is not valid JSON: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl RegistryError {
    pub fn validation(kind: HandlerKind, source: ValidationError) -> Self {
        RegistryError::Validation { kind, source }
    }

    /// Unknown name, or a name with nothing to reload from.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RegistryError::NotFound { .. } | RegistryError::NoSource { .. }
        )
    }

    /// Field named by a validation failure, if that is what this is.
    pub fn invalid_field(&self) -> Option<&str> {
        match self {
            RegistryError::Validation { source, .. } => Some(&source.field),
            _ => None,
        }
    }
}
