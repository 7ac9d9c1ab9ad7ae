// Shape validation for handler manifests.
//
// Runs on the raw JSON before typed decoding so a wrong type is reported
// against the field that carries it, not as a generic serde error. The same
// name rules are re-checked on typed metadata for handlers registered in code.

use super::handler_models::{HandlerKind, HandlerMeta};
use serde_json::{Map, Value};
use thiserror::Error;

/// Discord's limit for slash-command names.
const MAX_COMMAND_NAME_LEN: usize = 32;
const OPTION_TYPES: &[&str] = &["string", "integer", "number", "boolean", "user"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("field `{field}` {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Absent and `null` both count as "not provided".
fn present<'a>(object: &'a Map<String, Value>, field: &str) -> Option<&'a Value> {
    object.get(field).filter(|value| !value.is_null())
}

fn expect_string(object: &Map<String, Value>, field: &str) -> Result<(), ValidationError> {
    match present(object, field) {
        Some(Value::String(_)) | None => Ok(()),
        Some(_) => Err(ValidationError::new(field, "must be a string")),
    }
}

fn expect_bool(object: &Map<String, Value>, field: &str) -> Result<(), ValidationError> {
    match present(object, field) {
        Some(Value::Bool(_)) | None => Ok(()),
        Some(_) => Err(ValidationError::new(field, "must be a boolean")),
    }
}

fn expect_string_list(object: &Map<String, Value>, field: &str) -> Result<(), ValidationError> {
    match present(object, field) {
        None => Ok(()),
        Some(Value::Array(items)) if items.iter().all(Value::is_string) => Ok(()),
        Some(Value::Array(_)) => Err(ValidationError::new(field, "must only contain strings")),
        Some(_) => Err(ValidationError::new(field, "must be a list")),
    }
}

fn expect_cooldown(object: &Map<String, Value>) -> Result<(), ValidationError> {
    let cooldown = present(object, "cooldown");
    let cooldown_ms = present(object, "cooldownMs");

    if cooldown.is_some() && cooldown_ms.is_some() {
        return Err(ValidationError::new(
            "cooldown",
            "is given twice (use either cooldown or cooldownMs)",
        ));
    }

    let (field, value) = match (cooldown, cooldown_ms) {
        (Some(value), _) => ("cooldown", value),
        (_, Some(value)) => ("cooldownMs", value),
        _ => return Ok(()),
    };

    if value.is_u64() {
        Ok(())
    } else {
        Err(ValidationError::new(
            field,
            "must be a non-negative whole number of milliseconds",
        ))
    }
}

fn expect_options(object: &Map<String, Value>) -> Result<(), ValidationError> {
    let Some(value) = present(object, "options") else {
        return Ok(());
    };
    let Value::Array(items) = value else {
        return Err(ValidationError::new("options", "must be a list"));
    };

    for (index, item) in items.iter().enumerate() {
        let field = format!("options[{index}]");
        let Value::Object(option) = item else {
            return Err(ValidationError::new(field, "must be an object"));
        };

        match option.get("name") {
            Some(Value::String(name)) => check_command_name(name)
                .map_err(|reason| ValidationError::new(format!("{field}.name"), reason))?,
            _ => return Err(ValidationError::new(format!("{field}.name"), "must be a string")),
        }
        if !matches!(option.get("description"), Some(Value::String(_))) {
            return Err(ValidationError::new(
                format!("{field}.description"),
                "must be a string",
            ));
        }
        match option.get("type") {
            Some(Value::String(kind)) if OPTION_TYPES.contains(&kind.as_str()) => {}
            _ => {
                return Err(ValidationError::new(
                    format!("{field}.type"),
                    format!("must be one of {}", OPTION_TYPES.join(", ")),
                ))
            }
        }
        if !matches!(option.get("required"), None | Some(Value::Bool(_))) {
            return Err(ValidationError::new(
                format!("{field}.required"),
                "must be a boolean",
            ));
        }
    }

    Ok(())
}

/// Lowercase letters, digits, `-` and `_`, 1 to 32 characters.
fn check_command_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name.chars().count() > MAX_COMMAND_NAME_LEN {
        return Err(format!("must be 1-{MAX_COMMAND_NAME_LEN} characters long"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err("may only contain lowercase letters, digits, '-' and '_'".to_string());
    }
    Ok(())
}

fn check_name(kind: HandlerKind, name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::new("name", "must be a non-empty string"));
    }
    if kind == HandlerKind::Command {
        check_command_name(name).map_err(|reason| ValidationError::new("name", reason))?;
    }
    Ok(())
}

/// Validate a raw handler manifest.
///
/// Checks presence of `name` and `execute`, then the type of every optional
/// field that is present.
pub fn validate_manifest(kind: HandlerKind, value: &Value) -> Result<(), ValidationError> {
    let Value::Object(object) = value else {
        return Err(ValidationError::new("<root>", "must be a JSON object"));
    };

    match present(object, "name") {
        Some(Value::String(name)) => check_name(kind, name)?,
        _ => return Err(ValidationError::new("name", "must be a non-empty string")),
    }

    match present(object, "execute") {
        Some(Value::String(key)) if !key.trim().is_empty() => {}
        _ => {
            return Err(ValidationError::new(
                "execute",
                "must name the action to invoke",
            ))
        }
    }

    expect_string(object, "description")?;
    expect_string(object, "category")?;
    expect_cooldown(object)?;
    expect_string_list(object, "permissions")?;
    expect_string_list(object, "aliases")?;
    expect_bool(object, "once")?;
    expect_bool(object, "enabled")?;
    expect_string(object, "usage")?;
    expect_string_list(object, "examples")?;
    expect_options(object)?;
    expect_string(object, "type")?;

    Ok(())
}

/// Validate metadata built in code, before it reaches a registry.
pub fn validate_meta(kind: HandlerKind, meta: &HandlerMeta) -> Result<(), ValidationError> {
    check_name(kind, &meta.name)?;

    if meta.permissions.iter().any(|p| p.trim().is_empty()) {
        return Err(ValidationError::new(
            "permissions",
            "must not contain empty identifiers",
        ));
    }
    if meta.aliases.iter().any(|a| a.trim().is_empty()) {
        return Err(ValidationError::new("aliases", "must not contain empty strings"));
    }
    for (index, option) in meta.options.iter().enumerate() {
        check_command_name(&option.name)
            .map_err(|reason| ValidationError::new(format!("options[{index}].name"), reason))?;
    }

    Ok(())
}
