// Translation between serenity's command types and the platform-neutral
// invocation model.

use crate::core::dispatch::{Caller, Invocation, OptionValue, PermissionSet};
use crate::core::embeds::truncate_text;
use crate::core::handlers::{CommandOptionKind, HandlerMeta};
use serenity::all::{
    CommandDataOption, CommandDataOptionValue, CommandInteraction, CommandOptionType,
    CreateCommand, CreateCommandOption, Permissions,
};

/// Discord caps command and option descriptions at 100 characters.
const MAX_DESCRIPTION_LEN: usize = 100;

fn description_or_default(text: &str) -> String {
    if text.trim().is_empty() {
        "No description".to_string()
    } else {
        truncate_text(text, MAX_DESCRIPTION_LEN, "...")
    }
}

/// Permission flags as PascalCase names, e.g. `KickMembers`.
pub fn permission_names(permissions: Permissions) -> Vec<String> {
    permissions
        .get_permission_names()
        .into_iter()
        .map(|name| name.replace(' ', ""))
        .collect()
}

/// Inverse of [`permission_names`]. Unknown names are ignored.
pub fn permissions_from_names(names: &[String]) -> Permissions {
    Permissions::all()
        .iter()
        .filter(|flag| {
            permission_names(*flag)
                .first()
                .is_some_and(|name| names.contains(name))
        })
        .fold(Permissions::empty(), |acc, flag| acc | flag)
}

fn option_type(kind: CommandOptionKind) -> CommandOptionType {
    match kind {
        CommandOptionKind::String => CommandOptionType::String,
        CommandOptionKind::Integer => CommandOptionType::Integer,
        CommandOptionKind::Number => CommandOptionType::Number,
        CommandOptionKind::Boolean => CommandOptionType::Boolean,
        CommandOptionKind::User => CommandOptionType::User,
    }
}

/// Slash-command registration payload for one command.
pub fn create_command(meta: &HandlerMeta) -> CreateCommand {
    let mut command =
        CreateCommand::new(&meta.name).description(description_or_default(&meta.description));

    for option in &meta.options {
        command = command.add_option(
            CreateCommandOption::new(
                option_type(option.kind),
                &option.name,
                description_or_default(&option.description),
            )
            .required(option.required),
        );
    }

    if !meta.permissions.is_empty() {
        command = command.default_member_permissions(permissions_from_names(&meta.permissions));
    }
    command
}

fn option_value(value: &CommandDataOptionValue) -> Option<OptionValue> {
    match value {
        CommandDataOptionValue::String(text) => Some(OptionValue::String(text.clone())),
        CommandDataOptionValue::Integer(n) => Some(OptionValue::Integer(*n)),
        CommandDataOptionValue::Number(n) => Some(OptionValue::Number(*n)),
        CommandDataOptionValue::Boolean(b) => Some(OptionValue::Boolean(*b)),
        CommandDataOptionValue::User(id) => Some(OptionValue::User(id.get())),
        _ => None,
    }
}

/// Flatten a leading subcommand; returns its name and the options under it.
fn split_subcommand(options: &[CommandDataOption]) -> (Option<String>, &[CommandDataOption]) {
    match options.first() {
        Some(CommandDataOption {
            name,
            value: CommandDataOptionValue::SubCommand(nested),
            ..
        }) => (Some(name.clone()), nested.as_slice()),
        _ => (None, options),
    }
}

pub fn invocation_from(command: &CommandInteraction, guild_name: Option<String>) -> Invocation {
    let caller = Caller {
        id: command.user.id.get(),
        name: command.user.name.clone(),
    };
    let mut invocation = Invocation::new(command.data.name.clone(), caller);

    if let Some(guild_id) = command.guild_id {
        let granted = command
            .member
            .as_ref()
            .and_then(|member| member.permissions)
            .map(permission_names)
            .unwrap_or_default();
        invocation = invocation.in_guild(guild_id.get(), PermissionSet::new(granted));
        invocation.guild_name = guild_name;
    }

    let (subcommand, options) = split_subcommand(&command.data.options);
    invocation.subcommand = subcommand;
    for option in options {
        if let Some(value) = option_value(&option.value) {
            invocation = invocation.with_option(option.name.clone(), value);
        }
    }
    invocation
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::all::UserId;

    #[test]
    fn permission_names_are_pascal_case() {
        let names = permission_names(Permissions::KICK_MEMBERS | Permissions::ADMINISTRATOR);
        assert!(names.contains(&"KickMembers".to_string()));
        assert!(names.contains(&"Administrator".to_string()));
    }

    #[test]
    fn names_map_back_to_flags() {
        let flags = permissions_from_names(&["KickMembers".to_string(), "NotAThing".to_string()]);
        assert_eq!(flags, Permissions::KICK_MEMBERS);
    }

    #[test]
    fn option_values_convert() {
        assert_eq!(
            option_value(&CommandDataOptionValue::User(UserId::new(42))),
            Some(OptionValue::User(42))
        );
        assert_eq!(
            option_value(&CommandDataOptionValue::String("spam".into())),
            Some(OptionValue::String("spam".into()))
        );
    }

    #[test]
    fn descriptions_are_never_empty_or_too_long() {
        assert_eq!(description_or_default("  "), "No description");
        assert_eq!(description_or_default(&"x".repeat(300)).chars().count(), 100);
    }
}
