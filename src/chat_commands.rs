use chatsweep_storage::chat_state::JoinNameUpdate;

pub const GREETING: &str =
    "Hello, this is a (*group) chat cleaning bot. Please, use /help command to get more info.";

pub const START_TEXT: &str = "Hello there! This is a bot designed to cleanup messages in a group chat. Use /help command to get some additional info.";

pub const HELP_TEXT: &str = "Use /cleanup to remove recent messages in a group chat (admin rights required).\n\
Use /setup_join_config <name> in a group to let people ask for an invite with /join <name>.\n\
See /restrictions for what can and cannot be deleted.";

pub const RESTRICTIONS_TEXT: &str = "Message deletion limitations (see https://core.telegram.org/bots/api#deletemessage):
- A message can only be deleted if it was sent less than 48 hours ago.
- Bots can delete outgoing messages in private chats, groups, and supergroups.
- Bots can delete incoming messages in private chats.
- If the bot is an administrator of a group, it can delete any message there.
- If the bot has can_delete_messages permission in a supergroup or a channel, it can delete any message there.

NOTE: Bots aren't able to see messages from other bots regardless of mode (https://core.telegram.org/bots/faq).";

pub const GROUP_ONLY_TEXT: &str =
    "This command is not supposed to work here. Use /help to get more info.";
pub const ADMIN_ONLY_TEXT: &str = "Only chat administrators can request a cleanup.";
pub const NOT_ENOUGH_ARGUMENTS_TEXT: &str = "Not enough arguments.";
pub const UNKNOWN_JOIN_NAME_TEXT: &str = "Can't find the chat.";
pub const JOIN_LINK_FAILED_TEXT: &str = "Failed to create the link.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Start,
    Help,
    Version,
    Restrictions,
    Cleanup,
    /// `None` when the name argument is missing.
    SetupJoinConfig(Option<String>),
    Join(Option<String>),
}

/// Parses a bot command, tolerating a `/command@botname` suffix.
///
/// A suffix naming another bot means the command is not ours. Unknown
/// commands return `None` so the message is only retained.
pub fn parse_command(text: &str, bot_username: &str) -> Option<ChatCommand> {
    let trimmed = text.trim_start();
    let rest = trimmed.strip_prefix('/')?;
    let head_end = rest
        .char_indices()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, _)| i)
        .unwrap_or(rest.len());
    let (head, args) = rest.split_at(head_end);
    let name = match head.split_once('@') {
        Some((name, target)) => {
            if !target.eq_ignore_ascii_case(bot_username.trim_start_matches('@')) {
                return None;
            }
            name
        }
        None => head,
    };
    let arg = {
        let arg = args.trim();
        (!arg.is_empty()).then(|| arg.to_string())
    };

    match name.to_ascii_lowercase().as_str() {
        "start" => Some(ChatCommand::Start),
        "help" => Some(ChatCommand::Help),
        "version" => Some(ChatCommand::Version),
        "restrictions" => Some(ChatCommand::Restrictions),
        "cleanup" => Some(ChatCommand::Cleanup),
        "setup_join_config" => Some(ChatCommand::SetupJoinConfig(arg)),
        "join" => Some(ChatCommand::Join(arg)),
        _ => None,
    }
}

pub fn version_text() -> String {
    format!("chatsweep {}", env!("CARGO_PKG_VERSION"))
}

pub fn join_config_response(name: &str, update: JoinNameUpdate) -> String {
    match update {
        JoinNameUpdate::Set => "Chat join parameters have been set.".to_string(),
        JoinNameUpdate::Updated => "Chat join parameters have been updated.".to_string(),
        JoinNameUpdate::Taken => {
            format!("'{name}' is already taken. Please, use something else.")
        }
    }
}

pub fn invite_link_response(link: &str) -> String {
    format!("Here is your invite link: {link}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_commands() {
        assert_eq!(parse_command("/start", "sweepbot"), Some(ChatCommand::Start));
        assert_eq!(parse_command("/help", "sweepbot"), Some(ChatCommand::Help));
        assert_eq!(parse_command("/version", "sweepbot"), Some(ChatCommand::Version));
        assert_eq!(
            parse_command("/restrictions", "sweepbot"),
            Some(ChatCommand::Restrictions)
        );
        assert_eq!(parse_command("  /cleanup", "sweepbot"), Some(ChatCommand::Cleanup));
    }

    #[test]
    fn test_parse_with_bot_suffix() {
        assert_eq!(
            parse_command("/cleanup@SweepBot", "sweepbot"),
            Some(ChatCommand::Cleanup)
        );
        assert_eq!(
            parse_command("/cleanup@sweepbot", "@sweepbot"),
            Some(ChatCommand::Cleanup)
        );
        assert_eq!(parse_command("/cleanup@otherbot", "sweepbot"), None);
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(
            parse_command("/setup_join_config   Book Club  ", "sweepbot"),
            Some(ChatCommand::SetupJoinConfig(Some("Book Club".into())))
        );
        assert_eq!(
            parse_command("/join@sweepbot club", "sweepbot"),
            Some(ChatCommand::Join(Some("club".into())))
        );
        assert_eq!(
            parse_command("/join", "sweepbot"),
            Some(ChatCommand::Join(None))
        );
        assert_eq!(
            parse_command("/setup_join_config   ", "sweepbot"),
            Some(ChatCommand::SetupJoinConfig(None))
        );
    }

    #[test]
    fn test_non_commands_are_ignored() {
        assert_eq!(parse_command("hello /cleanup", "sweepbot"), None);
        assert_eq!(parse_command("/unknown", "sweepbot"), None);
        assert_eq!(parse_command("/", "sweepbot"), None);
        assert_eq!(parse_command("", "sweepbot"), None);
    }

    #[test]
    fn test_join_config_responses() {
        assert_eq!(
            join_config_response("club", JoinNameUpdate::Set),
            "Chat join parameters have been set."
        );
        assert_eq!(
            join_config_response("club", JoinNameUpdate::Updated),
            "Chat join parameters have been updated."
        );
        assert_eq!(
            join_config_response("club", JoinNameUpdate::Taken),
            "'club' is already taken. Please, use something else."
        );
    }

    #[test]
    fn test_version_text_carries_crate_version() {
        assert!(version_text().ends_with(env!("CARGO_PKG_VERSION")));
    }
}
