//! In-chat slash commands.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Quit,
    Details,
    Help,
    Unknown(String),
    /// Regular message; empty input maps to an empty message.
    Message(String),
}

pub fn parse_command(input: &str) -> ChatCommand {
    let trimmed = input.trim();

    if !trimmed.starts_with('/') {
        return ChatCommand::Message(trimmed.to_string());
    }

    let cmd = trimmed
        .split_whitespace()
        .next()
        .unwrap_or(trimmed)
        .to_lowercase();

    match cmd.as_str() {
        "/quit" | "/exit" | "/q" => ChatCommand::Quit,
        "/details" | "/d" => ChatCommand::Details,
        "/help" | "/?" => ChatCommand::Help,
        _ => ChatCommand::Unknown(cmd),
    }
}

pub fn help_text() -> &'static str {
    r#"
Chat Commands:
  /help, /?       Show this help message
  /details, /d    Toggle detailed view and show the last response in full
  /quit, /exit    Exit

Tips:
  - Press Ctrl+C while a response streams to cancel it
  - Press Ctrl+D at the prompt to exit
  - Up/Down arrows navigate history
"#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("/quit"), ChatCommand::Quit);
        assert_eq!(parse_command("/EXIT"), ChatCommand::Quit);
        assert_eq!(parse_command(" /q "), ChatCommand::Quit);
        assert_eq!(parse_command("/d"), ChatCommand::Details);
        assert_eq!(parse_command("/details now"), ChatCommand::Details);
        assert_eq!(parse_command("/?"), ChatCommand::Help);
    }

    #[test]
    fn test_parse_messages() {
        assert_eq!(
            parse_command("  fix the tests  "),
            ChatCommand::Message("fix the tests".into())
        );
        assert_eq!(parse_command(""), ChatCommand::Message(String::new()));
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            parse_command("/models"),
            ChatCommand::Unknown("/models".into())
        );
    }

    #[test]
    fn test_help_lists_commands() {
        let help = help_text();
        assert!(help.contains("/details"));
        assert!(help.contains("/quit"));
    }
}
