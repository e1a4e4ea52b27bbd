//! Slash command parsing for the chat application.
//!
//! Commands start with `/` and take the place of sidebar controls: they
//! change the role and generation settings or inspect the session without
//! sending anything to the API.

use crate::chat::config::validate_max_tokens;
use crate::chat::role::UserRole;

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Switch role, or show the current one when `None`.
    Role(Option<UserRole>),

    /// Set the sampling temperature.
    Temperature(f32),

    /// Set the maximum tokens per response.
    MaxTokens(u32),

    /// Clear the conversation and start a new binding.
    Reset,

    /// Replay the conversation so far.
    History,

    /// Show the current configuration.
    ShowConfig,

    /// Display session statistics.
    Stats,

    /// Describe the assistant and show the disclaimer.
    About,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a valid command,
/// or `None` if it should be treated as a regular question.
///
/// # Examples
///
/// ```
/// # use urochat::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/role student").is_some());
/// assert!(parse_command("What is a kidney stone?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "role" => match argument {
            Some(arg) => match arg.parse::<UserRole>() {
                Ok(role) => ChatCommand::Role(Some(role)),
                Err(err) => ChatCommand::Invalid(format!("/role: {err}")),
            },
            None => ChatCommand::Role(None),
        },
        "temperature" | "temp" => match argument {
            Some(arg) => match parse_f32_in_range(arg, 0.0, 1.0) {
                Ok(value) => ChatCommand::Temperature(value),
                Err(err) => ChatCommand::Invalid(format!("/temperature {err}")),
            },
            None => ChatCommand::Invalid("/temperature requires a value".to_string()),
        },
        "max_tokens" => match parse_u32_command(argument, "/max_tokens") {
            Ok(value) => match validate_max_tokens(value) {
                Ok(()) => ChatCommand::MaxTokens(value),
                Err(err) => ChatCommand::Invalid(format!("/max_tokens: {err}")),
            },
            Err(invalid) => invalid,
        },
        "reset" | "clear" => ChatCommand::Reset,
        "history" => ChatCommand::History,
        "config" => ChatCommand::ShowConfig,
        "stats" | "status" => ChatCommand::Stats,
        "about" => ChatCommand::About,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

fn parse_u32_command(argument: Option<&str>, name: &str) -> Result<u32, ChatCommand> {
    match argument {
        Some(arg) => arg
            .parse::<u32>()
            .map_err(|_| ChatCommand::Invalid(format!("{} expects a positive integer", name))),
        None => Err(ChatCommand::Invalid(format!("{} requires a value", name))),
    }
}

fn parse_f32_in_range(value: &str, min: f32, max: f32) -> Result<f32, String> {
    let parsed: f32 = value
        .parse()
        .map_err(|_| format!("expects a value between {min} and {max}"))?;
    if parsed.is_finite() && parsed >= min && parsed <= max {
        Ok(parsed)
    } else {
        Err(format!("expects a value between {min} and {max}"))
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /role [role]           Show or set your role (patient, student, urologist)
  /temperature <v>       Set response specificity 0.0-1.0
  /max_tokens <n>        Set max response length (512-8192, steps of 512)
  /reset                 Clear chat history (alias: /clear)
  /history               Replay the conversation
  /config                Show current configuration
  /stats                 Show session statistics
  /about                 About this assistant
  /help                  Show this help message
  /quit                  Exit the chat"#
}

/// Returns the description and disclaimer of the assistant.
pub fn about_text() -> &'static str {
    r#"Urology Assistant Features:
  - Powered by Gemini 2.5 Pro (preview-03-25)
  - Tailored responses for patients, students, and professionals
  - Symptom lists with visual findings descriptions
  - Diagnostic and treatment information

Disclaimer:
  This tool provides general medical information only and is not a substitute
  for professional medical advice, diagnosis, or treatment."#
}
