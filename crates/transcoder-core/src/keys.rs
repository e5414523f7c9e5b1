//! Interactive key handling and the `c`/`C` command
//! grammar.

use std::time::Duration;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Help,
    RaiseVerbosity,
    LowerVerbosity,
    /// `c`: send a one-shot command immediately.
    SendCommand,
    /// `C`: queue/broadcast a command, possibly for later media time.
    QueueCommand,
    GracefulStop,
    ToggleHexDump,
    ShowQpHistogram,
    Unknown(char),
}

pub fn key_to_action(c: char) -> KeyAction {
    match c {
        '?' => KeyAction::Help,
        '+' => KeyAction::RaiseVerbosity,
        '-' => KeyAction::LowerVerbosity,
        'c' => KeyAction::SendCommand,
        'C' => KeyAction::QueueCommand,
        'q' => KeyAction::GracefulStop,
        'h' => KeyAction::ToggleHexDump,
        's' => KeyAction::ShowQpHistogram,
        other => KeyAction::Unknown(other),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandTarget {
    All,
    Named(String),
}

/// A parsed `c`/`C` command: `<target>|all <time>|-1 <command>[ <argument>]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCommand {
    pub target: CommandTarget,
    /// `None` when `time` was `-1` (immediate); `Some` otherwise.
    pub time: Option<f64>,
    pub command: String,
    pub argument: Option<String>,
}

/// Parses the grammar. Does not yet validate the immediate/queued legality
/// rule; see [`validate_for_key`].
pub fn parse_command(input: &str) -> Result<FilterCommand, CoreError> {
    let mut parts = input.trim().splitn(4, ' ');
    let target_s = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CoreError::Configuration("empty command".into()))?;
    let time_s = parts
        .next()
        .ok_or_else(|| CoreError::Configuration("command missing time field".into()))?;
    let command = parts
        .next()
        .ok_or_else(|| CoreError::Configuration("command missing verb".into()))?
        .to_string();
    let argument = parts.next().map(|s| s.to_string());

    let target = if target_s == "all" {
        CommandTarget::All
    } else {
        CommandTarget::Named(target_s.to_string())
    };

    let time = if time_s == "-1" {
        None
    } else {
        let t: f64 = time_s
            .parse()
            .map_err(|_| CoreError::Configuration(format!("bad time field {time_s:?}")))?;
        if t < 0.0 {
            None
        } else {
            Some(t)
        }
    };

    Ok(FilterCommand {
        target,
        time,
        command,
        argument,
    })
}

/// A time-qualified command is only legal when queued via `C`.
pub fn validate_for_key(cmd: &FilterCommand, is_broadcast_queue: bool) -> Result<(), CoreError> {
    if cmd.time.is_some() && !is_broadcast_queue {
        return Err(CoreError::Configuration(
            "a time-qualified command is only legal with the C key".into(),
        ));
    }
    Ok(())
}

/// Polls stdin (already in raw mode) for one key press within `timeout`.
pub fn poll_key(timeout: Duration) -> std::io::Result<Option<char>> {
    use crossterm::event::{self, Event, KeyCode};
    if !event::poll(timeout)? {
        return Ok(None);
    }
    if let Event::Key(key) = event::read()? {
        if let KeyCode::Char(c) = key.code {
            return Ok(Some(c));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_immediate_command() {
        let cmd = parse_command("all -1 mute").unwrap();
        assert_eq!(cmd.target, CommandTarget::All);
        assert_eq!(cmd.time, None);
        assert_eq!(cmd.command, "mute");
        assert_eq!(cmd.argument, None);
    }

    #[test]
    fn parses_queued_command_with_argument() {
        let cmd = parse_command("vol 12.5 volume 0.5").unwrap();
        assert_eq!(cmd.target, CommandTarget::Named("vol".into()));
        assert_eq!(cmd.time, Some(12.5));
        assert_eq!(cmd.command, "volume");
        assert_eq!(cmd.argument, Some("0.5".into()));
    }

    #[test]
    fn queued_command_illegal_on_one_shot_key() {
        let cmd = parse_command("all 5.0 mute").unwrap();
        assert!(validate_for_key(&cmd, false).is_err());
        assert!(validate_for_key(&cmd, true).is_ok());
    }

    #[test]
    fn key_table_maps_known_keys() {
        assert_eq!(key_to_action('?'), KeyAction::Help);
        assert_eq!(key_to_action('q'), KeyAction::GracefulStop);
        assert_eq!(key_to_action('C'), KeyAction::QueueCommand);
    }
}
