//! Remote-control input: the button vocabulary typed at the prompt

use blueremote_shared::{parse_reserved_signal, DeviceId, RemoteCommand};

/// Number of user-bindable reserved buttons
pub const RESERVED_BUTTONS: usize = 2;

/// One parsed line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteInput {
    /// Press a driving button
    Command(RemoteCommand),
    /// Send arbitrary text as a signal
    Raw(String),
    /// Bind a reserved button (0-based slot)
    Bind { slot: usize, signal: char },
    /// Press a reserved button (0-based slot)
    Reserved(usize),
    Connect(DeviceId),
    Reconnect,
    Disconnect,
    Devices,
    History,
    ClearHistory,
    Status,
    Help,
    Quit,
}

/// Errors in user input
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InputError {
    #[error("unknown command {0:?} (try `help`)")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("no reserved button {0} (1-2)")]
    NoSuchButton(String),
    #[error("enter exactly one character")]
    InvalidBinding,
}

pub const HELP: &str = "\
driving:   f b l r s + -      (forward backward left right stop faster slower)
mode:      auto | manual
reserved:  bind <1|2> <char>, then r1 | r2
raw:       send <text>
link:      connect <address> | reconnect | disconnect | devices | status
other:     history | clear | help | quit";

fn slot(arg: &str) -> Result<usize, InputError> {
    match arg.parse::<usize>() {
        Ok(n) if (1..=RESERVED_BUTTONS).contains(&n) => Ok(n - 1),
        _ => Err(InputError::NoSuchButton(arg.to_string())),
    }
}

/// Parse one line. Blank lines yield `None`.
pub fn parse_input(line: &str) -> Result<Option<RemoteInput>, InputError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let input = match word.to_ascii_lowercase().as_str() {
        "f" | "forward" => RemoteInput::Command(RemoteCommand::Forward),
        "b" | "back" | "backward" => RemoteInput::Command(RemoteCommand::Backward),
        "l" | "left" => RemoteInput::Command(RemoteCommand::Left),
        "r" | "right" => RemoteInput::Command(RemoteCommand::Right),
        "s" | "stop" => RemoteInput::Command(RemoteCommand::Stop),
        "+" | "faster" => RemoteInput::Command(RemoteCommand::SpeedUp),
        "-" | "slower" => RemoteInput::Command(RemoteCommand::SpeedDown),
        "auto" => RemoteInput::Command(RemoteCommand::mode(true)),
        "manual" => RemoteInput::Command(RemoteCommand::mode(false)),
        "r1" | "r2" => RemoteInput::Reserved(slot(&word[1..])?),
        "bind" => {
            let (button, binding) = rest
                .split_once(char::is_whitespace)
                .ok_or(InputError::Usage("bind <1|2> <char>"))?;
            let signal =
                parse_reserved_signal(binding).map_err(|_| InputError::InvalidBinding)?;
            RemoteInput::Bind {
                slot: slot(button)?,
                signal,
            }
        }
        "send" if !rest.is_empty() => RemoteInput::Raw(rest.to_string()),
        "send" => return Err(InputError::Usage("send <text>")),
        "connect" => {
            let device = rest
                .parse::<DeviceId>()
                .map_err(|_| InputError::Usage("connect <address>"))?;
            RemoteInput::Connect(device)
        }
        "reconnect" => RemoteInput::Reconnect,
        "disconnect" => RemoteInput::Disconnect,
        "devices" => RemoteInput::Devices,
        "history" => RemoteInput::History,
        "clear" => RemoteInput::ClearHistory,
        "status" => RemoteInput::Status,
        "help" | "?" => RemoteInput::Help,
        "quit" | "exit" | "q" => RemoteInput::Quit,
        _ => return Err(InputError::Unknown(word.to_string())),
    };

    Ok(Some(input))
}

/// The reserved buttons and what they are bound to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReservedButtons {
    slots: [Option<char>; RESERVED_BUTTONS],
}

impl ReservedButtons {
    pub fn new(slots: [Option<char>; RESERVED_BUTTONS]) -> Self {
        Self { slots }
    }

    pub fn set(&mut self, slot: usize, signal: char) {
        if let Some(entry) = self.slots.get_mut(slot) {
            *entry = Some(signal);
        }
    }

    /// Command a press would send; unbound buttons send nothing
    pub fn press(&self, slot: usize) -> Option<RemoteCommand> {
        self.slots
            .get(slot)
            .copied()
            .flatten()
            .map(RemoteCommand::Custom)
    }
}
