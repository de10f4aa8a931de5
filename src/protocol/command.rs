//! Command definitions
//!
//! Parses the line-oriented text commands sent by clients.
//!
//! ## Grammar
//! ```text
//! GET <key>
//! SET <key> <value>
//! DEL <key>
//! PING [message]
//! ```
//!
//! Command names are case-insensitive. Any token may be wrapped in single or
//! double quotes to include spaces. A SET value is the rest of the line: either
//! one bare word or a single quoted string.

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Get a value by key
    Get { key: String },

    /// Set a key to a value
    Set { key: String, value: Vec<u8> },

    /// Delete a key
    Delete { key: String },

    /// Health check; echoes `message` or replies PONG
    Ping { message: Option<String> },
}

impl Command {
    /// Parse one command line; `None` if it is malformed or unknown
    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        let (name, rest) = next_token(line)?;
        let name = name.to_ascii_uppercase();

        if name == "PING" {
            let rest = rest.trim();
            if rest.is_empty() {
                return Some(Command::Ping { message: None });
            }
            let (message, rest) = next_token(rest)?;
            if !rest.trim().is_empty() || message.is_empty() {
                return None;
            }
            return Some(Command::Ping {
                message: Some(message.to_string()),
            });
        }

        let (key, rest) = next_token(rest.trim())?;
        if key.is_empty() {
            return None;
        }
        let key = key.to_string();
        let rest = rest.trim();

        match name.as_str() {
            "SET" => {
                let value = parse_value(rest)?;
                Some(Command::Set {
                    key,
                    value: value.as_bytes().to_vec(),
                })
            }
            "GET" if rest.is_empty() => Some(Command::Get { key }),
            "DEL" if rest.is_empty() => Some(Command::Delete { key }),
            _ => None,
        }
    }

    /// Command name as sent on the wire
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "GET",
            Command::Set { .. } => "SET",
            Command::Delete { .. } => "DEL",
            Command::Ping { .. } => "PING",
        }
    }

    /// Render as a command line that `parse` accepts (without the line ending)
    pub fn to_line(&self) -> String {
        match self {
            Command::Get { key } | Command::Delete { key } => {
                format!("{} {}", self.name(), quote(key))
            }
            Command::Set { key, value } => {
                let value = String::from_utf8_lossy(value);
                format!("{} {} {}", self.name(), quote(key), quote(&value))
            }
            Command::Ping { message: None } => self.name().to_string(),
            Command::Ping { message: Some(message) } => {
                format!("{} {}", self.name(), quote(message))
            }
        }
    }
}

/// Split the first token off `line`, returning it and the remainder
///
/// A token opened by a quote runs to the matching quote; an unterminated
/// quote is malformed.
fn next_token(line: &str) -> Option<(&str, &str)> {
    let first = line.chars().next()?;
    match first {
        '\'' | '"' => {
            let end = line[1..].find(first)? + 1;
            Some((&line[1..end], &line[end + 1..]))
        }
        _ => match line.find(char::is_whitespace) {
            Some(end) => Some((&line[..end], &line[end..])),
            None => Some((line, "")),
        },
    }
}

/// The SET value: one bare word, or the whole remainder wrapped in quotes
fn parse_value(rest: &str) -> Option<&str> {
    let first = rest.chars().next()?;
    let value = match first {
        '\'' | '"' => {
            if rest.len() < 2 || !rest.ends_with(first) {
                return None;
            }
            let inner = &rest[1..rest.len() - 1];
            if inner.contains(first) {
                return None;
            }
            inner
        }
        _ if rest.contains(char::is_whitespace) => return None,
        _ => rest,
    };

    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn quote(token: &str) -> String {
    if !token.is_empty() && !token.contains(char::is_whitespace) && !token.starts_with(['\'', '"']) {
        token.to_string()
    } else if token.contains('"') {
        format!("'{}'", token)
    } else {
        format!("\"{}\"", token)
    }
}
