//! Protocol Module
//!
//! Defines the wire protocol for client-server communication.
//!
//! ## Requests
//! Line-oriented text commands:
//! - `GET <key>`
//! - `SET <key> <value>`
//! - `DEL <key>`
//! - `PING [message]`
//!
//! ## Responses
//! - `+OK`: write succeeded
//! - `$<len>` followed by the bytes: a value
//! - `$-1`: key not found
//! - `-ERR <message>`: the command failed

mod codec;
mod command;
mod response;

pub use codec::{decode_response, encode_response, read_command, read_response};
pub use codec::{write_command, write_response, MAX_LINE_LENGTH};
pub use command::Command;
pub use response::{Response, Status};
