//! Protocol codec
//!
//! Reading and writing of the wire protocol.
//!
//! ## Wire Format
//!
//! ### Request
//! One text command per line, terminated by `\n` (or `\r\n`), at most
//! `MAX_LINE_LENGTH` bytes.
//!
//! ### Response
//! ```text
//! +OK\r\n                    success without a value
//! $<len>\r\n<bytes>\r\n      value (GET, PING)
//! $-1\r\n                    key not found
//! -ERR <message>\r\n         error
//! ```

use std::io::{self, BufRead, Read, Write};

use crate::error::{BytecaskError, Result};

use super::{Command, Response, Status};

/// Maximum command line length (50 KiB)
pub const MAX_LINE_LENGTH: usize = 50 * 1024;

/// Maximum value length accepted when decoding a response
pub const MAX_BULK_LENGTH: usize = 512 * 1024 * 1024;

// =============================================================================
// Commands
// =============================================================================

/// Read one command line from a stream
///
/// Returns `Ok(None)` for a line that does not parse as a command. A closed
/// stream is reported as `UnexpectedEof`; an overlong line is a protocol error.
pub fn read_command<R: BufRead>(reader: &mut R) -> Result<Option<Command>> {
    let line = read_line(reader, MAX_LINE_LENGTH)?;
    Ok(Command::parse(&line))
}

/// Write a command line to a stream
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    writer.write_all(command.to_line().as_bytes())?;
    writer.write_all(b"\r\n")?;
    writer.flush()?;
    Ok(())
}

// =============================================================================
// Responses
// =============================================================================

/// Encode a response to bytes
pub fn encode_response(response: &Response) -> Vec<u8> {
    match (response.status, &response.payload) {
        (Status::Ok, None) => b"+OK\r\n".to_vec(),
        (Status::Ok, Some(payload)) => {
            let mut message = format!("${}\r\n", payload.len()).into_bytes();
            message.extend_from_slice(payload);
            message.extend_from_slice(b"\r\n");
            message
        }
        (Status::NotFound, _) => b"$-1\r\n".to_vec(),
        (Status::Error, payload) => {
            let text = payload
                .as_ref()
                .map(|p| String::from_utf8_lossy(p).replace(['\r', '\n'], " "))
                .unwrap_or_default();
            format!("-ERR {}\r\n", text).into_bytes()
        }
    }
}

/// Write a response to a stream
pub fn write_response<W: Write>(writer: &mut W, response: &Response) -> Result<()> {
    writer.write_all(&encode_response(response))?;
    writer.flush()?;
    Ok(())
}

/// Read a complete response from a stream
pub fn read_response<R: BufRead>(reader: &mut R) -> Result<Response> {
    let line = read_line(reader, MAX_LINE_LENGTH)?;

    match line.as_bytes().first().copied() {
        Some(b'+') if &line[1..] == "OK" => Ok(Response::ok(None)),
        Some(b'+') => Ok(Response::ok(Some(line[1..].as_bytes().to_vec()))),
        Some(b'-') => {
            let message = line[1..].strip_prefix("ERR").unwrap_or(&line[1..]).trim_start();
            Ok(Response::error(message))
        }
        Some(b'$') => {
            let len: i64 = line[1..].parse().map_err(|_| {
                BytecaskError::Protocol(format!("invalid bulk length {:?}", &line[1..]))
            })?;
            if len < 0 {
                return Ok(Response::not_found());
            }
            let len = len as usize;
            if len > MAX_BULK_LENGTH {
                return Err(BytecaskError::Protocol(format!(
                    "bulk value too large: {} bytes (max {})",
                    len, MAX_BULK_LENGTH
                )));
            }

            let mut payload = vec![0u8; len + 2];
            reader.read_exact(&mut payload)?;
            if &payload[len..] != b"\r\n" {
                return Err(BytecaskError::Protocol(
                    "bulk value is not terminated by CRLF".to_string(),
                ));
            }
            payload.truncate(len);
            Ok(Response::ok(Some(payload)))
        }
        _ => Err(BytecaskError::Protocol(format!(
            "unrecognized response line {:?}",
            line
        ))),
    }
}

/// Decode a response from bytes
pub fn decode_response(mut bytes: &[u8]) -> Result<Response> {
    read_response(&mut bytes)
}

// =============================================================================
// Line helpers
// =============================================================================

/// Read one `\n`-terminated line of at most `max` bytes, without the line ending
fn read_line<R: BufRead>(reader: &mut R, max: usize) -> Result<String> {
    let mut buf = Vec::with_capacity(64);
    let read = reader.take(max as u64 + 1).read_until(b'\n', &mut buf)?;

    if read == 0 {
        return Err(BytecaskError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed",
        )));
    }
    if buf.last() != Some(&b'\n') && buf.len() > max {
        return Err(BytecaskError::Protocol(format!(
            "input too long, max input is {} bytes",
            max
        )));
    }

    while matches!(buf.last(), Some(&b'\n') | Some(&b'\r')) {
        buf.pop();
    }
    String::from_utf8(buf)
        .map_err(|_| BytecaskError::Protocol("line is not valid UTF-8".to_string()))
}
