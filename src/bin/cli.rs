//! Bytecask CLI Client
//!
//! Command-line interface for interacting with a Bytecask server.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::process;
use std::time::Duration;

use bytecask::protocol::{read_response, write_command, Command, Response, Status};
use bytecask::Result;
use clap::{Parser, Subcommand};

/// Bytecask CLI
#[derive(Parser, Debug)]
#[command(name = "bytecask-cli")]
#[command(about = "CLI for the Bytecask key-value store")]
#[command(version)]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:6969")]
    server: String,

    /// Socket timeout in milliseconds
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Delete a key
    Del {
        /// The key to delete
        key: String,
    },

    /// Ping the server
    Ping {
        /// Message to echo back instead of PONG
        message: Option<String>,
    },
}

impl From<Commands> for Command {
    fn from(command: Commands) -> Self {
        match command {
            Commands::Get { key } => Command::Get { key },
            Commands::Set { key, value } => Command::Set {
                key,
                value: value.into_bytes(),
            },
            Commands::Del { key } => Command::Delete { key },
            Commands::Ping { message } => Command::Ping { message },
        }
    }
}

fn main() {
    let args = Args::parse();

    match send(&args.server, args.timeout_ms, args.command.into()) {
        Ok(response) => {
            let failed = response.status == Status::Error;
            print_response(&response);
            if failed {
                process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(2);
        }
    }
}

fn send(addr: &str, timeout_ms: u64, command: Command) -> Result<Response> {
    let stream = TcpStream::connect(addr)?;
    let timeout = Some(Duration::from_millis(timeout_ms));
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;

    let mut writer = BufWriter::new(stream.try_clone()?);
    let mut reader = BufReader::new(stream);

    write_command(&mut writer, &command)?;
    read_response(&mut reader)
}

fn print_response(response: &Response) {
    match response.status {
        Status::Ok => match response.payload_str() {
            Some(value) => println!("{}", value),
            None => println!("OK"),
        },
        Status::NotFound => println!("(nil)"),
        Status::Error => eprintln!("(error) {}", response.payload_str().unwrap_or_default()),
    }
}
