//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single acceptor thread polling a non-blocking listener
//! - Worker thread pool fed through a bounded queue
//! - Commands routed through `Store::execute`

mod connection;
mod server;

pub use connection::Connection;
pub use server::Server;
