//! TCP Server
//!
//! Accepts connections and dispatches them to a fixed pool of worker threads.

use std::io::{self, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, TrySendError};

use crate::config::Config;
use crate::error::{BytecaskError, Result};
use crate::store::Store;

use super::Connection;

/// Sleep between polls of the non-blocking listener
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// TCP server for Bytecask
pub struct Server {
    config: Config,
    store: Arc<Store>,
    listener: Option<TcpListener>,
    shutdown: Arc<AtomicBool>,
}

impl Server {
    /// Create a new server with the given config and store
    pub fn new(config: Config, store: Arc<Store>) -> Self {
        Self {
            config,
            store,
            listener: None,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bind the listen address; `run` binds on its own if this was skipped
    pub fn bind(&mut self) -> Result<SocketAddr> {
        if let Some(listener) = &self.listener {
            return Ok(listener.local_addr()?);
        }

        let listener = TcpListener::bind(&self.config.listen_addr).map_err(|e| {
            BytecaskError::Network(format!("failed to bind {}: {}", self.config.listen_addr, e))
        })?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        tracing::info!("Listening on {}", addr);
        self.listener = Some(listener);
        Ok(addr)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Flag that stops the server once set; clone it to stop from another thread
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Start the server (blocking until shutdown)
    ///
    /// Accepted streams are queued on a bounded channel drained by
    /// `max_connections` workers. When the queue is full the client is told
    /// the server is busy and disconnected.
    pub fn run(&mut self) -> Result<()> {
        self.bind()?;
        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => return Err(BytecaskError::Network("listener not bound".to_string())),
        };

        let (tx, rx) = channel::bounded::<TcpStream>(self.config.max_connections);
        let workers = self.spawn_workers(&rx)?;
        drop(rx);

        while !self.shutdown.load(Ordering::Acquire) {
            match listener.accept() {
                Ok((stream, addr)) => {
                    tracing::trace!("Accepted connection from {}", addr);
                    match tx.try_send(stream) {
                        Ok(()) => {}
                        Err(TrySendError::Full(mut stream)) => {
                            tracing::warn!("Connection queue full, rejecting {}", addr);
                            let _ = stream.write_all(b"-ERR server busy\r\n");
                        }
                        Err(TrySendError::Disconnected(_)) => {
                            tracing::error!("All connection workers exited");
                            break;
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        tracing::info!("Server shutting down, waiting for {} workers", workers.len());
        drop(tx);
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("Connection worker panicked");
            }
        }
        Ok(())
    }

    /// Signal the server to shutdown gracefully
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    fn spawn_workers(&self, rx: &Receiver<TcpStream>) -> Result<Vec<JoinHandle<()>>> {
        let mut workers = Vec::with_capacity(self.config.max_connections);

        for id in 0..self.config.max_connections {
            let rx = rx.clone();
            let store = Arc::clone(&self.store);
            let shutdown = Arc::clone(&self.shutdown);
            let (read_ms, write_ms) = (self.config.read_timeout_ms, self.config.write_timeout_ms);

            let worker = thread::Builder::new()
                .name(format!("bytecask-worker-{}", id))
                .spawn(move || {
                    for stream in rx.iter() {
                        serve(stream, &store, &shutdown, read_ms, write_ms);
                    }
                })?;
            workers.push(worker);
        }

        Ok(workers)
    }
}

fn serve(
    stream: TcpStream,
    store: &Arc<Store>,
    shutdown: &Arc<AtomicBool>,
    read_ms: u64,
    write_ms: u64,
) {
    let result = Connection::new(stream, Arc::clone(store), Arc::clone(shutdown)).and_then(
        |mut connection| {
            connection.set_timeouts(read_ms, write_ms)?;
            connection.handle()
        },
    );

    if let Err(e) = result {
        tracing::debug!("Connection ended with error: {}", e);
    }
}
