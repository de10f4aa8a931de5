//! Maintenance loops
//!
//! Three independent background threads, each on its own ticker:
//! - flush: persist the hint file and sync the active datafile
//! - rotate: switch to a fresh active datafile once the current one is full
//! - compact: merge the live generation into a single datafile
//!
//! A failed run is logged and the loop keeps ticking. Shutdown closes a
//! channel every loop selects on, so no loop sleeps through it.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, Sender};
use crossbeam::select;

use crate::error::{BytecaskError, Result};

use super::{CompactionOutcome, Store};

/// Handle owning the background maintenance threads of a store
pub struct Maintenance {
    store: Arc<Store>,
    shutdown_tx: Option<Sender<()>>,
    handles: Vec<JoinHandle<()>>,
}

impl Maintenance {
    /// Spawn the flush, rotation and compaction loops for `store`
    pub fn start(store: Arc<Store>) -> Result<Self> {
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        let config = store.config().clone();

        let mut maintenance = Self {
            store,
            shutdown_tx: Some(shutdown_tx),
            handles: Vec::with_capacity(3),
        };

        let loops: [(&str, Duration, fn(&Store)); 3] = [
            ("flush", config.flush_interval, run_flush),
            ("rotate", config.rotation_interval, run_rotation),
            ("compact", config.compaction_interval, run_compaction),
        ];

        for (name, interval, task) in loops {
            let store = Arc::clone(&maintenance.store);
            let shutdown = shutdown_rx.clone();
            let spawned = thread::Builder::new()
                .name(format!("bytecask-{}", name))
                .spawn(move || run_loop(name, interval, &store, &shutdown, task));

            match spawned {
                Ok(handle) => maintenance.handles.push(handle),
                Err(e) => {
                    // Dropping `maintenance` stops the loops already running
                    return Err(BytecaskError::Io(e));
                }
            }
        }

        tracing::info!(
            "Maintenance started (flush every {:?}, rotate every {:?}, compact every {:?})",
            config.flush_interval,
            config.rotation_interval,
            config.compaction_interval
        );
        Ok(maintenance)
    }

    /// Stop every loop, wait for in-flight work, then shut the store down
    pub fn shutdown(mut self) -> Result<()> {
        self.stop();
        self.store.shutdown()
    }

    fn stop(&mut self) {
        // An in-flight compaction aborts instead of finishing its rewrite
        self.store.set_cancel(true);
        // Disconnecting the channel wakes every `select!`
        self.shutdown_tx.take();

        for handle in self.handles.drain(..) {
            let name = handle.thread().name().unwrap_or("maintenance").to_string();
            if handle.join().is_err() {
                tracing::error!("Maintenance thread {} panicked", name);
            }
        }
        self.store.set_cancel(false);
    }
}

impl Drop for Maintenance {
    fn drop(&mut self) {
        if !self.handles.is_empty() {
            self.stop();
        }
    }
}

fn run_loop(
    name: &str,
    interval: Duration,
    store: &Store,
    shutdown: &Receiver<()>,
    task: fn(&Store),
) {
    let ticker = channel::tick(interval);
    loop {
        select! {
            recv(shutdown) -> _ => {
                tracing::info!("Canceling {} loop", name);
                return;
            }
            recv(ticker) -> _ => {
                if store.is_shut_down() {
                    return;
                }
                task(store);
            }
        }
    }
}

fn run_flush(store: &Store) {
    if let Err(e) = store.flush() {
        tracing::error!("Periodic flush failed: {}", e);
    }
}

fn run_rotation(store: &Store) {
    if let Err(e) = store.rotate_if_full() {
        tracing::error!("Periodic rotation failed: {}", e);
    }
}

fn run_compaction(store: &Store) {
    match store.compact() {
        Ok(CompactionOutcome::Skipped) => {
            tracing::debug!("Periodic compaction skipped");
        }
        Ok(CompactionOutcome::Completed(_)) => {}
        Err(e @ BytecaskError::CompactionAborted(_)) => {
            tracing::warn!("Periodic compaction did not complete: {}", e);
        }
        Err(e) => tracing::error!("Periodic compaction failed: {}", e),
    }
}
