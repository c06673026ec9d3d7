//! OS signal handling.
//!
//! # Responsibilities
//! - Listen for SIGHUP, SIGINT, SIGTERM and SIGQUIT
//! - Close the server on the first one received
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - Only the first signal acts; later ones are ignored
//! - Sources are a trait so tests can feed signals through a channel

use std::fmt;
use std::future::Future;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::server::ServerCloser;

/// Termination signals the process reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Hangup,
    Interrupt,
    Terminate,
    Quit,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Signal::Hangup => "SIGHUP",
            Signal::Interrupt => "SIGINT",
            Signal::Terminate => "SIGTERM",
            Signal::Quit => "SIGQUIT",
        };
        f.write_str(name)
    }
}

/// A stream of termination signals.
pub trait SignalSource: Send + 'static {
    /// Wait for the next signal. `None` means no more will arrive.
    fn recv(&mut self) -> impl Future<Output = Option<Signal>> + Send;
}

/// Something the coordinator can close.
pub trait Close: Send + Sync + 'static {
    fn close(&self);
}

impl Close for ServerCloser {
    fn close(&self) {
        ServerCloser::close(self);
    }
}

/// Process signal handlers.
pub struct OsSignals {
    hangup: tokio::signal::unix::Signal,
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    quit: tokio::signal::unix::Signal,
}

impl OsSignals {
    /// Register the handlers. Must be called inside a Tokio runtime.
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            quit: signal(SignalKind::quit())?,
        })
    }
}

impl SignalSource for OsSignals {
    async fn recv(&mut self) -> Option<Signal> {
        tokio::select! {
            Some(()) = self.hangup.recv() => Some(Signal::Hangup),
            Some(()) = self.interrupt.recv() => Some(Signal::Interrupt),
            Some(()) = self.terminate.recv() => Some(Signal::Terminate),
            Some(()) = self.quit.recv() => Some(Signal::Quit),
            else => None,
        }
    }
}

impl SignalSource for mpsc::Receiver<Signal> {
    async fn recv(&mut self) -> Option<Signal> {
        mpsc::Receiver::recv(self).await
    }
}

/// Wait for one signal on a detached task, then close `target` once.
pub fn spawn_coordinator<S, C>(mut source: S, target: C) -> JoinHandle<()>
where
    S: SignalSource,
    C: Close,
{
    tokio::spawn(async move {
        match source.recv().await {
            Some(sig) => {
                tracing::info!(signal = %sig, "Got signal to exit");
                target.close();
            }
            None => tracing::debug!("Signal source ended without a signal"),
        }
    })
}
