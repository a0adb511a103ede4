//! Process signals for the headless client.
//!
//! * Ctrl-C (SIGINT) and SIGTERM stop the client
//! * SIGHUP drops the connection and connects afresh
//!
//! On Windows only Ctrl-C is available.

use std::fmt;

use crate::error::Result;

#[cfg(unix)]
use tokio::signal::unix::{signal, Signal, SignalKind};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ShutdownSignal {
    /// Ctrl-C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// SIGHUP
    Reconnect,
}

impl ShutdownSignal {
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Interrupt | Self::Terminate)
    }
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => write!(f, "Ctrl+C"),
            Self::Terminate => write!(f, "SIGTERM"),
            Self::Reconnect => write!(f, "SIGHUP"),
        }
    }
}

pub struct Handler {
    #[cfg(unix)]
    sigterm: Signal,
    #[cfg(unix)]
    sighup: Signal,
}

impl Handler {
    /// Registers the signal handlers.
    ///
    /// # Errors
    ///
    /// Returns an error if a handler cannot be registered.
    pub fn new() -> Result<Self> {
        #[cfg(unix)]
        {
            Ok(Self {
                sigterm: signal(SignalKind::terminate())?,
                sighup: signal(SignalKind::hangup())?,
            })
        }

        #[cfg(not(unix))]
        Ok(Self {})
    }

    /// Waits for the next signal.
    pub async fn recv(&mut self) -> ShutdownSignal {
        #[cfg(unix)]
        {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => ShutdownSignal::Interrupt,
                _ = self.sigterm.recv() => ShutdownSignal::Terminate,
                _ = self.sighup.recv() => ShutdownSignal::Reconnect,
            }
        }

        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
            ShutdownSignal::Interrupt
        }
    }
}
