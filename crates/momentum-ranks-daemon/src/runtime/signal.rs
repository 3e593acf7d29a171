//! Signals the daemon reacts to.
//!
//! SIGINT and SIGTERM stop the daemon once the pass in progress (if any) is done. SIGHUP runs a
//! pass right away instead of waiting for the next tick.

use std::io;

use tokio::signal;

/// What a signal asks of the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request {
    Shutdown { signal: &'static str },
    Pass,
}

/// Listeners for every signal in [`Request`].
///
/// Must be created inside the runtime.
pub struct Signals {
    #[cfg(unix)]
    terminate: signal::unix::Signal,

    #[cfg(unix)]
    hangup: signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    pub fn listen() -> io::Result<Self> {
        use signal::unix::{SignalKind, signal};

        Ok(Self {
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    pub async fn next(&mut self) -> io::Result<Request> {
        select! {
            result = signal::ctrl_c() => result.map(|()| Request::Shutdown { signal: "SIGINT" }),
            Some(()) = self.terminate.recv() => Ok(Request::Shutdown { signal: "SIGTERM" }),
            Some(()) = self.hangup.recv() => Ok(Request::Pass),
        }
    }
}

#[cfg(not(unix))]
impl Signals {
    pub fn listen() -> io::Result<Self> {
        Ok(Self {})
    }

    pub async fn next(&mut self) -> io::Result<Request> {
        signal::ctrl_c()
            .await
            .map(|()| Request::Shutdown { signal: "ctrl-c" })
    }
}
