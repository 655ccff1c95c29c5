//! Structures to keep the dispatch loops alive until the service is asked to stop

use futures::{
    channel::mpsc::{channel, Receiver, Sender},
    future, pin_mut,
    prelude::*,
    select,
};
use log::{debug, error, warn};
use std::fmt;
use tokio::signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};

/// Reason why the heart stopped beating
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeathReason {
    /// Internal kill signal has been sent
    Killed(String),
    /// SIGTERM, SIGINT or every [`HeartStone`] has been dropped
    Terminated,
}

impl fmt::Display for DeathReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeathReason::Killed(reason) => write!(f, "Killed ({})", reason),
            DeathReason::Terminated => write!(f, "Terminated due to external signal"),
        }
    }
}

/// Lifecycle handle which resolves once the process should shut down
pub struct Heart {
    rx: Receiver<String>,
    listen_for_signals: bool,
}

impl Heart {
    /// Creates a new heart which dies when killed through the linked stone or on SIGTERM / Ctrl-C
    pub fn new() -> (Self, HeartStone) {
        Self::internal_new(true)
    }

    /// Creates a new heart which only dies when killed through the linked stone
    pub fn without_signals() -> (Self, HeartStone) {
        Self::internal_new(false)
    }

    fn internal_new(listen_for_signals: bool) -> (Self, HeartStone) {
        let (tx, rx) = channel(2);

        let heart = Self {
            rx,
            listen_for_signals,
        };

        (heart, HeartStone { remote: tx })
    }

    /// Future that waits until the heart dies for the returned reason
    pub async fn death(&mut self) -> DeathReason {
        debug!("Heart starts beating");

        let signals = if self.listen_for_signals {
            Heart::termination_signal().boxed()
        } else {
            future::pending().boxed()
        };

        select! {
            reason = self.rx.next() => match reason {
                Some(reason) => DeathReason::Killed(reason),
                None => DeathReason::Terminated,
            },
            () = signals.fuse() => DeathReason::Terminated,
        }
    }

    async fn termination_signal() {
        let ctrl_c = ctrl_c().fuse();

        let mut sigterm_stream = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Unable to listen for SIGTERM: {}", e);
                ctrl_c.await.ok();
                return;
            }
        };

        let sigterm = sigterm_stream.recv().fuse();
        pin_mut!(sigterm, ctrl_c);

        select! {
            _ = sigterm => {},
            _ = ctrl_c => {},
        };
    }
}

/// Remote controller for the heart
#[derive(Clone)]
pub struct HeartStone {
    remote: Sender<String>,
}

impl HeartStone {
    /// Kill the associated heart
    pub async fn kill(&mut self, reason: impl Into<String>) {
        if let Err(e) = self.remote.send(reason.into()).await {
            error!("Failed to interact with Heart: {}", e);
        }
    }
}
