//! Cooperative actor driving a session from a serialized inbox.
//!
//! The actor owns its [`Session`] exclusively and services one event to
//! completion before taking the next; there is no internal locking.
//! Producers (the frame reader and the broker callback glue) feed the
//! inbox through a cloneable [`SessionHandle`]. The `biased` select
//! ensures a shutdown request wins over queued events.

use std::sync::{Arc, Weak};

use log::debug;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{Session, SessionEvent, SessionStatus};
use crate::error::SessionError;
use crate::transport::Transport;

/// Errors that can occur when feeding the session inbox.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum EventError {
    /// The inbox was at capacity.
    #[error("session inbox full")]
    InboxFull,
    /// The session actor is gone.
    #[error("session inbox closed")]
    Closed,
}

pub(crate) struct SessionHandleInner {
    tx: mpsc::Sender<SessionEvent>,
}

/// Cloneable handle used by producers to feed events to a session.
#[derive(Clone)]
pub struct SessionHandle(Arc<SessionHandleInner>);

impl SessionHandle {
    pub(crate) fn from_arc(arc: Arc<SessionHandleInner>) -> Self { Self(arc) }

    /// Enqueue an event, awaiting inbox capacity.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::Closed`] if the actor has terminated.
    pub async fn send(&self, event: SessionEvent) -> Result<(), EventError> {
        self.0.tx.send(event).await.map_err(|_| EventError::Closed)
    }

    /// Enqueue an event without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::InboxFull`] when the inbox is at capacity and
    /// [`EventError::Closed`] if the actor has terminated.
    pub fn try_send(&self, event: SessionEvent) -> Result<(), EventError> {
        self.0.tx.try_send(event).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => EventError::InboxFull,
            mpsc::error::TrySendError::Closed(_) => EventError::Closed,
        })
    }

    /// Downgrade to a `Weak` reference for storage in a registry.
    pub(crate) fn downgrade(&self) -> Weak<SessionHandleInner> { Arc::downgrade(&self.0) }
}

/// Actor owning a session and its inbox.
pub struct SessionActor<T> {
    session: Session<T>,
    inbox: mpsc::Receiver<SessionEvent>,
    shutdown: CancellationToken,
}

impl<T: Transport> SessionActor<T> {
    /// Wrap a session in an actor with a bounded inbox.
    #[must_use]
    pub fn new(
        session: Session<T>,
        capacity: usize,
        shutdown: CancellationToken,
    ) -> (Self, SessionHandle) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = SessionHandle(Arc::new(SessionHandleInner { tx }));
        (
            Self {
                session,
                inbox: rx,
                shutdown,
            },
            handle,
        )
    }

    /// Drive the session until it ends, fails, or shutdown is requested.
    ///
    /// Transport write failures terminate the session normally. Protocol
    /// violations are reported to the peer with a final `end` frame
    /// before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns the [`SessionError`] that terminated the session, for
    /// protocol violations only.
    pub async fn run(mut self) -> Result<(), SessionError> {
        loop {
            tokio::select! {
                biased;

                () = self.shutdown.cancelled() => {
                    debug!("session actor on channel {} shut down", self.session.channel());
                    self.session.shutdown().await;
                    return Ok(());
                }

                event = self.inbox.recv() => {
                    let Some(event) = event else {
                        // Every producer dropped its handle; nothing more
                        // can arrive.
                        self.session.shutdown().await;
                        return Ok(());
                    };
                    match self.session.handle_event(event).await {
                        Ok(SessionStatus::Active) => {}
                        Ok(SessionStatus::Ended) => return Ok(()),
                        Err(SessionError::Transport(err)) => {
                            debug!("session transport failed: {err}");
                            return Ok(());
                        }
                        Err(err) => {
                            self.session.terminate(&err).await;
                            return Err(err);
                        }
                    }
                }
            }
        }
    }
}
