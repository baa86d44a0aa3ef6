//! Registry of live session handles keyed by channel number.
//!
//! Channel numbers are peer-assigned 16-bit values and come back into
//! use as soon as a session ends, so the registry treats a channel as
//! free whenever its actor is gone: a stale entry is displaced by the
//! next claim and swept out by the lookup that finds it dead.
//! Connection-level glue claims a channel at `begin`, routes decoded
//! frames through [`SessionRegistry::lookup`], and releases the channel
//! once the session ends. Entries are non-owning weak references, so the
//! registry never keeps a finished actor alive.

use std::sync::Weak;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;

use super::actor::{SessionHandle, SessionHandleInner};

/// A live session already occupies the claimed channel.
///
/// The peer may not begin two sessions on one channel; surfacing this at
/// claim time lets the connection fail the second `begin` instead of
/// silently unrouting the first session.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("channel {0} already has a live session")]
pub struct ChannelInUse(pub u16);

/// Concurrent registry of session handles keyed by channel number.
#[derive(Default)]
pub struct SessionRegistry(DashMap<u16, Weak<SessionHandleInner>>);

impl SessionRegistry {
    /// Claim `channel` for a newly begun session.
    ///
    /// A stale entry left behind by an ended session is displaced; a
    /// live one refuses the claim.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelInUse`] when the channel's current session is
    /// still running.
    pub fn claim(&self, channel: u16, handle: &SessionHandle) -> Result<(), ChannelInUse> {
        match self.0.entry(channel) {
            Entry::Vacant(slot) => {
                slot.insert(handle.downgrade());
                Ok(())
            }
            Entry::Occupied(mut slot) => {
                if slot.get().strong_count() > 0 {
                    return Err(ChannelInUse(channel));
                }
                slot.insert(handle.downgrade());
                Ok(())
            }
        }
    }

    /// Route to the session on `channel`.
    ///
    /// A channel whose actor has terminated reads as unclaimed, and its
    /// dead entry is removed on the way out.
    #[must_use]
    pub fn lookup(&self, channel: u16) -> Option<SessionHandle> {
        let live = self.0.get(&channel).and_then(|weak| weak.upgrade());
        match live {
            Some(inner) => Some(SessionHandle::from_arc(inner)),
            None => {
                self.0.remove_if(&channel, |_, weak| weak.strong_count() == 0);
                None
            }
        }
    }

    /// Release `channel` at session end.
    pub fn release(&self, channel: u16) { self.0.remove(&channel); }

    /// Number of channels whose session is still running.
    #[must_use]
    pub fn live(&self) -> usize {
        self.0
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .count()
    }
}
