//! Serialized inbox events for the session actor.

use bytes::Bytes;

use crate::frames::Frame;
use crate::transport::BrokerDelivery;

/// One unit of work for the session actor.
///
/// Events arrive from four sources: the 1.0 frame reader, the broker's
/// consumer, confirm callbacks, and credit-state notifications. The actor
/// services exactly one event to completion at a time, so session state
/// needs no locking.
#[derive(Debug)]
pub enum SessionEvent {
    /// Decoded inbound 1.0 frame.
    Frame(Frame),
    /// Message delivered by the broker on a consumer tag.
    Delivery(BrokerDelivery),
    /// Broker confirm covering publishes up to a delivery tag.
    Confirm { delivery_tag: u64, multiple: bool },
    /// Per-consumer credit notification from the broker. `available` is
    /// `None` when the broker cannot tell.
    CreditState {
        consumer_tag: Bytes,
        credit: u32,
        available: Option<u32>,
        drain: bool,
    },
    /// The reader or backing transport is gone.
    TransportClosed,
}
