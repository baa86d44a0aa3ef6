//! Incoming-link state: the peer sends, the bridge publishes.

use bytes::{BufMut, Bytes, BytesMut};

use crate::frames::TransferId;
use crate::serial;

/// Link credit granted to sending peers at attach and on replenish.
pub const INCOMING_CREDIT: u32 = 65_536;

/// Budget of transfers between replenishing flows.
const REPLENISH_THRESHOLD: u32 = INCOMING_CREDIT / 2;

/// Per-link state for a link on which the peer is the sender.
///
/// Completed transfers become publishes on the backing channel. Payloads
/// of `more=true` transfer frames accumulate here until the terminating
/// frame arrives.
#[derive(Debug)]
pub struct IncomingLink {
    name: String,
    exchange: Bytes,
    routing_key: Option<Bytes>,
    delivery_count: TransferId,
    credit_used: u32,
    confirms: bool,
    fragments: Vec<Bytes>,
    /// Transfer id of the delivery's first frame. Continuation frames
    /// omit the delivery id, but settlement must name this one.
    pending_transfer_id: Option<TransferId>,
}

impl IncomingLink {
    /// State for a freshly attached incoming link.
    #[must_use]
    pub fn new(
        name: String,
        exchange: Bytes,
        routing_key: Option<Bytes>,
        initial_delivery_count: TransferId,
        confirms: bool,
    ) -> Self {
        Self {
            name,
            exchange,
            routing_key,
            delivery_count: initial_delivery_count,
            credit_used: REPLENISH_THRESHOLD,
            confirms,
            fragments: Vec::new(),
            pending_transfer_id: None,
        }
    }

    /// Link name as attached.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// Exchange publishes go to; empty selects the default exchange.
    #[must_use]
    pub const fn exchange(&self) -> &Bytes { &self.exchange }

    /// Whether publishes on this link are correlated with broker confirms.
    #[must_use]
    pub const fn confirms(&self) -> bool { self.confirms }

    /// Serial count of completed transfers.
    #[must_use]
    pub const fn delivery_count(&self) -> TransferId { self.delivery_count }

    /// Buffer the payload of a `more=true` transfer frame.
    ///
    /// The first frame of a delivery fixes the transfer id the whole
    /// delivery settles under.
    pub fn accumulate(&mut self, transfer_id: TransferId, fragment: Bytes) {
        self.pending_transfer_id.get_or_insert(transfer_id);
        self.fragments.push(fragment);
    }

    /// Concatenate buffered fragments, in arrival order, with the
    /// terminating payload.
    ///
    /// Returns the delivery's settlement transfer id alongside the
    /// message bytes: the first frame's id for a multi-frame delivery,
    /// or `transfer_id` for a single-frame one.
    #[must_use]
    pub fn assemble(&mut self, transfer_id: TransferId, last: Bytes) -> (TransferId, Bytes) {
        let delivery_id = self.pending_transfer_id.take().unwrap_or(transfer_id);
        if self.fragments.is_empty() {
            return (delivery_id, last);
        }
        let total = self.fragments.iter().map(Bytes::len).sum::<usize>() + last.len();
        let mut message = BytesMut::with_capacity(total);
        for fragment in self.fragments.drain(..) {
            message.put_slice(&fragment);
        }
        message.put_slice(&last);
        (delivery_id, message.freeze())
    }

    /// Routing key for a completed transfer: the configured key if set,
    /// else the message Subject, else empty.
    #[must_use]
    pub fn routing_key(&self, subject: Option<Bytes>) -> Bytes {
        self.routing_key.clone().or(subject).unwrap_or_else(Bytes::new)
    }

    /// Account for one completed transfer.
    ///
    /// Returns the delivery count to advertise when the credit budget is
    /// exhausted and a replenishing flow must go out.
    pub fn transfer_completed(&mut self) -> Option<TransferId> {
        self.delivery_count = serial::succ(self.delivery_count);
        self.credit_used = self.credit_used.saturating_sub(1);
        if self.credit_used == 0 {
            self.credit_used = REPLENISH_THRESHOLD;
            Some(self.delivery_count)
        } else {
            None
        }
    }
}
