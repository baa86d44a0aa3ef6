//! Outgoing-link state: the broker delivers, the bridge transfers.

use bytes::Bytes;

use crate::error::{Condition, ErrorInfo};
use crate::frames::{Outcome, Source, TransferId};
use crate::serial;

/// Outcomes the bridge can map onto broker acknowledgements.
pub const SUPPORTED_OUTCOMES: [Outcome; 3] =
    [Outcome::Accepted, Outcome::Rejected, Outcome::Released];

/// Outcome applied when the peer's source proposes none.
pub const DEFAULT_OUTCOME: Outcome = Outcome::Released;

/// Per-link state for a link on which the peer is the receiver.
#[derive(Debug)]
pub struct OutgoingLink {
    name: String,
    queue: Bytes,
    transfer_count: TransferId,
    transfer_unit: u32,
    no_ack: bool,
    default_outcome: Outcome,
}

impl OutgoingLink {
    /// State for a freshly attached outgoing link subscribed to `queue`.
    #[must_use]
    pub fn new(name: String, queue: Bytes, no_ack: bool, default_outcome: Outcome) -> Self {
        Self {
            name,
            queue,
            transfer_count: 0,
            // Zero means credit is counted in messages, not bytes.
            transfer_unit: 0,
            no_ack,
            default_outcome,
        }
    }

    /// Link name as attached.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// Queue the link's consumer is subscribed to.
    #[must_use]
    pub const fn queue(&self) -> &Bytes { &self.queue }

    /// Serial count of emitted transfers.
    #[must_use]
    pub const fn transfer_count(&self) -> TransferId { self.transfer_count }

    /// Unit in which credit is counted; zero is messages.
    #[must_use]
    pub const fn transfer_unit(&self) -> u32 { self.transfer_unit }

    /// True when transfers are settled at send and skip the ack cycle.
    #[must_use]
    pub const fn no_ack(&self) -> bool { self.no_ack }

    /// Outcome applied when a disposition names none.
    #[must_use]
    pub const fn default_outcome(&self) -> Outcome { self.default_outcome }

    /// Account for one emitted transfer.
    pub fn transfer_emitted(&mut self) {
        self.transfer_count = serial::succ(self.transfer_count);
    }
}

/// Negotiated settlement for an outgoing link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NegotiatedOutcomes {
    /// Outcome applied when a disposition names none.
    pub default_outcome: Outcome,
    /// True when every transfer is settled at send and deliveries skip
    /// the broker ack cycle entirely.
    pub no_ack: bool,
}

/// Negotiate the outcome set for an attaching receiver.
///
/// The peer's proposed set is taken verbatim. Proposals outside the
/// supported set fail the attach; the default becomes `accepted` only
/// when the peer names it explicitly, and `released` otherwise.
pub fn negotiate_outcomes(source: &Source) -> Result<NegotiatedOutcomes, ErrorInfo> {
    let proposed_default = source.default_outcome;
    let unsupported = source
        .outcomes
        .iter()
        .copied()
        .chain(proposed_default)
        .find(|outcome| !SUPPORTED_OUTCOMES.contains(outcome));
    if let Some(outcome) = unsupported {
        return Err(ErrorInfo::new(
            Condition::NotImplemented,
            format!("outcome {} is not supported", outcome.as_symbol()),
        ));
    }
    let default_outcome = proposed_default.unwrap_or(DEFAULT_OUTCOME);
    // Set comparison: a repeated `accepted` still names the set {accepted}.
    let no_ack = default_outcome == Outcome::Accepted
        && !source.outcomes.is_empty()
        && source
            .outcomes
            .iter()
            .all(|outcome| *outcome == Outcome::Accepted);
    Ok(NegotiatedOutcomes {
        default_outcome,
        no_ack,
    })
}
