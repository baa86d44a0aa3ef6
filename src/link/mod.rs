//! Per-link state for both directions, plus the consumer-tag codec that
//! routes broker deliveries back to their outgoing link.
//!
//! A link handle lives in at most one direction's table at a time; the
//! session enforces that at attach. The consumer tag embeds the handle so
//! broker-origin events need no lookup state beyond the tag itself.

mod incoming;
mod outgoing;

pub use incoming::{INCOMING_CREDIT, IncomingLink};
pub use outgoing::{
    DEFAULT_OUTCOME, NegotiatedOutcomes, OutgoingLink, SUPPORTED_OUTCOMES, negotiate_outcomes,
};

use bytes::{BufMut, Bytes, BytesMut};

use crate::frames::Handle;

/// Prefix of every consumer tag issued by the bridge.
const CONSUMER_TAG_PREFIX: &[u8] = b"ctag-";

/// Encode a link handle as a consumer tag.
///
/// The encoding is reversible so broker deliveries route back to the
/// owning link without extra state: a fixed prefix followed by the handle
/// in big-endian.
#[must_use]
pub fn encode_consumer_tag(handle: Handle) -> Bytes {
    let mut tag = BytesMut::with_capacity(CONSUMER_TAG_PREFIX.len() + 4);
    tag.put_slice(CONSUMER_TAG_PREFIX);
    tag.put_u32(handle);
    tag.freeze()
}

/// Recover the link handle from a consumer tag, if it is one of ours.
#[must_use]
pub fn decode_consumer_tag(tag: &[u8]) -> Option<Handle> {
    let suffix = tag.strip_prefix(CONSUMER_TAG_PREFIX)?;
    let bytes: [u8; 4] = suffix.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}
