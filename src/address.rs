//! Address grammar, parsing, and broker-side resolution.
//!
//! ```text
//! target := "/queue" | "/queue/" NAME | "/exchange/" NAME ["/" ROUTING_KEY]
//! source := "/queue/" NAME | "/exchange/" NAME "/" ROUTING_KEY
//! ```
//!
//! Names and routing keys are opaque byte strings. Resolution asserts that
//! named entities exist via passive declares on the declaring channel and
//! materialises dynamic termini as server-named auto-delete queues; an
//! exchange source additionally gets a private queue bound with the
//! requested routing key, which is what its consumer subscribes to.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::frames::{DistributionMode, Source, Target};
use crate::transport::{DeclareError, DeclaringChannel, TRANSIENT_QUEUE_LIFETIME};

/// Rejected address strings and malformed terminus combinations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    /// The address matches neither production of the grammar.
    #[error("unrecognised address {0:?}")]
    Unknown(String),
    /// The terminus carries no address and is not dynamic.
    #[error("terminus carries no address")]
    Missing,
    /// The terminus requested a dynamic node and named an address.
    #[error("dynamic terminus must not carry an address")]
    BothDynamicAndAddress,
}

/// Failures while resolving a terminus against the broker.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Address(#[from] AddressError),
    #[error(transparent)]
    Declare(#[from] DeclareError),
}

/// Parsed form of a target address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetAddress {
    /// `/queue` or `/queue/NAME`; publishes go to the default exchange.
    Queue { name: Option<Bytes> },
    /// `/exchange/NAME` with an optional fixed routing key.
    Exchange {
        name: Bytes,
        routing_key: Option<Bytes>,
    },
}

/// Parsed form of a source address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceAddress {
    /// `/queue/NAME`; consumed directly, *move* semantics.
    Queue { name: Bytes },
    /// `/exchange/NAME/KEY`; consumed through a private bound queue,
    /// *copy* semantics.
    Exchange { name: Bytes, routing_key: Bytes },
}

fn unknown(raw: &[u8]) -> AddressError {
    AddressError::Unknown(String::from_utf8_lossy(raw).into_owned())
}

/// Parse a target address.
pub fn parse_target(raw: &[u8]) -> Result<TargetAddress, AddressError> {
    let mut parts = raw.splitn(4, |byte| *byte == b'/');
    if parts.next() != Some(&[][..]) {
        return Err(unknown(raw));
    }
    match (parts.next(), parts.next(), parts.next()) {
        (Some(b"queue"), None, None) => Ok(TargetAddress::Queue { name: None }),
        (Some(b"queue"), Some(name), None) if !name.is_empty() => Ok(TargetAddress::Queue {
            name: Some(Bytes::copy_from_slice(name)),
        }),
        (Some(b"exchange"), Some(name), key) if !name.is_empty() => Ok(TargetAddress::Exchange {
            name: Bytes::copy_from_slice(name),
            routing_key: key.map(Bytes::copy_from_slice),
        }),
        _ => Err(unknown(raw)),
    }
}

/// Parse a source address.
pub fn parse_source(raw: &[u8]) -> Result<SourceAddress, AddressError> {
    let mut parts = raw.splitn(4, |byte| *byte == b'/');
    if parts.next() != Some(&[][..]) {
        return Err(unknown(raw));
    }
    match (parts.next(), parts.next(), parts.next()) {
        (Some(b"queue"), Some(name), None) if !name.is_empty() => Ok(SourceAddress::Queue {
            name: Bytes::copy_from_slice(name),
        }),
        (Some(b"exchange"), Some(name), Some(key)) if !name.is_empty() => {
            Ok(SourceAddress::Exchange {
                name: Bytes::copy_from_slice(name),
                routing_key: Bytes::copy_from_slice(key),
            })
        }
        _ => Err(unknown(raw)),
    }
}

impl TargetAddress {
    /// Render the address back to its wire form.
    #[must_use]
    pub fn render(&self) -> Bytes {
        match self {
            Self::Queue { name: None } => Bytes::from_static(b"/queue"),
            Self::Queue { name: Some(name) } => queue_address(name),
            Self::Exchange {
                name,
                routing_key: None,
            } => join(&[b"/exchange/", name.as_ref()]),
            Self::Exchange {
                name,
                routing_key: Some(key),
            } => join(&[b"/exchange/", name.as_ref(), b"/", key.as_ref()]),
        }
    }
}

impl SourceAddress {
    /// Render the address back to its wire form.
    #[must_use]
    pub fn render(&self) -> Bytes {
        match self {
            Self::Queue { name } => queue_address(name),
            Self::Exchange { name, routing_key } => {
                join(&[b"/exchange/", name.as_ref(), b"/", routing_key.as_ref()])
            }
        }
    }
}

/// Rendered `/queue/NAME` address, as reported for dynamic termini.
#[must_use]
pub fn queue_address(name: &[u8]) -> Bytes { join(&[b"/queue/", name]) }

fn join(parts: &[&[u8]]) -> Bytes {
    let mut buf = BytesMut::with_capacity(parts.iter().map(|part| part.len()).sum());
    for part in parts {
        buf.put_slice(part);
    }
    buf.freeze()
}

/// Outcome of resolving a target terminus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedTarget {
    /// Exchange to publish to; empty selects the default exchange.
    pub exchange: Bytes,
    /// Fixed routing key; `None` defers to the per-message Subject.
    pub routing_key: Option<Bytes>,
    /// Materialised address to report back, when the terminus was dynamic.
    pub address: Option<Bytes>,
}

/// Outcome of resolving a source terminus.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedSource {
    /// Queue the outgoing link's consumer subscribes to.
    pub queue: Bytes,
    /// Materialised address to report back, when the terminus was dynamic.
    pub address: Option<Bytes>,
    /// *Move* for queue sources, *copy* for exchange sources.
    pub distribution: DistributionMode,
}

/// Resolve an attach target against the broker.
pub async fn resolve_target(
    chan: &mut dyn DeclaringChannel,
    target: &Target,
) -> Result<ResolvedTarget, ResolveError> {
    if target.dynamic {
        if target.address.is_some() {
            return Err(AddressError::BothDynamicAndAddress.into());
        }
        let queue = chan.queue_declare_transient(TRANSIENT_QUEUE_LIFETIME).await?;
        // Publishing to the default exchange with the queue name as the
        // routing key reaches the new queue without an explicit bind.
        return Ok(ResolvedTarget {
            exchange: Bytes::new(),
            routing_key: Some(queue.clone()),
            address: Some(queue_address(&queue)),
        });
    }
    let raw = target.address.as_ref().ok_or(AddressError::Missing)?;
    match parse_target(raw)? {
        TargetAddress::Queue { name: None } => Ok(ResolvedTarget {
            exchange: Bytes::new(),
            routing_key: None,
            address: None,
        }),
        TargetAddress::Queue { name: Some(name) } => {
            chan.queue_declare_passive(&name).await?;
            Ok(ResolvedTarget {
                exchange: Bytes::new(),
                routing_key: Some(name),
                address: None,
            })
        }
        TargetAddress::Exchange { name, routing_key } => {
            chan.exchange_declare_passive(&name).await?;
            Ok(ResolvedTarget {
                exchange: name,
                routing_key,
                address: None,
            })
        }
    }
}

/// Resolve an attach source against the broker.
pub async fn resolve_source(
    chan: &mut dyn DeclaringChannel,
    source: &Source,
) -> Result<ResolvedSource, ResolveError> {
    if source.dynamic {
        if source.address.is_some() {
            return Err(AddressError::BothDynamicAndAddress.into());
        }
        let queue = chan.queue_declare_transient(TRANSIENT_QUEUE_LIFETIME).await?;
        return Ok(ResolvedSource {
            address: Some(queue_address(&queue)),
            queue,
            distribution: DistributionMode::Move,
        });
    }
    let raw = source.address.as_ref().ok_or(AddressError::Missing)?;
    match parse_source(raw)? {
        SourceAddress::Queue { name } => {
            chan.queue_declare_passive(&name).await?;
            Ok(ResolvedSource {
                queue: name,
                address: None,
                distribution: DistributionMode::Move,
            })
        }
        SourceAddress::Exchange { name, routing_key } => {
            chan.exchange_declare_passive(&name).await?;
            let queue = chan.queue_declare_transient(TRANSIENT_QUEUE_LIFETIME).await?;
            chan.queue_bind(&queue, &name, &routing_key).await?;
            Ok(ResolvedSource {
                queue,
                address: None,
                distribution: DistributionMode::Copy,
            })
        }
    }
}

#[cfg(test)]
#[path = "address_tests.rs"]
mod tests;
