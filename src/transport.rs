//! Contracts for the 1.0 frame writer and the 0-9-1 backing channel.
//!
//! The session never touches sockets. It emits decoded [`Frame`]s through
//! the writer half of [`Transport`] and drives the broker through the
//! channel half; the embedding layer maps both onto its codec and 0-9-1
//! client. Broker callbacks travel back to the session as
//! [`SessionEvent`](crate::session::SessionEvent)s, never as synchronous
//! calls into session state.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::frames::Frame;

/// Failure of the writer or backing channel.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The 1.0 frame writer is gone; the session terminates normally.
    #[error("frame writer closed")]
    WriterClosed,
    /// The backing 0-9-1 channel or its connection failed.
    #[error("backing channel failure: {0}")]
    ChannelFailure(String),
}

/// Failure reply to a declare or bind on the declaring channel.
///
/// Any failure poisons the declaring channel; the session discards it and
/// opens a fresh one on the next attach.
#[derive(Debug, Error)]
pub enum DeclareError {
    /// A passive declare for a named entity found nothing.
    #[error("no {entity} named {name:?}")]
    NotFound { entity: &'static str, name: String },
    /// Any other failure reply from the broker.
    #[error("declare failed: {0}")]
    Failed(String),
}

/// A message handed to the session by the backing channel's consumer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrokerDelivery {
    /// Consumer tag the delivery arrived on; encodes the link handle.
    pub consumer_tag: Bytes,
    /// Channel-scoped delivery tag used for ack and reject.
    pub delivery_tag: u64,
    /// Message payload, already encoded as a 1.0 message by the
    /// subscription glue.
    pub payload: Bytes,
}

/// Lifetime tag attached to server-named transient queues.
pub const TRANSIENT_QUEUE_LIFETIME: &str = "delete-on-close";

/// Secondary channel reserved for declare and bind operations, keeping
/// their synchronous failure modes off the publish/ack channel.
#[async_trait]
pub trait DeclaringChannel: Send {
    /// Assert that the named queue exists.
    async fn queue_declare_passive(&mut self, name: &[u8]) -> Result<(), DeclareError>;

    /// Assert that the named exchange exists.
    async fn exchange_declare_passive(&mut self, name: &[u8]) -> Result<(), DeclareError>;

    /// Declare a server-named auto-delete queue with the given lifetime
    /// tag and return its name.
    async fn queue_declare_transient(&mut self, lifetime: &str) -> Result<Bytes, DeclareError>;

    /// Bind `queue` to `exchange` with the given routing key.
    async fn queue_bind(
        &mut self,
        queue: &[u8],
        exchange: &[u8],
        routing_key: &[u8],
    ) -> Result<(), DeclareError>;
}

/// Narrow facade over the 1.0 frame writer and the 0-9-1 backing channel.
#[async_trait]
pub trait Transport: Send {
    /// Write one 1.0 frame to the peer.
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Publish a message to the broker. This is the back-pressured cast
    /// variant; it may await channel capacity but never a broker reply.
    async fn publish(
        &mut self,
        exchange: &[u8],
        routing_key: &[u8],
        payload: Bytes,
    ) -> Result<(), TransportError>;

    /// Subscribe to `queue` under `consumer_tag` with the given initial
    /// per-consumer credit.
    async fn consume(
        &mut self,
        queue: &[u8],
        consumer_tag: &[u8],
        no_ack: bool,
        initial_credit: u32,
    ) -> Result<(), TransportError>;

    /// Update per-consumer credit. Returns the broker's `available`
    /// count, or `None` when the broker cannot tell.
    async fn credit(
        &mut self,
        consumer_tag: &[u8],
        credit: u32,
        drain: bool,
    ) -> Result<Option<u32>, TransportError>;

    /// Acknowledge a delivery.
    async fn ack(&mut self, delivery_tag: u64, multiple: bool) -> Result<(), TransportError>;

    /// Reject a delivery, optionally requeueing it.
    async fn reject(&mut self, delivery_tag: u64, requeue: bool) -> Result<(), TransportError>;

    /// Put the channel in confirm mode. Idempotent.
    async fn select_confirms(&mut self) -> Result<(), TransportError>;

    /// Bound the number of in-flight deliveries from the broker.
    async fn set_prefetch(&mut self, limit: u16) -> Result<(), TransportError>;

    /// Open a fresh declaring channel.
    async fn open_declaring(&mut self) -> Result<Box<dyn DeclaringChannel>, TransportError>;
}
