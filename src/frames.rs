//! AMQP 1.0 performatives exchanged with the wire codec.
//!
//! The wire codec lives outside this crate; these structs are the decoded
//! form it hands to the session and accepts back for encoding. Field names
//! follow the 1.0 specification, narrowed to the subset the bridge uses.

use bytes::Bytes;

use crate::error::ErrorInfo;

/// Per-session, per-direction serial number identifying a transfer frame.
pub type TransferId = u32;

/// Peer-assigned link identifier, unique per session while attached.
pub type Handle = u32;

/// Which end of a link the speaker occupies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

/// Settlement policy declared by the sending end of a link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SenderSettleMode {
    Unsettled,
    Settled,
    Mixed,
}

/// Settlement policy declared by the receiving end of a link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiverSettleMode {
    First,
    Second,
}

/// Terminal state of a transfer.
///
/// `Modified` is recognised so peers proposing it can be refused cleanly;
/// the bridge never selects it as a default.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Accepted,
    Rejected,
    Released,
    Modified,
}

impl Outcome {
    /// The symbolic name carried on the wire.
    #[must_use]
    pub const fn as_symbol(self) -> &'static str {
        match self {
            Self::Accepted => "amqp:accepted:list",
            Self::Rejected => "amqp:rejected:list",
            Self::Released => "amqp:released:list",
            Self::Modified => "amqp:modified:list",
        }
    }
}

/// How a source hands messages to consumers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DistributionMode {
    /// Consuming removes the message; queue sources.
    Move,
    /// Consuming observes a copy; exchange sources.
    Copy,
}

/// Source terminus carried on attach.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Source {
    pub address: Option<Bytes>,
    pub dynamic: bool,
    pub distribution_mode: Option<DistributionMode>,
    pub default_outcome: Option<Outcome>,
    pub outcomes: Vec<Outcome>,
}

/// Target terminus carried on attach.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Target {
    pub address: Option<Bytes>,
    pub dynamic: bool,
}

/// Open a session on a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Begin {
    pub remote_channel: Option<u16>,
    pub next_outgoing_id: TransferId,
    pub window_size: u32,
}

/// Attach a link to the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attach {
    pub name: String,
    pub handle: Handle,
    pub role: Role,
    pub snd_settle_mode: SenderSettleMode,
    pub rcv_settle_mode: ReceiverSettleMode,
    pub source: Option<Source>,
    pub target: Option<Target>,
    pub initial_delivery_count: Option<TransferId>,
}

/// Update session and link flow state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Flow {
    pub next_incoming_id: Option<TransferId>,
    pub incoming_window: u32,
    pub next_outgoing_id: TransferId,
    pub outgoing_window: u32,
    pub handle: Option<Handle>,
    pub delivery_count: Option<TransferId>,
    pub link_credit: Option<u32>,
    pub available: Option<u32>,
    pub drain: bool,
    pub echo: bool,
}

/// Move a message across a link. The payload travels alongside in
/// [`Frame::Transfer`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transfer {
    pub handle: Handle,
    pub delivery_id: Option<TransferId>,
    pub delivery_tag: Option<Bytes>,
    pub settled: bool,
    pub more: bool,
    pub resume: bool,
    pub aborted: bool,
}

/// Settle or update the state of previously sent transfers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Disposition {
    pub role: Role,
    pub first: TransferId,
    pub last: Option<TransferId>,
    pub settled: bool,
    pub state: Option<Outcome>,
}

/// Detach a link from the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Detach {
    pub handle: Handle,
    pub closed: bool,
    pub error: Option<ErrorInfo>,
}

/// End the session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct End {
    pub error: Option<ErrorInfo>,
}

/// Decoded frame passed between the session and the codec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    Begin(Begin),
    Attach(Attach),
    Flow(Flow),
    Transfer { transfer: Transfer, payload: Bytes },
    Disposition(Disposition),
    Detach(Detach),
    End(End),
}

/// Render a broker delivery tag as the 8-byte big-endian 1.0 delivery tag.
#[must_use]
pub fn delivery_tag_bytes(tag: u64) -> Bytes { Bytes::copy_from_slice(&tag.to_be_bytes()) }
