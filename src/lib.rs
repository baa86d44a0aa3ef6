#![doc(html_root_url = "https://docs.rs/gangway/latest")]
//! Public API for the `gangway` library.
//!
//! This crate bridges AMQP 1.0 session and link semantics onto an AMQP
//! 0-9-1 channel acting as backing transport to a broker. Attach, flow,
//! transfer, and disposition exchanges on the 1.0 side become publishes,
//! consumes, acks, and credit updates on the 0-9-1 side; broker
//! deliveries, confirms, and credit notifications travel back as 1.0
//! frames. The wire codecs and the concrete 0-9-1 client stay outside,
//! behind the [`transport::Transport`] facade.

pub mod address;
pub mod error;
pub mod frames;
pub mod hooks;
pub mod link;
pub mod metrics;
pub mod serial;
pub mod session;
pub mod transport;

pub use error::{Condition, ErrorInfo, SessionError};
pub use frames::{Frame, Handle, TransferId};
pub use hooks::CodecHooks;
pub use session::{
    ChannelInUse, MAX_SESSION_BUFFER_SIZE, Session, SessionActor, SessionEvent, SessionHandle,
    SessionRegistry, SessionStatus,
};
pub use transport::{BrokerDelivery, DeclaringChannel, Transport};
