//! Recording mock transport shared by the behavioural tests.
//!
//! [`Broker`] is the shared state behind a [`MockTransport`] and the
//! declaring channels it opens: every emitted frame and broker operation
//! is recorded for assertion, and tests can script credit replies,
//! missing entities, and consume failures ahead of time.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use gangway::frames::{
    Attach, Begin, Flow, Frame, Outcome, ReceiverSettleMode, Role, SenderSettleMode, Source,
    Target, Transfer,
};
use gangway::hooks::CodecHooks;
use gangway::session::{Session, SessionEvent};
use gangway::transport::{
    BrokerDelivery, DeclareError, DeclaringChannel, Transport, TransportError,
};

/// Broker-side operation observed by the mock.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BrokerOp {
    Publish {
        exchange: Bytes,
        routing_key: Bytes,
        payload: Bytes,
    },
    Consume {
        queue: Bytes,
        consumer_tag: Bytes,
        no_ack: bool,
        initial_credit: u32,
    },
    Credit {
        consumer_tag: Bytes,
        credit: u32,
        drain: bool,
    },
    Ack {
        delivery_tag: u64,
        multiple: bool,
    },
    Reject {
        delivery_tag: u64,
        requeue: bool,
    },
    SelectConfirms,
    SetPrefetch {
        limit: u16,
    },
    OpenDeclaring,
    QueuePassive {
        name: Bytes,
    },
    ExchangePassive {
        name: Bytes,
    },
    TransientQueue {
        lifetime: String,
    },
    Bind {
        queue: Bytes,
        exchange: Bytes,
        routing_key: Bytes,
    },
}

/// Shared recording state behind a mock transport and its declaring
/// channels.
#[derive(Clone, Default)]
pub struct Broker {
    frames: Arc<Mutex<Vec<Frame>>>,
    ops: Arc<Mutex<Vec<BrokerOp>>>,
    credit_replies: Arc<Mutex<VecDeque<Option<u32>>>>,
    missing: Arc<Mutex<Vec<Bytes>>>,
    fail_consume: Arc<AtomicBool>,
    next_transient: Arc<AtomicU32>,
}

impl Broker {
    /// A transport facade recording into this broker.
    pub fn transport(&self) -> MockTransport {
        MockTransport {
            broker: self.clone(),
        }
    }

    /// All frames emitted so far.
    pub fn frames(&self) -> Vec<Frame> { self.frames.lock().unwrap().clone() }

    /// Drain the recorded frames.
    pub fn take_frames(&self) -> Vec<Frame> { std::mem::take(&mut *self.frames.lock().unwrap()) }

    /// All broker operations issued so far.
    pub fn ops(&self) -> Vec<BrokerOp> { self.ops.lock().unwrap().clone() }

    /// Drain the recorded broker operations.
    pub fn take_ops(&self) -> Vec<BrokerOp> { std::mem::take(&mut *self.ops.lock().unwrap()) }

    /// Script the reply to the next `credit` call. Unscripted calls
    /// report zero available.
    pub fn queue_credit_reply(&self, available: Option<u32>) {
        self.credit_replies.lock().unwrap().push_back(available);
    }

    /// Make passive declares for `name` fail with `not_found`.
    pub fn mark_missing(&self, name: &[u8]) {
        self.missing.lock().unwrap().push(Bytes::copy_from_slice(name));
    }

    /// Make the next `consume` call fail.
    pub fn fail_next_consume(&self) { self.fail_consume.store(true, Ordering::SeqCst); }

    fn record(&self, op: BrokerOp) { self.ops.lock().unwrap().push(op); }

    fn is_missing(&self, name: &[u8]) -> bool {
        self.missing.lock().unwrap().iter().any(|m| m == name)
    }
}

/// Recording implementation of the transport facade.
pub struct MockTransport {
    broker: Broker,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), TransportError> {
        self.broker.frames.lock().unwrap().push(frame);
        Ok(())
    }

    async fn publish(
        &mut self,
        exchange: &[u8],
        routing_key: &[u8],
        payload: Bytes,
    ) -> Result<(), TransportError> {
        self.broker.record(BrokerOp::Publish {
            exchange: Bytes::copy_from_slice(exchange),
            routing_key: Bytes::copy_from_slice(routing_key),
            payload,
        });
        Ok(())
    }

    async fn consume(
        &mut self,
        queue: &[u8],
        consumer_tag: &[u8],
        no_ack: bool,
        initial_credit: u32,
    ) -> Result<(), TransportError> {
        if self.broker.fail_consume.swap(false, Ordering::SeqCst) {
            return Err(TransportError::ChannelFailure("consume refused".into()));
        }
        self.broker.record(BrokerOp::Consume {
            queue: Bytes::copy_from_slice(queue),
            consumer_tag: Bytes::copy_from_slice(consumer_tag),
            no_ack,
            initial_credit,
        });
        Ok(())
    }

    async fn credit(
        &mut self,
        consumer_tag: &[u8],
        credit: u32,
        drain: bool,
    ) -> Result<Option<u32>, TransportError> {
        self.broker.record(BrokerOp::Credit {
            consumer_tag: Bytes::copy_from_slice(consumer_tag),
            credit,
            drain,
        });
        let reply = self.broker.credit_replies.lock().unwrap().pop_front();
        Ok(reply.unwrap_or(Some(0)))
    }

    async fn ack(&mut self, delivery_tag: u64, multiple: bool) -> Result<(), TransportError> {
        self.broker.record(BrokerOp::Ack {
            delivery_tag,
            multiple,
        });
        Ok(())
    }

    async fn reject(&mut self, delivery_tag: u64, requeue: bool) -> Result<(), TransportError> {
        self.broker.record(BrokerOp::Reject {
            delivery_tag,
            requeue,
        });
        Ok(())
    }

    async fn select_confirms(&mut self) -> Result<(), TransportError> {
        self.broker.record(BrokerOp::SelectConfirms);
        Ok(())
    }

    async fn set_prefetch(&mut self, limit: u16) -> Result<(), TransportError> {
        self.broker.record(BrokerOp::SetPrefetch { limit });
        Ok(())
    }

    async fn open_declaring(&mut self) -> Result<Box<dyn DeclaringChannel>, TransportError> {
        self.broker.record(BrokerOp::OpenDeclaring);
        Ok(Box::new(MockDeclaring {
            broker: self.broker.clone(),
        }))
    }
}

struct MockDeclaring {
    broker: Broker,
}

#[async_trait]
impl DeclaringChannel for MockDeclaring {
    async fn queue_declare_passive(&mut self, name: &[u8]) -> Result<(), DeclareError> {
        self.broker.record(BrokerOp::QueuePassive {
            name: Bytes::copy_from_slice(name),
        });
        if self.broker.is_missing(name) {
            return Err(DeclareError::NotFound {
                entity: "queue",
                name: String::from_utf8_lossy(name).into_owned(),
            });
        }
        Ok(())
    }

    async fn exchange_declare_passive(&mut self, name: &[u8]) -> Result<(), DeclareError> {
        self.broker.record(BrokerOp::ExchangePassive {
            name: Bytes::copy_from_slice(name),
        });
        if self.broker.is_missing(name) {
            return Err(DeclareError::NotFound {
                entity: "exchange",
                name: String::from_utf8_lossy(name).into_owned(),
            });
        }
        Ok(())
    }

    async fn queue_declare_transient(&mut self, lifetime: &str) -> Result<Bytes, DeclareError> {
        self.broker.record(BrokerOp::TransientQueue {
            lifetime: lifetime.to_owned(),
        });
        let n = self.broker.next_transient.fetch_add(1, Ordering::SeqCst);
        Ok(Bytes::from(format!("amq.gen-{n}")))
    }

    async fn queue_bind(
        &mut self,
        queue: &[u8],
        exchange: &[u8],
        routing_key: &[u8],
    ) -> Result<(), DeclareError> {
        self.broker.record(BrokerOp::Bind {
            queue: Bytes::copy_from_slice(queue),
            exchange: Bytes::copy_from_slice(exchange),
            routing_key: Bytes::copy_from_slice(routing_key),
        });
        Ok(())
    }
}

/// A `begin` frame as the peer would send it.
pub fn begin(next_outgoing_id: u32, window_size: u32) -> Frame {
    Frame::Begin(Begin {
        remote_channel: None,
        next_outgoing_id,
        window_size,
    })
}

/// A sender attach (incoming link) targeting `address`.
pub fn attach_sender(handle: u32, name: &str, address: &[u8], mode: SenderSettleMode) -> Frame {
    Frame::Attach(Attach {
        name: name.to_owned(),
        handle,
        role: Role::Sender,
        snd_settle_mode: mode,
        rcv_settle_mode: ReceiverSettleMode::First,
        source: Some(Source::default()),
        target: Some(Target {
            address: Some(Bytes::copy_from_slice(address)),
            dynamic: false,
        }),
        initial_delivery_count: Some(0),
    })
}

/// A receiver attach (outgoing link) sourcing from `address`.
pub fn attach_receiver(
    handle: u32,
    name: &str,
    address: &[u8],
    outcomes: &[Outcome],
    default_outcome: Option<Outcome>,
) -> Frame {
    Frame::Attach(Attach {
        name: name.to_owned(),
        handle,
        role: Role::Receiver,
        snd_settle_mode: SenderSettleMode::Unsettled,
        rcv_settle_mode: ReceiverSettleMode::First,
        source: Some(Source {
            address: Some(Bytes::copy_from_slice(address)),
            dynamic: false,
            distribution_mode: None,
            default_outcome,
            outcomes: outcomes.to_vec(),
        }),
        target: Some(Target::default()),
        initial_delivery_count: None,
    })
}

/// A transfer frame carrying `payload`.
pub fn transfer(handle: u32, delivery_id: u32, settled: bool, more: bool, payload: &[u8]) -> Frame {
    Frame::Transfer {
        transfer: Transfer {
            handle,
            delivery_id: Some(delivery_id),
            delivery_tag: Some(Bytes::copy_from_slice(&u64::from(delivery_id).to_be_bytes())),
            settled,
            more,
            resume: false,
            aborted: false,
        },
        payload: Bytes::copy_from_slice(payload),
    }
}

/// A continuation transfer frame. Frames after the first of a
/// multi-frame delivery omit the delivery id and tag.
pub fn continuation(handle: u32, more: bool, payload: &[u8]) -> Frame {
    Frame::Transfer {
        transfer: Transfer {
            handle,
            delivery_id: None,
            delivery_tag: None,
            settled: false,
            more,
            resume: false,
            aborted: false,
        },
        payload: Bytes::copy_from_slice(payload),
    }
}

/// A peer flow granting `link_credit` on `handle`.
///
/// `peer_next_outgoing` must match what the session expects as its next
/// incoming id.
pub fn link_flow(handle: u32, link_credit: u32, peer_next_outgoing: u32) -> Frame {
    Frame::Flow(Flow {
        next_incoming_id: Some(0),
        incoming_window: gangway::MAX_SESSION_BUFFER_SIZE,
        next_outgoing_id: peer_next_outgoing,
        outgoing_window: gangway::MAX_SESSION_BUFFER_SIZE,
        handle: Some(handle),
        link_credit: Some(link_credit),
        ..Flow::default()
    })
}

/// A broker delivery on the consumer tag for `handle`.
pub fn delivery(handle: u32, delivery_tag: u64, payload: &[u8]) -> SessionEvent {
    SessionEvent::Delivery(BrokerDelivery {
        consumer_tag: gangway::link::encode_consumer_tag(handle),
        delivery_tag,
        payload: Bytes::copy_from_slice(payload),
    })
}

/// A session that has completed its begin handshake, with the handshake
/// traffic already drained from the recorder.
pub async fn begun_session(channel: u16, window_size: u32) -> (Session<MockTransport>, Broker) {
    let broker = Broker::default();
    let mut session = Session::new(channel, broker.transport(), CodecHooks::default());
    session
        .handle_event(SessionEvent::Frame(begin(0, window_size)))
        .await
        .expect("begin");
    broker.take_frames();
    broker.take_ops();
    (session, broker)
}
