//! The session core: windows, links, unsettled maps, frame dispatch.
//!
//! A [`Session`] owns every piece of per-session state and is driven one
//! event at a time by its [`SessionActor`]. Inbound 1.0 frames mutate link
//! state and issue operations on the backing channel; broker events come
//! back as 1.0 frames. Two unsettled maps bridge the id spaces: publish
//! ids correlate peer transfers with broker confirms, and outgoing
//! transfer ids correlate broker deliveries with peer dispositions.

mod actor;
mod event;
mod registry;

pub use actor::{EventError, SessionActor, SessionHandle};
pub use event::SessionEvent;
pub use registry::{ChannelInUse, SessionRegistry};

use std::collections::{BTreeMap, HashMap};

use bytes::Bytes;
use log::{debug, trace, warn};

use crate::address::{self, ResolveError};
use crate::error::{Condition, ErrorInfo, SessionError};
use crate::frames::{
    Attach, Begin, Detach, Disposition, End, Flow, Frame, Handle, Outcome, Role, SenderSettleMode,
    Source, Target, Transfer, TransferId, delivery_tag_bytes,
};
use crate::hooks::CodecHooks;
use crate::link::{
    INCOMING_CREDIT, IncomingLink, OutgoingLink, decode_consumer_tag, encode_consumer_tag,
    negotiate_outcomes,
};
use crate::metrics;
use crate::serial;
use crate::transport::{BrokerDelivery, DeclareError, DeclaringChannel, Transport, TransportError};

/// Upper bound applied to the peer's requested session window at begin.
pub const MAX_SESSION_BUFFER_SIZE: u32 = 4096;

/// Whether the session keeps running after an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Ended,
}

/// A broker delivery awaiting the peer's disposition.
#[derive(Clone, Copy, Debug)]
struct UnsettledDelivery {
    delivery_tag: u64,
    expected_outcome: Outcome,
}

/// Per-session bridge state machine.
///
/// Owned exclusively by one cooperative task; see [`SessionActor`] for
/// the scheduling contract.
pub struct Session<T> {
    channel: u16,
    transport: T,
    hooks: CodecHooks,
    declaring: Option<Box<dyn DeclaringChannel>>,
    begun: bool,
    next_outgoing_id: TransferId,
    next_incoming_id: TransferId,
    max_outgoing_id: TransferId,
    window_size: u32,
    /// Counter correlating publishes with broker confirms. Zero until a
    /// link enables confirm mode; confirms count every publish on the
    /// channel from then on, so it advances per publish regardless of the
    /// publishing link's settle mode.
    next_publish_id: u64,
    incoming_unsettled: BTreeMap<u64, TransferId>,
    outgoing_unsettled: BTreeMap<TransferId, UnsettledDelivery>,
    incoming_links: HashMap<Handle, IncomingLink>,
    outgoing_links: HashMap<Handle, OutgoingLink>,
}

impl<T: Transport> Session<T> {
    /// Create session state for the given peer-assigned channel.
    #[must_use]
    pub fn new(channel: u16, transport: T, hooks: CodecHooks) -> Self {
        Self {
            channel,
            transport,
            hooks,
            declaring: None,
            begun: false,
            next_outgoing_id: 0,
            next_incoming_id: 0,
            max_outgoing_id: 0,
            window_size: 0,
            next_publish_id: 0,
            incoming_unsettled: BTreeMap::new(),
            outgoing_unsettled: BTreeMap::new(),
            incoming_links: HashMap::new(),
            outgoing_links: HashMap::new(),
        }
    }

    /// Channel number the peer assigned at begin.
    #[must_use]
    pub const fn channel(&self) -> u16 { self.channel }

    /// Number of outgoing transfers awaiting peer disposition.
    #[must_use]
    pub fn outgoing_unsettled_len(&self) -> usize { self.outgoing_unsettled.len() }

    /// Number of peer transfers awaiting broker confirm.
    #[must_use]
    pub fn incoming_unsettled_len(&self) -> usize { self.incoming_unsettled.len() }

    /// Service one inbox event to completion.
    pub async fn handle_event(
        &mut self,
        event: SessionEvent,
    ) -> Result<SessionStatus, SessionError> {
        match event {
            SessionEvent::Frame(frame) => return self.on_frame(frame).await,
            SessionEvent::Delivery(delivery) => self.on_delivery(delivery).await?,
            SessionEvent::Confirm {
                delivery_tag,
                multiple,
            } => self.on_confirm(delivery_tag, multiple).await?,
            SessionEvent::CreditState {
                consumer_tag,
                credit,
                available,
                drain,
            } => {
                self.on_credit_state(&consumer_tag, credit, available, drain)
                    .await?;
            }
            SessionEvent::TransportClosed => {
                self.finish();
                return Ok(SessionStatus::Ended);
            }
        }
        Ok(SessionStatus::Active)
    }

    async fn on_frame(&mut self, frame: Frame) -> Result<SessionStatus, SessionError> {
        if !self.begun && !matches!(frame, Frame::Begin(_) | Frame::End(_)) {
            return Err(SessionError::illegal_state("frame received before begin"));
        }
        match frame {
            Frame::Begin(begin) => self.on_begin(begin).await?,
            Frame::Attach(attach) => self.on_attach(attach).await?,
            Frame::Flow(flow) => self.on_flow(&flow).await?,
            Frame::Transfer { transfer, payload } => self.on_transfer(&transfer, payload).await?,
            Frame::Disposition(disposition) => self.on_disposition(&disposition).await?,
            Frame::Detach(detach) => self.on_detach(&detach).await?,
            Frame::End(_) => {
                self.transport.send_frame(Frame::End(End::default())).await?;
                self.finish();
                return Ok(SessionStatus::Ended);
            }
        }
        Ok(SessionStatus::Active)
    }

    async fn on_begin(&mut self, begin: Begin) -> Result<(), SessionError> {
        if self.begun {
            return Err(SessionError::illegal_state("begin on an open session"));
        }
        let window = begin.window_size.min(MAX_SESSION_BUFFER_SIZE);
        // The clamp keeps the window within u16 range for the prefetch.
        let prefetch = u16::try_from(window).unwrap_or(u16::MAX);
        self.transport.set_prefetch(prefetch).await?;
        let reply = Begin {
            remote_channel: Some(self.channel),
            next_outgoing_id: self.next_outgoing_id,
            window_size: window,
        };
        self.transport.send_frame(Frame::Begin(reply)).await?;
        self.next_incoming_id = begin.next_outgoing_id;
        self.max_outgoing_id = serial::add(begin.next_outgoing_id, begin.window_size);
        self.window_size = window;
        self.begun = true;
        metrics::session_opened();
        debug!(
            "session begun on channel {} with window {window}",
            self.channel
        );
        Ok(())
    }

    /// Session-level fields carried on every flow this session emits.
    fn session_flow(&self) -> Flow {
        let outgoing_used = u32::try_from(self.outgoing_unsettled.len()).unwrap_or(u32::MAX);
        Flow {
            next_incoming_id: Some(self.next_incoming_id),
            incoming_window: self.window_size,
            next_outgoing_id: self.next_outgoing_id,
            outgoing_window: self.window_size.saturating_sub(outgoing_used),
            ..Flow::default()
        }
    }

    async fn on_attach(&mut self, attach: Attach) -> Result<(), SessionError> {
        if self.incoming_links.contains_key(&attach.handle)
            || self.outgoing_links.contains_key(&attach.handle)
        {
            return Err(SessionError::illegal_state(format!(
                "handle {} is already attached",
                attach.handle
            )));
        }
        match attach.role {
            Role::Sender => self.attach_incoming(attach).await,
            Role::Receiver => self.attach_outgoing(attach).await,
        }
    }

    /// Attach an incoming link: the peer sends, the bridge publishes.
    async fn attach_incoming(&mut self, attach: Attach) -> Result<(), SessionError> {
        let Some(target) = attach.target.clone() else {
            return Err(SessionError::invalid_field("sender attach carries no target"));
        };
        let chan = self.declaring().await?;
        let resolved = match address::resolve_target(chan, &target).await {
            Ok(resolved) => resolved,
            Err(err) => {
                let info = self.resolve_failure(err)?;
                return self.refuse_attach(&attach, info).await;
            }
        };
        let confirms = attach.snd_settle_mode != SenderSettleMode::Settled;
        if confirms && self.next_publish_id == 0 {
            self.transport.select_confirms().await?;
            self.next_publish_id = 1;
        }
        let link = IncomingLink::new(
            attach.name.clone(),
            resolved.exchange,
            resolved.routing_key,
            attach.initial_delivery_count.unwrap_or(0),
            confirms,
        );
        let reply = Attach {
            name: attach.name.clone(),
            handle: attach.handle,
            role: Role::Receiver,
            snd_settle_mode: attach.snd_settle_mode,
            rcv_settle_mode: attach.rcv_settle_mode,
            source: attach.source,
            target: Some(Target {
                address: resolved.address.or(target.address),
                dynamic: target.dynamic,
            }),
            initial_delivery_count: None,
        };
        self.transport.send_frame(Frame::Attach(reply)).await?;
        let mut flow = self.session_flow();
        flow.handle = Some(attach.handle);
        flow.delivery_count = Some(link.delivery_count());
        flow.link_credit = Some(INCOMING_CREDIT);
        self.transport.send_frame(Frame::Flow(flow)).await?;
        debug!(
            "incoming link {:?} attached on handle {}",
            attach.name, attach.handle
        );
        self.incoming_links.insert(attach.handle, link);
        Ok(())
    }

    /// Attach an outgoing link: the broker delivers, the bridge transfers.
    async fn attach_outgoing(&mut self, attach: Attach) -> Result<(), SessionError> {
        let Some(source) = attach.source.clone() else {
            return Err(SessionError::invalid_field(
                "receiver attach carries no source",
            ));
        };
        let negotiated = match negotiate_outcomes(&source) {
            Ok(negotiated) => negotiated,
            Err(info) => return self.refuse_attach(&attach, info).await,
        };
        let chan = self.declaring().await?;
        let resolved = match address::resolve_source(chan, &source).await {
            Ok(resolved) => resolved,
            Err(err) => {
                let info = self.resolve_failure(err)?;
                return self.refuse_attach(&attach, info).await;
            }
        };
        if let Some(mode) = source.distribution_mode
            && mode != resolved.distribution
        {
            let info = ErrorInfo::new(
                Condition::NotImplemented,
                format!("{mode:?} distribution is not available from this source"),
            );
            return self.refuse_attach(&attach, info).await;
        }
        let consumer_tag = encode_consumer_tag(attach.handle);
        // Credit starts at zero so nothing ships before the peer grants it.
        if let Err(err) = self
            .transport
            .consume(&resolved.queue, &consumer_tag, negotiated.no_ack, 0)
            .await
        {
            warn!("consume failed for link {:?}: {err}", attach.name);
            return self
                .refuse_attach(&attach, ErrorInfo::bare(Condition::InternalError))
                .await;
        }
        let link = OutgoingLink::new(
            attach.name.clone(),
            resolved.queue,
            negotiated.no_ack,
            negotiated.default_outcome,
        );
        let reply = Attach {
            name: attach.name.clone(),
            handle: attach.handle,
            role: Role::Sender,
            snd_settle_mode: if negotiated.no_ack {
                SenderSettleMode::Settled
            } else {
                SenderSettleMode::Unsettled
            },
            rcv_settle_mode: attach.rcv_settle_mode,
            source: Some(Source {
                address: resolved.address.or(source.address),
                dynamic: source.dynamic,
                distribution_mode: Some(resolved.distribution),
                default_outcome: Some(negotiated.default_outcome),
                outcomes: source.outcomes,
            }),
            target: attach.target,
            initial_delivery_count: Some(link.transfer_count()),
        };
        self.transport.send_frame(Frame::Attach(reply)).await?;
        debug!(
            "outgoing link {:?} attached on handle {} (no_ack={})",
            attach.name, attach.handle, negotiated.no_ack
        );
        self.outgoing_links.insert(attach.handle, link);
        Ok(())
    }

    /// Refuse an attach: echo it with an empty linkage, then detach with
    /// the error. The session keeps running.
    async fn refuse_attach(
        &mut self,
        attach: &Attach,
        info: ErrorInfo,
    ) -> Result<(), SessionError> {
        warn!(
            "refusing attach of link {:?}: {}",
            attach.name,
            info.condition.as_symbol()
        );
        let reply = Attach {
            name: attach.name.clone(),
            handle: attach.handle,
            role: match attach.role {
                Role::Sender => Role::Receiver,
                Role::Receiver => Role::Sender,
            },
            snd_settle_mode: attach.snd_settle_mode,
            rcv_settle_mode: attach.rcv_settle_mode,
            source: None,
            target: None,
            initial_delivery_count: None,
        };
        self.transport.send_frame(Frame::Attach(reply)).await?;
        let detach = Detach {
            handle: attach.handle,
            closed: true,
            error: Some(info),
        };
        self.transport.send_frame(Frame::Detach(detach)).await?;
        Ok(())
    }

    /// Map a resolution failure onto the attach-refusal path, poisoning
    /// the declaring channel on broker failures. Address errors are
    /// protocol violations and fatal.
    fn resolve_failure(&mut self, err: ResolveError) -> Result<ErrorInfo, SessionError> {
        match err {
            ResolveError::Address(err) => Err(SessionError::invalid_field(err.to_string())),
            ResolveError::Declare(err) => {
                // Any failure reply leaves the channel unusable; the next
                // attach opens a fresh one.
                self.declaring = None;
                let condition = match &err {
                    DeclareError::NotFound { .. } => Condition::NotFound,
                    DeclareError::Failed(_) => Condition::InternalError,
                };
                Ok(ErrorInfo::new(condition, err.to_string()))
            }
        }
    }

    /// The declaring channel, opened lazily on first use.
    async fn declaring(&mut self) -> Result<&mut dyn DeclaringChannel, TransportError> {
        if self.declaring.is_none() {
            self.declaring = Some(self.transport.open_declaring().await?);
        }
        match self.declaring.as_deref_mut() {
            Some(chan) => Ok(chan),
            None => Err(TransportError::ChannelFailure(
                "declaring channel unavailable".into(),
            )),
        }
    }

    async fn on_flow(&mut self, flow: &Flow) -> Result<(), SessionError> {
        if flow.next_outgoing_id != self.next_incoming_id {
            return Err(SessionError::window_violation(format!(
                "peer next-outgoing-id {} does not match next-incoming-id {}",
                flow.next_outgoing_id, self.next_incoming_id
            )));
        }
        match flow.next_incoming_id {
            Some(next_incoming) => {
                if !serial::lte(next_incoming, self.next_outgoing_id) {
                    return Err(SessionError::window_violation(format!(
                        "peer next-incoming-id {next_incoming} is ahead of next-outgoing-id {}",
                        self.next_outgoing_id
                    )));
                }
                self.max_outgoing_id = serial::add(next_incoming, flow.incoming_window);
            }
            // The peer has not processed our begin yet; its window counts
            // from the session's initial outgoing id, which is zero.
            None => self.max_outgoing_id = flow.incoming_window,
        }
        let Some(handle) = flow.handle else {
            return Ok(());
        };
        if self.outgoing_links.contains_key(&handle) {
            self.flow_outgoing(handle, flow).await
        } else if self.incoming_links.contains_key(&handle) {
            trace!("informational flow on incoming handle {handle}");
            Ok(())
        } else {
            Err(SessionError::invalid_field(format!(
                "flow names unknown handle {handle}"
            )))
        }
    }

    /// Delegate a link flow to broker credit and echo the result.
    async fn flow_outgoing(&mut self, handle: Handle, flow: &Flow) -> Result<(), SessionError> {
        let credit = flow.link_credit.unwrap_or(0);
        let consumer_tag = encode_consumer_tag(handle);
        let available = self
            .transport
            .credit(&consumer_tag, credit, flow.drain)
            .await?;
        let Some(available) = available else {
            // The broker cannot report availability; suppress the echo.
            return Ok(());
        };
        let Some(link) = self.outgoing_links.get(&handle) else {
            return Ok(());
        };
        let transfer_count = link.transfer_count();
        let mut reply = self.session_flow();
        reply.handle = Some(handle);
        reply.delivery_count = Some(transfer_count);
        reply.link_credit = Some(credit);
        reply.available = Some(available);
        reply.drain = flow.drain;
        self.transport.send_frame(Frame::Flow(reply)).await?;
        Ok(())
    }

    async fn on_transfer(
        &mut self,
        transfer: &Transfer,
        payload: Bytes,
    ) -> Result<(), SessionError> {
        let transfer_id = transfer.delivery_id.unwrap_or(self.next_incoming_id);
        self.next_incoming_id = serial::succ(transfer_id);
        let Some(link) = self.incoming_links.get_mut(&transfer.handle) else {
            return Err(SessionError::illegal_state(format!(
                "transfer on unknown handle {}",
                transfer.handle
            )));
        };
        if transfer.more {
            link.accumulate(transfer_id, payload);
            return Ok(());
        }
        let (delivery_id, message) = link.assemble(transfer_id, payload);
        let subject = self.hooks.subject_of(&message);
        let routing_key = link.routing_key(subject);
        self.transport
            .publish(link.exchange(), &routing_key, message)
            .await?;
        metrics::transfer_in();
        let confirms = link.confirms();
        let replenish = link.transfer_completed();
        if let Some(delivery_count) = replenish {
            let mut flow = self.session_flow();
            flow.handle = Some(transfer.handle);
            flow.delivery_count = Some(delivery_count);
            flow.link_credit = Some(INCOMING_CREDIT);
            self.transport.send_frame(Frame::Flow(flow)).await?;
        }
        if self.next_publish_id > 0 {
            let publish_id = self.next_publish_id;
            self.next_publish_id += 1;
            if confirms && !transfer.settled {
                self.incoming_unsettled.insert(publish_id, delivery_id);
            }
        }
        Ok(())
    }

    /// The peer disposed of outgoing transfers; map each outcome onto the
    /// broker acknowledgement vocabulary and settle.
    async fn on_disposition(&mut self, disposition: &Disposition) -> Result<(), SessionError> {
        if disposition.role != Role::Receiver {
            trace!("ignoring sender disposition");
            return Ok(());
        }
        if self.outgoing_unsettled.is_empty() {
            return Ok(());
        }
        let first = disposition.first;
        let last = disposition.last.unwrap_or(first);
        let (low, high) = self.outgoing_unsettled_bounds();
        // Ranges entirely off either end settle nothing. Ids the peer
        // disposes of that the session no longer tracks are not an error.
        if serial::lt(last, low) || serial::lt(high, first) {
            return Ok(());
        }
        let matching: Vec<TransferId> = self
            .outgoing_unsettled
            .keys()
            .copied()
            .filter(|id| serial::in_window(*id, first, last))
            .collect();
        for transfer_id in matching {
            let Some(entry) = self.outgoing_unsettled.remove(&transfer_id) else {
                continue;
            };
            let outcome = disposition.state.unwrap_or(entry.expected_outcome);
            self.apply_outcome(entry.delivery_tag, outcome).await?;
        }
        if !disposition.settled {
            let echo = Disposition {
                role: Role::Sender,
                first,
                last: Some(last),
                settled: true,
                state: disposition.state,
            };
            self.transport.send_frame(Frame::Disposition(echo)).await?;
        }
        Ok(())
    }

    /// Smallest and largest unsettled transfer ids in serial order.
    ///
    /// The map is bounded by the session window, far below the serial
    /// horizon, so a linear scan with serial comparison is exact even
    /// across wraparound.
    fn outgoing_unsettled_bounds(&self) -> (TransferId, TransferId) {
        let mut keys = self.outgoing_unsettled.keys().copied();
        let seed = keys.next().unwrap_or_default();
        keys.fold((seed, seed), |(low, high), id| {
            (
                if serial::lt(id, low) { id } else { low },
                if serial::lt(high, id) { id } else { high },
            )
        })
    }

    async fn apply_outcome(
        &mut self,
        delivery_tag: u64,
        outcome: Outcome,
    ) -> Result<(), TransportError> {
        match outcome {
            Outcome::Accepted => self.transport.ack(delivery_tag, false).await,
            Outcome::Rejected => self.transport.reject(delivery_tag, false).await,
            // Released and modified deliveries go back to the queue.
            Outcome::Released | Outcome::Modified => {
                self.transport.reject(delivery_tag, true).await
            }
        }
    }

    /// A broker confirm settles every publish at or below the tag.
    async fn on_confirm(&mut self, delivery_tag: u64, multiple: bool) -> Result<(), SessionError> {
        trace!("broker confirm tag {delivery_tag} multiple={multiple}");
        // Confirms arrive in publish order, so everything at or below the
        // tag is durable whether or not `multiple` is set.
        let mut settled: Vec<TransferId> = Vec::new();
        while let Some(entry) = self.incoming_unsettled.first_entry() {
            if *entry.key() > delivery_tag {
                break;
            }
            settled.push(entry.remove());
        }
        let (Some(first), Some(last)) = (settled.first().copied(), settled.last().copied()) else {
            return Ok(());
        };
        let disposition = Disposition {
            role: Role::Sender,
            first,
            last: Some(last),
            settled: true,
            state: Some(Outcome::Accepted),
        };
        self.transport
            .send_frame(Frame::Disposition(disposition))
            .await?;
        Ok(())
    }

    /// A broker delivery becomes an outgoing transfer, window permitting.
    async fn on_delivery(&mut self, delivery: BrokerDelivery) -> Result<(), SessionError> {
        let Some(handle) = decode_consumer_tag(&delivery.consumer_tag) else {
            warn!(
                "delivery on foreign consumer tag {:?}",
                delivery.consumer_tag
            );
            self.transport.reject(delivery.delivery_tag, true).await?;
            return Ok(());
        };
        let Some(link) = self.outgoing_links.get_mut(&handle) else {
            // Deliveries can race a detach; send them back.
            debug!("delivery for detached handle {handle}");
            self.transport.reject(delivery.delivery_tag, true).await?;
            return Ok(());
        };
        let transfer_id = self.next_outgoing_id;
        let window_used = u32::try_from(self.outgoing_unsettled.len()).unwrap_or(u32::MAX);
        let admitted =
            serial::lt(transfer_id, self.max_outgoing_id) && window_used < self.window_size;
        if !admitted {
            if link.no_ack() {
                // Nothing to requeue on a no-ack subscription; the peer
                // shrank its window after the broker committed.
                warn!(
                    "dropping delivery {} on saturated no-ack link {handle}",
                    delivery.delivery_tag
                );
                metrics::delivery_refused("dropped");
            } else {
                self.transport.reject(delivery.delivery_tag, true).await?;
                metrics::delivery_refused("requeued");
            }
            return Ok(());
        }
        let no_ack = link.no_ack();
        let expected_outcome = link.default_outcome();
        link.transfer_emitted();
        let transfer = Transfer {
            handle,
            delivery_id: Some(transfer_id),
            delivery_tag: Some(delivery_tag_bytes(delivery.delivery_tag)),
            settled: no_ack,
            more: false,
            resume: false,
            aborted: false,
        };
        self.transport
            .send_frame(Frame::Transfer {
                transfer,
                payload: delivery.payload,
            })
            .await?;
        if !no_ack {
            self.outgoing_unsettled.insert(
                transfer_id,
                UnsettledDelivery {
                    delivery_tag: delivery.delivery_tag,
                    expected_outcome,
                },
            );
        }
        self.next_outgoing_id = serial::succ(transfer_id);
        metrics::transfer_out();
        Ok(())
    }

    /// A broker credit notification becomes a flow on the owning link.
    async fn on_credit_state(
        &mut self,
        consumer_tag: &[u8],
        credit: u32,
        available: Option<u32>,
        drain: bool,
    ) -> Result<(), SessionError> {
        let Some(handle) = decode_consumer_tag(consumer_tag) else {
            debug!("credit state on foreign consumer tag {consumer_tag:?}");
            return Ok(());
        };
        let Some(link) = self.outgoing_links.get(&handle) else {
            debug!("credit state for detached handle {handle}");
            return Ok(());
        };
        let Some(available) = available else {
            return Ok(());
        };
        let transfer_count = link.transfer_count();
        let mut flow = self.session_flow();
        flow.handle = Some(handle);
        flow.delivery_count = Some(transfer_count);
        flow.link_credit = Some(credit);
        flow.available = Some(available);
        flow.drain = drain;
        self.transport.send_frame(Frame::Flow(flow)).await?;
        Ok(())
    }

    async fn on_detach(&mut self, detach: &Detach) -> Result<(), SessionError> {
        let known = self.incoming_links.remove(&detach.handle).is_some()
            || self.outgoing_links.remove(&detach.handle).is_some();
        if !known {
            debug!("detach for unknown handle {}", detach.handle);
        }
        // Unsettled entries for the link stay behind; late dispositions
        // and confirms still resolve them.
        let reply = Detach {
            handle: detach.handle,
            closed: detach.closed,
            error: None,
        };
        self.transport.send_frame(Frame::Detach(reply)).await?;
        Ok(())
    }

    /// End the session from this side, e.g. on actor shutdown.
    pub async fn shutdown(&mut self) {
        if self
            .transport
            .send_frame(Frame::End(End::default()))
            .await
            .is_err()
        {
            debug!("end frame lost on closed writer");
        }
        self.finish();
    }

    /// Report a fatal error to the peer; send failures are moot here.
    pub async fn terminate(&mut self, error: &SessionError) {
        let end = End {
            error: error.error_info(),
        };
        if self.transport.send_frame(Frame::End(end)).await.is_err() {
            debug!("end frame lost on closed writer");
        }
        self.finish();
    }

    fn finish(&mut self) {
        self.declaring = None;
        if self.begun {
            self.begun = false;
            metrics::session_closed();
        }
    }
}
