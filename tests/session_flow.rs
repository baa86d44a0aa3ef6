//! Behavioural tests for the session handshake, flow arithmetic, detach,
//! end, and the actor loop.

mod common;

use common::{BrokerOp, attach_sender, begin, begun_session, delivery, transfer};
use gangway::frames::{Detach, Flow, Frame, SenderSettleMode};
use gangway::hooks::CodecHooks;
use gangway::session::{Session, SessionActor, SessionEvent, SessionStatus};
use gangway::{Condition, MAX_SESSION_BUFFER_SIZE, SessionError};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn begin_clamps_the_window_and_bounds_prefetch() {
    let broker = common::Broker::default();
    let mut session = Session::new(9, broker.transport(), CodecHooks::default());
    session
        .handle_event(SessionEvent::Frame(begin(0, 100_000)))
        .await
        .expect("begin");

    assert_eq!(
        broker.take_ops(),
        vec![BrokerOp::SetPrefetch {
            limit: MAX_SESSION_BUFFER_SIZE as u16,
        }]
    );
    let frames = broker.take_frames();
    assert_eq!(frames.len(), 1);
    let Frame::Begin(reply) = &frames[0] else {
        panic!("expected begin reply, got {:?}", frames[0]);
    };
    assert_eq!(reply.remote_channel, Some(9));
    assert_eq!(reply.next_outgoing_id, 0);
    assert_eq!(reply.window_size, MAX_SESSION_BUFFER_SIZE);
}

#[tokio::test]
async fn small_windows_pass_through_unclamped() {
    let broker = common::Broker::default();
    let mut session = Session::new(1, broker.transport(), CodecHooks::default());
    session
        .handle_event(SessionEvent::Frame(begin(7, 16)))
        .await
        .expect("begin");
    let frames = broker.take_frames();
    let Frame::Begin(reply) = &frames[0] else {
        panic!("expected begin reply");
    };
    assert_eq!(reply.window_size, 16);
}

#[tokio::test]
async fn second_begin_is_an_illegal_state() {
    let (mut session, _broker) = begun_session(1, 16).await;
    let err = session
        .handle_event(SessionEvent::Frame(begin(0, 16)))
        .await
        .expect_err("must fail");
    assert!(matches!(
        err,
        SessionError::Protocol {
            condition: Condition::IllegalState,
            ..
        }
    ));
}

#[tokio::test]
async fn frames_before_begin_are_an_illegal_state() {
    let broker = common::Broker::default();
    let mut session = Session::new(1, broker.transport(), CodecHooks::default());
    let err = session
        .handle_event(SessionEvent::Frame(transfer(0, 0, true, false, b"m")))
        .await
        .expect_err("must fail");
    assert!(matches!(
        err,
        SessionError::Protocol {
            condition: Condition::IllegalState,
            ..
        }
    ));
}

#[tokio::test]
async fn flow_with_stale_next_outgoing_id_violates_the_window() {
    let (mut session, _broker) = begun_session(1, 16).await;
    let err = session
        .handle_event(SessionEvent::Frame(Frame::Flow(Flow {
            next_incoming_id: Some(0),
            incoming_window: 16,
            // The session expects next-incoming-id 0.
            next_outgoing_id: 5,
            outgoing_window: 16,
            ..Flow::default()
        })))
        .await
        .expect_err("must fail");
    assert!(matches!(
        err,
        SessionError::Protocol {
            condition: Condition::WindowViolation,
            ..
        }
    ));
}

#[tokio::test]
async fn flow_claiming_unsent_transfers_violates_the_window() {
    let (mut session, _broker) = begun_session(1, 16).await;
    let err = session
        .handle_event(SessionEvent::Frame(Frame::Flow(Flow {
            // The session has emitted nothing, so 3 is ahead.
            next_incoming_id: Some(3),
            incoming_window: 16,
            next_outgoing_id: 0,
            outgoing_window: 16,
            ..Flow::default()
        })))
        .await
        .expect_err("must fail");
    assert!(matches!(
        err,
        SessionError::Protocol {
            condition: Condition::WindowViolation,
            ..
        }
    ));
}

#[tokio::test]
async fn flow_on_an_unknown_handle_is_an_invalid_field() {
    let (mut session, _broker) = begun_session(1, 16).await;
    let err = session
        .handle_event(SessionEvent::Frame(common::link_flow(11, 1, 0)))
        .await
        .expect_err("must fail");
    assert!(matches!(
        err,
        SessionError::Protocol {
            condition: Condition::InvalidField,
            ..
        }
    ));
}

#[tokio::test]
async fn flow_on_an_incoming_handle_is_informational() {
    let (mut session, broker) = begun_session(1, 16).await;
    session
        .handle_event(SessionEvent::Frame(attach_sender(
            2,
            "pub",
            b"/queue/foo",
            SenderSettleMode::Settled,
        )))
        .await
        .expect("attach");
    broker.take_frames();
    broker.take_ops();

    session
        .handle_event(SessionEvent::Frame(common::link_flow(2, 1, 0)))
        .await
        .expect("flow tolerated");
    assert!(broker.take_frames().is_empty());
    assert!(broker.take_ops().is_empty());
}

#[tokio::test]
async fn a_widening_peer_window_admits_more_deliveries() {
    let (mut session, broker) = begun_session(1, 4).await;
    session
        .handle_event(SessionEvent::Frame(common::attach_receiver(
            3,
            "sub",
            b"/queue/bar",
            &[gangway::frames::Outcome::Accepted],
            Some(gangway::frames::Outcome::Accepted),
        )))
        .await
        .expect("attach");
    broker.take_frames();

    // Exhaust the peer's grant from begin (window 4, no-ack link).
    for tag in 1..=4 {
        session.handle_event(delivery(3, tag, b"m")).await.expect("delivery");
    }
    session.handle_event(delivery(3, 5, b"m")).await.expect("dropped");
    assert_eq!(broker.take_frames().len(), 4);

    // A peer flow advancing its window re-opens admission.
    session
        .handle_event(SessionEvent::Frame(Frame::Flow(Flow {
            next_incoming_id: Some(4),
            incoming_window: 4,
            next_outgoing_id: 0,
            outgoing_window: 4,
            ..Flow::default()
        })))
        .await
        .expect("flow");
    session.handle_event(delivery(3, 6, b"m")).await.expect("delivery");
    assert_eq!(broker.take_frames().len(), 1);
}

#[tokio::test]
async fn detach_frees_the_handle_and_echoes() {
    let (mut session, broker) = begun_session(1, 16).await;
    session
        .handle_event(SessionEvent::Frame(attach_sender(
            2,
            "pub",
            b"/queue/foo",
            SenderSettleMode::Settled,
        )))
        .await
        .expect("attach");
    broker.take_frames();

    session
        .handle_event(SessionEvent::Frame(Frame::Detach(Detach {
            handle: 2,
            closed: true,
            error: None,
        })))
        .await
        .expect("detach");
    assert_eq!(
        broker.take_frames(),
        vec![Frame::Detach(Detach {
            handle: 2,
            closed: true,
            error: None,
        })]
    );

    // The handle can be attached again.
    session
        .handle_event(SessionEvent::Frame(attach_sender(
            2,
            "pub",
            b"/queue/foo",
            SenderSettleMode::Settled,
        )))
        .await
        .expect("reattach");
}

#[tokio::test]
async fn duplicate_attach_on_a_live_handle_is_an_illegal_state() {
    let (mut session, _broker) = begun_session(1, 16).await;
    session
        .handle_event(SessionEvent::Frame(attach_sender(
            2,
            "pub",
            b"/queue/foo",
            SenderSettleMode::Settled,
        )))
        .await
        .expect("attach");
    let err = session
        .handle_event(SessionEvent::Frame(attach_sender(
            2,
            "again",
            b"/queue/foo",
            SenderSettleMode::Settled,
        )))
        .await
        .expect_err("must fail");
    assert!(matches!(
        err,
        SessionError::Protocol {
            condition: Condition::IllegalState,
            ..
        }
    ));
}

#[tokio::test]
async fn peer_end_is_echoed_and_ends_the_session() {
    let (mut session, broker) = begun_session(1, 16).await;
    let status = session
        .handle_event(SessionEvent::Frame(Frame::End(Default::default())))
        .await
        .expect("end");
    assert_eq!(status, SessionStatus::Ended);
    assert_eq!(broker.take_frames(), vec![Frame::End(Default::default())]);
}

#[tokio::test]
async fn transport_loss_ends_the_session_without_frames() {
    let (mut session, broker) = begun_session(1, 16).await;
    let status = session
        .handle_event(SessionEvent::TransportClosed)
        .await
        .expect("closed");
    assert_eq!(status, SessionStatus::Ended);
    assert!(broker.take_frames().is_empty());
}

#[tokio::test]
async fn actor_stops_cleanly_when_the_peer_ends() {
    let broker = common::Broker::default();
    let session = Session::new(1, broker.transport(), CodecHooks::default());
    let (actor, handle) = SessionActor::new(session, 8, CancellationToken::new());
    let task = tokio::spawn(actor.run());

    handle
        .send(SessionEvent::Frame(begin(0, 16)))
        .await
        .expect("send begin");
    handle
        .send(SessionEvent::Frame(Frame::End(Default::default())))
        .await
        .expect("send end");
    task.await.expect("join").expect("clean exit");

    // Begin reply and end echo both made it out.
    let frames = broker.take_frames();
    assert!(matches!(frames.first(), Some(Frame::Begin(_))));
    assert!(matches!(frames.last(), Some(Frame::End(_))));
    assert_eq!(
        handle.try_send(SessionEvent::TransportClosed),
        Err(gangway::session::EventError::Closed)
    );
}

#[tokio::test]
async fn actor_reports_protocol_errors_with_a_final_end_frame() {
    let broker = common::Broker::default();
    let session = Session::new(1, broker.transport(), CodecHooks::default());
    let (actor, handle) = SessionActor::new(session, 8, CancellationToken::new());
    let task = tokio::spawn(actor.run());

    // A transfer before begin is a protocol violation.
    handle
        .send(SessionEvent::Frame(transfer(0, 0, true, false, b"m")))
        .await
        .expect("send transfer");
    let err = task.await.expect("join").expect_err("protocol error");
    assert!(matches!(
        err,
        SessionError::Protocol {
            condition: Condition::IllegalState,
            ..
        }
    ));

    let frames = broker.take_frames();
    let Some(Frame::End(end)) = frames.last() else {
        panic!("expected a final end frame, got {frames:?}");
    };
    assert_eq!(
        end.error.as_ref().expect("end carries the error").condition,
        Condition::IllegalState
    );
}

#[tokio::test]
async fn shutdown_token_ends_the_actor() {
    let broker = common::Broker::default();
    let session = Session::new(1, broker.transport(), CodecHooks::default());
    let shutdown = CancellationToken::new();
    let (actor, _handle) = SessionActor::new(session, 8, shutdown.clone());
    let task = tokio::spawn(actor.run());

    shutdown.cancel();
    task.await.expect("join").expect("clean exit");
    assert!(matches!(
        broker.take_frames().last(),
        Some(Frame::End(_))
    ));
}
