//! Metric helpers for `gangway`.
//!
//! This module defines metric names and helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. All functions become no-ops
//! if the optional `metrics` Cargo feature is disabled.

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Name of the gauge tracking live sessions.
pub const SESSIONS_ACTIVE: &str = "gangway_sessions_active";
/// Name of the counter tracking peer transfers published to the broker.
pub const TRANSFERS_IN: &str = "gangway_transfers_in_total";
/// Name of the counter tracking broker deliveries emitted as transfers.
pub const TRANSFERS_OUT: &str = "gangway_transfers_out_total";
/// Name of the counter tracking deliveries refused at the session window,
/// labelled by whether they were requeued or dropped.
pub const DELIVERIES_REFUSED: &str = "gangway_deliveries_refused_total";

/// Record a session begin.
#[cfg(feature = "metrics")]
pub fn session_opened() { gauge!(SESSIONS_ACTIVE).increment(1.0); }

#[cfg(not(feature = "metrics"))]
pub fn session_opened() {}

/// Record a session end.
#[cfg(feature = "metrics")]
pub fn session_closed() { gauge!(SESSIONS_ACTIVE).decrement(1.0); }

#[cfg(not(feature = "metrics"))]
pub fn session_closed() {}

/// Record a completed incoming transfer published to the broker.
#[cfg(feature = "metrics")]
pub fn transfer_in() { counter!(TRANSFERS_IN).increment(1); }

#[cfg(not(feature = "metrics"))]
pub fn transfer_in() {}

/// Record a broker delivery emitted as an outgoing transfer.
#[cfg(feature = "metrics")]
pub fn transfer_out() { counter!(TRANSFERS_OUT).increment(1); }

#[cfg(not(feature = "metrics"))]
pub fn transfer_out() {}

/// Record a delivery refused at the session window.
///
/// `action` is `"requeued"` for rejected deliveries and `"dropped"` for
/// deliveries lost on no-ack links.
#[cfg(feature = "metrics")]
pub fn delivery_refused(action: &'static str) {
    counter!(DELIVERIES_REFUSED, "action" => action).increment(1);
}

#[cfg(not(feature = "metrics"))]
pub fn delivery_refused(_action: &'static str) {}
