//! RFC 1982 serial-number arithmetic for transfer ids and delivery counts.
//!
//! Transfer ids and delivery counts are 32-bit serial numbers that wrap at
//! 2^32. Plain integer comparison misorders values that straddle the wrap
//! point, so ordering uses the RFC 1982 window rule: `a` precedes `b` when
//! the forward distance from `a` to `b` is non-zero and below 2^31. A
//! distance of exactly 2^31 is undefined by the RFC; both orderings report
//! false for such pairs.

/// Half of the 32-bit serial space; the comparison horizon.
const HORIZON: u32 = 1 << 31;

/// Add `n` to serial number `a`, wrapping modulo 2^32.
#[must_use]
pub const fn add(a: u32, n: u32) -> u32 { a.wrapping_add(n) }

/// The serial number immediately after `a`.
#[must_use]
pub const fn succ(a: u32) -> u32 { a.wrapping_add(1) }

/// True when `a` precedes `b` in serial order.
#[must_use]
pub const fn lt(a: u32, b: u32) -> bool {
    let forward = b.wrapping_sub(a);
    forward != 0 && forward < HORIZON
}

/// True when `a` precedes or equals `b` in serial order.
#[must_use]
pub const fn lte(a: u32, b: u32) -> bool { a == b || lt(a, b) }

/// Inclusive membership test for the serial window `[first, last]`.
#[must_use]
pub const fn in_window(t: u32, first: u32, last: u32) -> bool { lte(first, t) && lte(t, last) }

#[cfg(test)]
#[path = "serial_tests.rs"]
mod tests;
