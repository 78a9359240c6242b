//! Wraparound-aware clock arithmetic.
//!
//! Every timestamp in this crate is a count of 27 MHz ticks. The 90 kHz
//! PTS/DTS carried on the wire is that value divided by 300 and wraps after
//! 33 bits, so the tick clock wraps at [`MAX_PTS2`].

use std::fmt;
use std::ops::Neg;
use std::time::Duration;

/// 90 kHz presentation clock.
pub const PTS_HZ: u64 = 90_000;
/// 27 MHz system clock.
pub const CLOCK_HZ: u64 = 27_000_000;
/// Modulus of the 33-bit 90 kHz clock.
pub const MAX_PTS: u64 = 1 << 33;
/// Modulus of the tick clock.
pub const MAX_PTS2: u64 = MAX_PTS * 300;

const HALF: u64 = MAX_PTS2 / 2;

/// Relative order of two clock values.
///
/// The `Wrapped` variants are reported when the raw difference exceeds half
/// the modulus: the numerically larger value has then wrapped and is really
/// behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PtsOrder {
    /// `a` is ahead of `b` and numerically larger.
    Ahead,
    /// `a` is ahead of `b` across a wrap, numerically smaller.
    AheadWrapped,
    Equal,
    /// `b` is ahead of `a` and numerically larger.
    Behind,
    /// `b` is ahead of `a` across a wrap, numerically smaller.
    BehindWrapped,
}

impl PtsOrder {
    pub fn is_ahead(self) -> bool {
        matches!(self, PtsOrder::Ahead | PtsOrder::AheadWrapped)
    }

    pub fn is_behind(self) -> bool {
        matches!(self, PtsOrder::Behind | PtsOrder::BehindWrapped)
    }

    /// Signed code: +1/+2 ahead, 0 equal, -1/-2 behind.
    pub fn code(self) -> i8 {
        match self {
            PtsOrder::Ahead => 1,
            PtsOrder::AheadWrapped => 2,
            PtsOrder::Equal => 0,
            PtsOrder::Behind => -1,
            PtsOrder::BehindWrapped => -2,
        }
    }
}

impl Neg for PtsOrder {
    type Output = PtsOrder;

    fn neg(self) -> PtsOrder {
        match self {
            PtsOrder::Ahead => PtsOrder::Behind,
            PtsOrder::AheadWrapped => PtsOrder::BehindWrapped,
            PtsOrder::Equal => PtsOrder::Equal,
            PtsOrder::Behind => PtsOrder::Ahead,
            PtsOrder::BehindWrapped => PtsOrder::AheadWrapped,
        }
    }
}

/// Compares two clock values in `[0, MAX_PTS2)`.
pub fn compare(a: u64, b: u64) -> PtsOrder {
    if a > b {
        if a - b > HALF {
            PtsOrder::BehindWrapped
        } else {
            PtsOrder::Ahead
        }
    } else if a == b {
        PtsOrder::Equal
    } else if b - a > HALF {
        PtsOrder::AheadWrapped
    } else {
        PtsOrder::Behind
    }
}

/// Signed distance from `b` to `a`, taking the shorter way around the clock.
pub fn diff_signed(a: u64, b: u64) -> i64 {
    let (a, b) = (a as i64, b as i64);
    match compare(a as u64, b as u64) {
        PtsOrder::Equal => 0,
        PtsOrder::Ahead | PtsOrder::Behind => a - b,
        PtsOrder::AheadWrapped => a + MAX_PTS2 as i64 - b,
        PtsOrder::BehindWrapped => a - (b + MAX_PTS2 as i64),
    }
}

/// Elapsed ticks from `b` forward to `a`, in `[0, MAX_PTS2)`.
pub fn diff_unsigned(a: u64, b: u64) -> u64 {
    if a >= b {
        a - b
    } else {
        MAX_PTS2 - b + a
    }
}

/// Modular addition.
pub fn add(a: u64, b: u64) -> u64 {
    ((a as u128 + b as u128) % MAX_PTS2 as u128) as u64
}

/// Folds a signed tick count back into `[0, MAX_PTS2)`.
pub fn normalize(ticks: i64) -> u64 {
    ticks.rem_euclid(MAX_PTS2 as i64) as u64
}

/// Converts 27 MHz ticks to a duration.
pub fn ticks_to_duration(ticks: u64) -> Duration {
    Duration::from_nanos(((ticks as u128 * 1_000_000_000) / CLOCK_HZ as u128) as u64)
}

/// Converts a duration to 27 MHz ticks, wrapping into clock range.
pub fn duration_to_ticks(time: Duration) -> u64 {
    ((time.as_nanos() * CLOCK_HZ as u128 / 1_000_000_000) % MAX_PTS2 as u128) as u64
}

/// Renders a signed tick value as `H:MM:SS.mmm` for log lines.
#[derive(Debug, Clone, Copy)]
pub struct PtsDisplay(pub i64);

impl fmt::Display for PtsDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 0 {
            write!(f, "-")?;
        }
        let ticks = (self.0.unsigned_abs() / 300 % MAX_PTS) * 300;
        let millis = ticks_to_duration(ticks).as_millis();
        write!(
            f,
            "{}:{:02}:{:02}.{:03}",
            millis / 3_600_000,
            millis / 60_000 % 60,
            millis / 1000 % 60,
            millis % 1000
        )
    }
}
