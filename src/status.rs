//! Driver-reported per-block conditions.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Conditions the driver reported for a delivered block.
///
/// An empty status means the block was captured normally. Anything else is
/// informational: the block is still delivered and the stream keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CallbackStatus(u8);

impl CallbackStatus {
    /// No condition reported.
    pub const EMPTY: Self = Self(0);
    /// Input data was discarded because it was not consumed in time.
    pub const INPUT_OVERFLOW: Self = Self(1);
    /// The driver had no input data ready and inserted silence.
    pub const INPUT_UNDERFLOW: Self = Self(1 << 1);
    /// The backend reported an error it could not classify.
    pub const DRIVER_ERROR: Self = Self(1 << 2);
    /// The device became unavailable while the stream was open.
    pub const DEVICE_LOST: Self = Self(1 << 3);

    const NAMES: [(Self, &'static str); 4] = [
        (Self::INPUT_OVERFLOW, "input overflow"),
        (Self::INPUT_UNDERFLOW, "input underflow"),
        (Self::DRIVER_ERROR, "driver error"),
        (Self::DEVICE_LOST, "device lost"),
    ];

    /// Returns the raw bit representation.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Builds a status from raw bits, ignoring unknown bits.
    #[must_use]
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & 0b1111)
    }

    /// Returns `true` if no condition is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if every flag in `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets the flags in `other`.
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl BitOr for CallbackStatus {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CallbackStatus {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

impl fmt::Display for CallbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "ok");
        }
        let mut first = true;
        for (flag, name) in Self::NAMES {
            if self.contains(flag) {
                if !first {
                    write!(f, ", ")?;
                }
                write!(f, "{name}")?;
                first = false;
            }
        }
        Ok(())
    }
}
