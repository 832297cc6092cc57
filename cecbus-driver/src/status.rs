//! Transmission outcome reported by the driver

/// Transmit status bits
///
/// A driver report carries exactly one outcome bit, optionally with `MAX_RETRIES`.
/// The engine accumulates the bits of all reports for a message and adds `ABORTED`
/// and `TIMEOUT` for messages it cancels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxStatus(u8);

impl TxStatus {
    pub const NONE: Self = Self(0);
    pub const OK: Self = Self(0x01);
    pub const ARB_LOST: Self = Self(0x02);
    pub const NACK: Self = Self(0x04);
    pub const LOW_DRIVE: Self = Self(0x08);
    pub const ERROR: Self = Self(0x10);
    pub const MAX_RETRIES: Self = Self(0x20);
    pub const ABORTED: Self = Self(0x40);
    pub const TIMEOUT: Self = Self(0x80);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub const fn into_bits(self) -> u8 {
        self.0
    }

    /// True if all bits of `other` are set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any bit of `other` is set
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// The outcome bit without `MAX_RETRIES`
    pub const fn outcome(self) -> Self {
        Self(self.0 & !Self::MAX_RETRIES.0)
    }
}

impl Default for TxStatus {
    fn default() -> Self {
        Self::NONE
    }
}

impl core::ops::BitOr for TxStatus {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign for TxStatus {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Failed attempt counters, one per failure cause
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AttemptCounters {
    pub arb_lost: u8,
    pub nack: u8,
    pub low_drive: u8,
    pub error: u8,
}

impl AttemptCounters {
    /// Counters of a single attempt that ended with `status`
    pub fn from_status(status: TxStatus) -> Self {
        let mut counters = Self::default();
        let outcome = status.outcome();
        if outcome == TxStatus::ARB_LOST {
            counters.arb_lost = 1;
        } else if outcome == TxStatus::NACK {
            counters.nack = 1;
        } else if outcome == TxStatus::LOW_DRIVE {
            counters.low_drive = 1;
        } else if outcome == TxStatus::ERROR {
            counters.error = 1;
        }
        counters
    }

    pub fn total(&self) -> u32 {
        u32::from(self.arb_lost)
            + u32::from(self.nack)
            + u32::from(self.low_drive)
            + u32::from(self.error)
    }

    /// Adds `other` with saturation
    pub fn accumulate(&mut self, other: &Self) {
        self.arb_lost = self.arb_lost.saturating_add(other.arb_lost);
        self.nack = self.nack.saturating_add(other.nack);
        self.low_drive = self.low_drive.saturating_add(other.low_drive);
        self.error = self.error.saturating_add(other.error);
    }
}
