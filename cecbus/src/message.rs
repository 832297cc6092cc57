//! Message value type with its delivery metadata

use crate::core::Opcode;
use crate::driver::frame::Frame;
use crate::driver::status::{AttemptCounters, TxStatus};
use crate::time::{Duration, Instant};

/// Receive status bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxStatus(u8);

impl RxStatus {
    pub const NONE: Self = Self(0);
    /// A message was received, either unsolicited or as a reply
    pub const OK: Self = Self(0x01);
    /// No reply arrived within the reply timeout
    pub const TIMEOUT: Self = Self(0x02);
    /// The reply is a Feature Abort of the request
    pub const FEATURE_ABORT: Self = Self(0x04);
    /// The wait for a reply was cancelled
    pub const ABORTED: Self = Self(0x08);

    pub const fn into_bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl Default for RxStatus {
    fn default() -> Self {
        Self::NONE
    }
}

impl core::ops::BitOr for RxStatus {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Submission flags
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MessageFlags(u8);

impl MessageFlags {
    pub const NONE: Self = Self(0);
    /// Deliver the correlated reply to event listeners as well
    pub const REPLY_TO_FOLLOWERS: Self = Self(0x01);
    /// Skip addressing checks at admission
    pub const RAW: Self = Self(0x02);

    const KNOWN: Self = Self(Self::REPLY_TO_FOLLOWERS.0 | Self::RAW.0);

    pub const fn from_bits_truncating(bits: u8) -> Self {
        Self(bits & Self::KNOWN.0)
    }

    pub const fn into_bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl core::ops::BitOr for MessageFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Accumulated transmission outcome
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxReport {
    pub status: TxStatus,
    pub counters: AttemptCounters,
    pub timestamp: Option<Instant>,
}

/// Reception or reply outcome
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RxReport {
    pub status: RxStatus,
    pub timestamp: Option<Instant>,
}

/// A CEC message
///
/// The same type describes a message submitted for transmission and a message received from
/// the bus. A submitted message that expects a reply gets the reply frame written over
/// its own frame once the reply arrives, with `rx` describing the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Message {
    pub frame: Frame,
    /// Opcode of the expected reply
    pub reply: Option<Opcode>,
    /// Time to wait for the reply after a successful transmission
    pub timeout: Option<Duration>,
    /// Non-zero identifier assigned on admission
    pub sequence: u32,
    pub flags: MessageFlags,
    pub tx: TxReport,
    pub rx: RxReport,
}

impl Message {
    pub const fn new(frame: Frame) -> Self {
        Self {
            frame,
            reply: None,
            timeout: None,
            sequence: 0,
            flags: MessageFlags::NONE,
            tx: TxReport {
                status: TxStatus::NONE,
                counters: AttemptCounters {
                    arb_lost: 0,
                    nack: 0,
                    low_drive: 0,
                    error: 0,
                },
                timestamp: None,
            },
            rx: RxReport {
                status: RxStatus::NONE,
                timestamp: None,
            },
        }
    }

    /// Sets the expected reply. Without a timeout, the default reply timeout applies.
    pub const fn with_reply(mut self, opcode: Opcode, timeout: Option<Duration>) -> Self {
        self.reply = Some(opcode);
        self.timeout = timeout;
        self
    }

    pub const fn with_flags(mut self, flags: MessageFlags) -> Self {
        self.flags = flags;
        self
    }

    pub(crate) fn received(frame: Frame, timestamp: Instant) -> Self {
        let mut message = Self::new(frame);
        message.rx = RxReport {
            status: RxStatus::OK,
            timestamp: Some(timestamp),
        };
        message
    }

    /// True if the message was transmitted and, when a reply was requested, the reply arrived
    pub fn is_ok(&self) -> bool {
        self.tx.status.contains(TxStatus::OK)
            && (self.timeout.is_none() || self.rx.status.contains(RxStatus::OK))
    }
}
