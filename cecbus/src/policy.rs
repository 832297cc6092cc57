//! Retry and bus timing rules
//!
//! The values encode the collision avoidance contract of the CEC line protocol [1; CEC 7.1, 9.2]
//! and must not be tuned.

use crate::core::LogicalAddress;
use crate::driver::adapter::SignalFreeTime;
use crate::driver::frame::Frame;
use crate::driver::status::AttemptCounters;
use crate::time::Duration;

/// Transmission attempts of a regular message
pub const DEFAULT_ATTEMPTS: u8 = 4;

/// Transmission attempts of a poll sent by a configured adapter
///
/// CEC 2.0 recommends fewer retries for polls that do not allocate a logical address.
pub const SECONDARY_POLL_ATTEMPTS: u8 = 2;

/// Upper bound on attempts a driver may make for one transmission
pub const MAX_ATTEMPTS: u64 = 5;

const ATTEMPT_MILLIS: u64 = 400;

/// Upper bound on the duration of one attempt of a 16-byte frame
pub const ATTEMPT_DURATION: Duration = Duration::from_millis(ATTEMPT_MILLIS);

/// Time after which a transmission without a driver report is considered lost
pub const TRANSMIT_WATCHDOG: Duration = Duration::from_millis(MAX_ATTEMPTS * ATTEMPT_MILLIS + 100);

/// Reply timeout used when a reply is requested without a timeout
pub const DEFAULT_REPLY_TIMEOUT: Duration = Duration::from_millis(1000);

/// Number of polls sent per candidate address during arbitration
pub const POLL_ATTEMPTS: usize = 2;

/// Attempt budget for a new transmission
pub fn attempts(frame: &Frame, configured: bool) -> u8 {
    if frame.is_poll() && configured {
        SECONDARY_POLL_ATTEMPTS
    } else {
        DEFAULT_ATTEMPTS
    }
}

/// Selects the bus silence before the next transmission and tracks the last initiator.
///
/// `retry` must be true if the message was attempted before.
pub fn signal_free_time(
    retry: bool,
    initiator: LogicalAddress,
    last_initiator: &mut Option<LogicalAddress>,
) -> SignalFreeTime {
    if retry {
        SignalFreeTime::Retry
    } else if *last_initiator != Some(initiator) {
        *last_initiator = Some(initiator);
        SignalFreeTime::NewInitiator
    } else {
        SignalFreeTime::NextTransfer
    }
}

/// Attempts consumed by a reported transmission. A report always accounts for one attempt.
pub fn attempts_made(counters: &AttemptCounters) -> u8 {
    counters.total().clamp(1, u32::from(u8::MAX)) as u8
}
