//! Callbacks from the driver into the cecbus engine

use crate::frame::Frame;
use crate::internal;
use crate::status::{AttemptCounters, TxStatus};
use crate::time::Instant;

/// Reporting side of the driver interface
///
/// The handle is cheap to copy. All methods are non-blocking and may be called from an
/// interrupt context, given the node was created with an interrupt-safe mutex.
#[derive(Clone, Copy)]
pub struct Link<'a>(&'a (dyn internal::DynamicLink + Sync));

impl<'a> Link<'a> {
    pub fn new(access: &'a (dyn internal::DynamicLink + Sync)) -> Self {
        Self(access)
    }

    /// Reports the outcome of the current transmission.
    ///
    /// `status` carries exactly one of `OK`, `ARB_LOST`, `NACK`, `LOW_DRIVE`, `ERROR`,
    /// optionally combined with `MAX_RETRIES` when the driver gave up retrying itself.
    /// `counters` sum up the failed attempts the driver made.
    pub fn transmit_done(&self, status: TxStatus, counters: AttemptCounters, timestamp: Instant) {
        self.0.transmit_done(status, counters, timestamp);
    }

    /// Reports the outcome of a single transmission attempt.
    ///
    /// Simplified form of `transmit_done` for drivers without hardware retries.
    pub fn transmit_attempt_done(&self, status: TxStatus, timestamp: Instant) {
        let counters = AttemptCounters::from_status(status);
        self.0.transmit_done(status, counters, timestamp);
    }

    /// Passes a frame observed on the bus.
    ///
    /// The driver should push every frame it receives, including frames addressed to other
    /// devices when monitor-all mode is enabled. Echoes of own transmissions are tolerated.
    pub fn received(&self, frame: &Frame, timestamp: Instant) {
        self.0.received(frame, timestamp);
    }
}
