/// Private interfaces for the cecbus node
///
/// Drivers should not use this module.
/// Backward-incompatible changes can be made without major version bump.
use crate::frame::Frame;
use crate::status::{AttemptCounters, TxStatus};
use crate::time::Instant;

pub trait DynamicLink {
    fn transmit_done(&self, status: TxStatus, counters: AttemptCounters, timestamp: Instant);
    fn received(&self, frame: &Frame, timestamp: Instant);
}
