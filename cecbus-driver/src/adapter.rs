//! Hardware operations the engine invokes on a CEC adapter

use cecbus_core::LogicalAddress;

use crate::frame::Frame;

/// Minimal bus silence before a transmission starts [1; CEC 9.2]
///
/// Durations are given in nominal data bit periods (2.4 ms).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SignalFreeTime {
    /// Retransmission of a frame after a failed attempt
    Retry,
    /// First transmission by an initiator other than the previous one
    NewInitiator,
    /// Next transmission by the same initiator
    NextTransfer,
}

impl SignalFreeTime {
    pub const fn bit_periods(self) -> u8 {
        match self {
            SignalFreeTime::Retry => 3,
            SignalFreeTime::NewInitiator => 5,
            SignalFreeTime::NextTransfer => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AdapterError {
    /// The hardware refused the operation in its current state
    Rejected,
    /// The operation is not implemented by the adapter
    Unsupported,
}

/// Operations of a physical CEC adapter
///
/// All methods return immediately. `transmit` only starts the transmission; its outcome is
/// reported later through `Link`. The engine guarantees that at most one transmission is in
/// flight and that methods are never called concurrently.
pub trait Adapter {
    /// Powers the CEC line interface up or down. A disabled adapter must not report received
    /// frames and cancels a transmission in progress without reporting it.
    fn enable(&mut self, enable: bool) -> Result<(), AdapterError>;

    /// Programs the logical address the adapter acknowledges directed frames for.
    /// `None` clears all programmed addresses.
    fn claim_address(&mut self, address: Option<LogicalAddress>) -> Result<(), AdapterError>;

    /// Starts transmitting `frame`, making up to `attempts` attempts.
    fn transmit(
        &mut self,
        attempts: u8,
        signal_free_time: SignalFreeTime,
        frame: &Frame,
    ) -> Result<(), AdapterError>;

    /// Forwards all bus traffic, not only frames addressed to the adapter.
    fn set_monitor_all(&mut self, enable: bool) -> Result<(), AdapterError> {
        match enable {
            true => Err(AdapterError::Unsupported),
            false => Ok(()),
        }
    }
}
