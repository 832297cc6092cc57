//! Checks applied to a message before it may enter the transmit queue

use crate::core::{LogicalAddress, Opcode};
use crate::message::{Message, MessageFlags, RxReport, TxReport};
use crate::policy::DEFAULT_REPLY_TIMEOUT;
use crate::state::AdapterState;

/// Reasons a message was not accepted for transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransmitError {
    /// A poll to the broadcast address
    InvalidPoll,
    /// A poll cannot have a reply
    PollWithReply,
    /// The adapter is restricted to CDC messages
    NotCdc,
    /// A directed message to an address the adapter holds itself
    DestinationIsSelf,
    /// The initiator is not an address the adapter holds
    UnknownInitiator,
    /// The adapter holds no logical address
    NotConfigured,
    /// A reply cannot be awaited before the adapter holds a logical address
    ReplyWhileUnconfigured,
    /// The transmit queue is at capacity
    QueueFull,
    /// Too many requests wait for a reply or for their blocking caller
    WaitSetFull,
    /// The bus was shut down
    Stopped,
}

/// Accepted message disposition
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Admission {
    Enqueue,
    /// A poll of an own address, completed as not acknowledged without bus access
    SelfPoll,
}

/// Normalizes `message` and checks it against the adapter state.
///
/// Transmit and receive reports are reset. A reply without a timeout gets the default timeout.
/// CDC messages get the own physical address stamped into the operands.
pub(crate) fn admit(
    state: &AdapterState,
    cdc_only: bool,
    message: &mut Message,
) -> Result<Admission, TransmitError> {
    if state.stopped {
        return Err(TransmitError::Stopped);
    }

    message.sequence = 0;
    message.tx = TxReport::default();
    message.rx = RxReport::default();
    if message.reply.is_some() && message.timeout.is_none() {
        message.timeout = Some(DEFAULT_REPLY_TIMEOUT);
    }
    message.flags = MessageFlags::from_bits_truncating(message.flags.into_bits());
    if message.timeout.is_none() {
        message.flags.remove(MessageFlags::REPLY_TO_FOLLOWERS);
    }

    let frame = &mut message.frame;
    if frame.is_poll() && message.timeout.is_some() {
        return Err(TransmitError::PollWithReply);
    }

    let mut admission = Admission::Enqueue;
    if !message.flags.contains(MessageFlags::RAW) {
        let is_cdc = frame.opcode() == Some(Opcode::CDC_MESSAGE);
        if cdc_only && !is_cdc {
            return Err(TransmitError::NotCdc);
        }
        if is_cdc && frame.len() >= 4 {
            frame[2..4].copy_from_slice(&state.physical_address.to_bytes());
        }

        let destination = frame.destination();
        let own_destination = state.logical_addresses.contains(destination);
        if frame.is_poll() {
            if destination.is_broadcast() {
                return Err(TransmitError::InvalidPoll);
            }
            if own_destination {
                admission = Admission::SelfPoll;
            }
        } else {
            if !destination.is_broadcast() && own_destination {
                return Err(TransmitError::DestinationIsSelf);
            }
            if state.configured && !state.logical_addresses.contains(frame.initiator()) {
                return Err(TransmitError::UnknownInitiator);
            }
        }

        if admission == Admission::Enqueue
            && state.is_idle_unconfigured()
            && !is_wake_message(frame.destination(), frame.opcode(), frame.len())
        {
            return Err(TransmitError::NotConfigured);
        }
    }

    if admission == Admission::Enqueue && state.is_idle_unconfigured() {
        if state.needs_hpd {
            return Err(TransmitError::NotConfigured);
        }
        if message.reply.is_some() {
            return Err(TransmitError::ReplyWhileUnconfigured);
        }
    }

    Ok(admission)
}

/// Messages that may wake up a TV before any logical address is claimed
fn is_wake_message(destination: LogicalAddress, opcode: Option<Opcode>, len: usize) -> bool {
    destination == LogicalAddress::TV
        && len <= 2
        && matches!(
            opcode,
            None | Some(Opcode::IMAGE_VIEW_ON) | Some(Opcode::TEXT_VIEW_ON)
        )
}
