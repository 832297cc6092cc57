//! Matching of received messages with requests waiting for a reply

use crate::core::{LogicalAddress, Opcode};
use crate::driver::frame::Frame;
use crate::message::Message;

/// Correlation key of a received message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Reply {
    pub initiator: LogicalAddress,
    /// Opcode to compare: the received opcode, or the aborted opcode of a Feature Abort
    pub opcode: Opcode,
    pub abort: bool,
}

impl Reply {
    /// Returns `None` for messages that never answer a request: polls, CDC messages and
    /// truncated Feature Aborts.
    pub fn parse(frame: &Frame) -> Option<Self> {
        let opcode = frame.opcode()?;
        if opcode == Opcode::CDC_MESSAGE {
            return None;
        }
        let abort = opcode == Opcode::FEATURE_ABORT;
        let opcode = if abort {
            Opcode::new(*frame.operands().first()?)
        } else {
            opcode
        };
        Some(Self {
            initiator: frame.initiator(),
            opcode,
            abort,
        })
    }
}

fn is_arc_report(opcode: Opcode) -> bool {
    opcode == Opcode::REPORT_ARC_INITIATED || opcode == Opcode::REPORT_ARC_TERMINATED
}

/// Checks whether `reply` answers `request`.
///
/// A Feature Abort answers the request with the aborted opcode. Initiate ARC accepts either of
/// the ARC reports; the expected reply opcode is updated to the one that arrived.
pub(crate) fn matches(request: &mut Message, reply: &Reply) -> bool {
    let request_opcode = request.frame.opcode();
    let expected = if reply.abort {
        request_opcode
    } else if request_opcode == Some(Opcode::INITIATE_ARC)
        && is_arc_report(reply.opcode)
        && request.reply.is_some_and(is_arc_report)
    {
        Some(reply.opcode)
    } else {
        request.reply
    };
    if expected != Some(reply.opcode) {
        return false;
    }

    let addressed = reply.initiator == request.frame.destination() || request.frame.is_broadcast();
    if addressed && !reply.abort {
        request.reply = Some(reply.opcode);
    }
    addressed
}
