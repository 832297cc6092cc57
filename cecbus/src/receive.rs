//! Addressing and length rules for received messages [1; CEC 7.3, 12.2]
//!
//! Messages that violate the rules are ignored: they are neither correlated with waiting
//! requests nor processed by the protocol responder.

use crate::core::{CecVersion, Opcode};
use crate::driver::frame::Frame;

const DIRECTED: u8 = 0x80;
const BCAST_1_4: u8 = 0x40;
/// Broadcast form introduced by CEC 2.0
const BCAST_2_0: u8 = 0x20;
const BCAST: u8 = BCAST_1_4 | BCAST_2_0;
const BOTH: u8 = BCAST | DIRECTED;
const MIN_LENGTH_MASK: u8 = 0x1f;

/// Minimal length and allowed addressing modes of an opcode
const fn message_rule(opcode: Opcode) -> u8 {
    match opcode {
        Opcode::ACTIVE_SOURCE => 4 | BCAST,
        Opcode::IMAGE_VIEW_ON => 2 | DIRECTED,
        Opcode::TEXT_VIEW_ON => 2 | DIRECTED,
        Opcode::INACTIVE_SOURCE => 4 | DIRECTED,
        Opcode::REQUEST_ACTIVE_SOURCE => 2 | BCAST,
        Opcode::ROUTING_CHANGE => 6 | BCAST,
        Opcode::ROUTING_INFORMATION => 4 | BCAST,
        Opcode::SET_STREAM_PATH => 4 | BCAST,
        Opcode::STANDBY => 2 | BOTH,
        Opcode::RECORD_OFF => 2 | DIRECTED,
        Opcode::RECORD_ON => 3 | DIRECTED,
        Opcode::RECORD_STATUS => 3 | DIRECTED,
        Opcode::RECORD_TV_SCREEN => 2 | DIRECTED,
        Opcode::CLEAR_ANALOGUE_TIMER => 13 | DIRECTED,
        Opcode::CLEAR_DIGITAL_TIMER => 16 | DIRECTED,
        Opcode::CLEAR_EXT_TIMER => 13 | DIRECTED,
        Opcode::SET_ANALOGUE_TIMER => 13 | DIRECTED,
        Opcode::SET_DIGITAL_TIMER => 16 | DIRECTED,
        Opcode::SET_EXT_TIMER => 13 | DIRECTED,
        Opcode::SET_TIMER_PROGRAM_TITLE => 2 | DIRECTED,
        Opcode::TIMER_CLEARED_STATUS => 3 | DIRECTED,
        Opcode::TIMER_STATUS => 3 | DIRECTED,
        Opcode::CEC_VERSION => 3 | DIRECTED,
        Opcode::GET_CEC_VERSION => 2 | DIRECTED,
        Opcode::GIVE_PHYSICAL_ADDR => 2 | DIRECTED,
        Opcode::GET_MENU_LANGUAGE => 2 | DIRECTED,
        Opcode::REPORT_PHYSICAL_ADDR => 5 | BCAST,
        Opcode::SET_MENU_LANGUAGE => 5 | BCAST,
        Opcode::REPORT_FEATURES => 6 | BCAST,
        Opcode::GIVE_FEATURES => 2 | DIRECTED,
        Opcode::DECK_CONTROL => 3 | DIRECTED,
        Opcode::DECK_STATUS => 3 | DIRECTED,
        Opcode::GIVE_DECK_STATUS => 3 | DIRECTED,
        Opcode::PLAY => 3 | DIRECTED,
        Opcode::GIVE_TUNER_DEVICE_STATUS => 3 | DIRECTED,
        Opcode::SELECT_ANALOGUE_SERVICE => 6 | DIRECTED,
        Opcode::SELECT_DIGITAL_SERVICE => 9 | DIRECTED,
        Opcode::TUNER_DEVICE_STATUS => 7 | DIRECTED,
        Opcode::TUNER_STEP_DECREMENT => 2 | DIRECTED,
        Opcode::TUNER_STEP_INCREMENT => 2 | DIRECTED,
        Opcode::DEVICE_VENDOR_ID => 5 | BCAST,
        Opcode::GIVE_DEVICE_VENDOR_ID => 2 | DIRECTED,
        Opcode::VENDOR_COMMAND => 2 | DIRECTED,
        Opcode::VENDOR_COMMAND_WITH_ID => 5 | BOTH,
        Opcode::VENDOR_REMOTE_BUTTON_DOWN => 2 | BOTH,
        Opcode::VENDOR_REMOTE_BUTTON_UP => 2 | BOTH,
        Opcode::SET_OSD_STRING => 3 | DIRECTED,
        Opcode::GIVE_OSD_NAME => 2 | DIRECTED,
        Opcode::SET_OSD_NAME => 2 | DIRECTED,
        Opcode::MENU_REQUEST => 3 | DIRECTED,
        Opcode::MENU_STATUS => 3 | DIRECTED,
        Opcode::USER_CONTROL_PRESSED => 3 | DIRECTED,
        Opcode::USER_CONTROL_RELEASED => 2 | DIRECTED,
        Opcode::GIVE_DEVICE_POWER_STATUS => 2 | DIRECTED,
        Opcode::REPORT_POWER_STATUS => 3 | DIRECTED | BCAST_2_0,
        Opcode::FEATURE_ABORT => 4 | DIRECTED,
        Opcode::ABORT => 2 | DIRECTED,
        Opcode::GIVE_AUDIO_STATUS => 2 | DIRECTED,
        Opcode::GIVE_SYSTEM_AUDIO_MODE_STATUS => 2 | DIRECTED,
        Opcode::REPORT_AUDIO_STATUS => 3 | DIRECTED,
        Opcode::REPORT_SHORT_AUDIO_DESCRIPTOR => 2 | DIRECTED,
        Opcode::REQUEST_SHORT_AUDIO_DESCRIPTOR => 2 | DIRECTED,
        Opcode::SET_SYSTEM_AUDIO_MODE => 3 | BOTH,
        Opcode::SYSTEM_AUDIO_MODE_REQUEST => 2 | DIRECTED,
        Opcode::SYSTEM_AUDIO_MODE_STATUS => 3 | DIRECTED,
        Opcode::SET_AUDIO_RATE => 3 | DIRECTED,
        Opcode::INITIATE_ARC => 2 | DIRECTED,
        Opcode::REPORT_ARC_INITIATED => 2 | DIRECTED,
        Opcode::REPORT_ARC_TERMINATED => 2 | DIRECTED,
        Opcode::REQUEST_ARC_INITIATION => 2 | DIRECTED,
        Opcode::REQUEST_ARC_TERMINATION => 2 | DIRECTED,
        Opcode::TERMINATE_ARC => 2 | DIRECTED,
        Opcode::REQUEST_CURRENT_LATENCY => 4 | BCAST,
        Opcode::REPORT_CURRENT_LATENCY => 6 | BCAST,
        Opcode::CDC_MESSAGE => 2 | BCAST,
        _ => 0,
    }
}

const PROGRAMMED: u8 = 0x10;
const PROG_INFO_NOT_ENOUGH_SPACE: u8 = 0x09;
const PROG_INFO_MIGHT_NOT_BE_ENOUGH_SPACE: u8 = 0x0b;
const PROG_ERROR_DUPLICATE: u8 = 0x0e;

const RECORD_SRC_DIGITAL: u8 = 2;
const RECORD_SRC_ANALOG: u8 = 3;
const RECORD_SRC_EXT_PLUG: u8 = 4;
const RECORD_SRC_EXT_PHYS_ADDR: u8 = 5;

/// Minimal length that depends on the first operand
fn operand_length(opcode: Opcode, first: u8) -> usize {
    match opcode {
        // Duration available is only present for some programmed and error states
        Opcode::TIMER_STATUS => {
            let info = first & 0x0f;
            let with_duration = if first & PROGRAMMED != 0 {
                info == PROG_INFO_NOT_ENOUGH_SPACE || info == PROG_INFO_MIGHT_NOT_BE_ENOUGH_SPACE
            } else {
                info == PROG_ERROR_DUPLICATE
            };
            if with_duration { 5 } else { 0 }
        }
        Opcode::RECORD_ON => match first {
            RECORD_SRC_DIGITAL => 10,
            RECORD_SRC_ANALOG => 7,
            RECORD_SRC_EXT_PLUG => 4,
            RECORD_SRC_EXT_PHYS_ADDR => 5,
            _ => 0,
        },
        _ => 0,
    }
}

/// Checks a message addressed to the adapter against the rule of its opcode.
///
/// Polls and opcodes without a rule are always well-formed.
pub(crate) fn is_well_formed(frame: &Frame, version: CecVersion) -> bool {
    let Some(opcode) = frame.opcode() else {
        return true;
    };
    let rule = message_rule(opcode);
    if rule == 0 {
        return true;
    }

    if frame.len() < usize::from(rule & MIN_LENGTH_MASK) {
        return false;
    }
    if let Some(&first) = frame.operands().first() {
        if frame.len() < operand_length(opcode, first) {
            return false;
        }
    }
    if frame.is_broadcast() {
        match version {
            CecVersion::V1_4 => rule & BCAST_1_4 != 0,
            CecVersion::V2_0 => rule & BCAST != 0,
        }
    } else {
        rule & DIRECTED != 0
    }
}
