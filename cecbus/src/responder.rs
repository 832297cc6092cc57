//! Core protocol responder
//!
//! Answers the requests every CEC device must answer [1; CEC 11.2] without involving listeners,
//! and builds the broadcast announcements sent after address arbitration.

use crate::config::LogicalAddressConfig;
use crate::core::{CecVersion, LogicalAddress, Opcode, PhysicalAddress, PrimaryDeviceType};
use crate::driver::frame::Frame;
use crate::state::AdapterState;

/// Feature Abort reason: unrecognized opcode
const ABORT_UNRECOGNIZED_OPCODE: u8 = 0;
/// Feature Abort reason: refused
const ABORT_REFUSED: u8 = 4;

/// What happens to a valid received message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// Delivered to listeners
    Forward,
    /// Handled by the node, optionally with a reply to transmit
    Consumed(Option<Frame>),
}

/// Processes a valid message addressed to the adapter or broadcast
pub(crate) fn respond(
    frame: &Frame,
    state: &AdapterState,
    config: &LogicalAddressConfig,
    passthrough: bool,
) -> Disposition {
    let Some(opcode) = frame.opcode() else {
        return Disposition::Forward;
    };
    if config.cdc_only && opcode != Opcode::CDC_MESSAGE {
        return Disposition::Consumed(None);
    }

    let from_unregistered = frame.initiator() == LogicalAddress::UNREGISTERED;
    match opcode {
        // Answered with a directed message
        Opcode::GET_CEC_VERSION
        | Opcode::ABORT
        | Opcode::GIVE_DEVICE_POWER_STATUS
        | Opcode::GIVE_OSD_NAME
            if !passthrough && from_unregistered =>
        {
            return Disposition::Consumed(None);
        }
        Opcode::GET_CEC_VERSION
        | Opcode::ABORT
        | Opcode::GIVE_DEVICE_POWER_STATUS
        | Opcode::GIVE_OSD_NAME
        | Opcode::GIVE_DEVICE_VENDOR_ID
        | Opcode::GIVE_FEATURES
        | Opcode::GIVE_PHYSICAL_ADDR => {
            if passthrough {
                return Disposition::Forward;
            }
            if frame.is_broadcast() {
                return Disposition::Consumed(None);
            }
        }
        _ => return Disposition::Forward,
    }

    let own = frame.destination();
    let Some(index) = state.claimed.iter().position(|&la| la == Some(own)) else {
        return Disposition::Forward;
    };
    let Some(slot) = config.slots.get(index) else {
        return Disposition::Forward;
    };
    let reply_to = frame.initiator();

    let reply = match opcode {
        Opcode::GET_CEC_VERSION => Some(cec_version(own, reply_to, config.version)),
        Opcode::GIVE_PHYSICAL_ADDR => Some(report_physical_address(
            own,
            state.physical_address,
            slot.primary_device_type,
        )),
        Opcode::GIVE_DEVICE_VENDOR_ID => Some(match config.vendor_id {
            Some(vendor_id) => device_vendor_id(own, vendor_id.to_bytes()),
            None => feature_abort(frame, ABORT_UNRECOGNIZED_OPCODE),
        }),
        Opcode::ABORT if slot.primary_device_type == PrimaryDeviceType::Switch => None,
        Opcode::ABORT => Some(feature_abort(frame, ABORT_REFUSED)),
        Opcode::GIVE_OSD_NAME if config.osd_name.is_empty() => {
            Some(feature_abort(frame, ABORT_UNRECOGNIZED_OPCODE))
        }
        Opcode::GIVE_OSD_NAME => Some(unwrap!(Frame::with_opcode(
            own,
            reply_to,
            Opcode::SET_OSD_NAME,
            &config.osd_name,
        ))),
        Opcode::GIVE_FEATURES if config.version == CecVersion::V1_4 => {
            Some(feature_abort(frame, ABORT_UNRECOGNIZED_OPCODE))
        }
        Opcode::GIVE_FEATURES => Some(report_features(own, config, index)),
        // Power status is left to listeners
        _ => return Disposition::Forward,
    };
    Disposition::Consumed(reply)
}

fn cec_version(own: LogicalAddress, reply_to: LogicalAddress, version: CecVersion) -> Frame {
    unwrap!(Frame::with_opcode(
        own,
        reply_to,
        Opcode::CEC_VERSION,
        &[version.into_u8()],
    ))
}

fn feature_abort(request: &Frame, reason: u8) -> Frame {
    let opcode = request.opcode().map_or(0, Opcode::into_u8);
    unwrap!(Frame::with_opcode(
        request.destination(),
        request.initiator(),
        Opcode::FEATURE_ABORT,
        &[opcode, reason],
    ))
}

/// Report Physical Address broadcast
pub(crate) fn report_physical_address(
    own: LogicalAddress,
    physical_address: PhysicalAddress,
    primary_device_type: PrimaryDeviceType,
) -> Frame {
    let [high, low] = physical_address.to_bytes();
    unwrap!(Frame::with_opcode(
        own,
        LogicalAddress::BROADCAST,
        Opcode::REPORT_PHYSICAL_ADDR,
        &[high, low, primary_device_type.into_u8()],
    ))
}

/// Device Vendor ID broadcast
pub(crate) fn device_vendor_id(own: LogicalAddress, vendor_id: [u8; 3]) -> Frame {
    unwrap!(Frame::with_opcode(
        own,
        LogicalAddress::BROADCAST,
        Opcode::DEVICE_VENDOR_ID,
        &vendor_id,
    ))
}

/// Report Features broadcast for configuration slot `index`
pub(crate) fn report_features(
    own: LogicalAddress,
    config: &LogicalAddressConfig,
    index: usize,
) -> Frame {
    let slot = &config.slots[index];
    let features_len = slot.features_len().unwrap_or(slot.features.len());
    let mut operands = [0; 2 + crate::config::MAX_FEATURES_LENGTH];
    operands[0] = config.version.into_u8();
    operands[1] = slot.all_device_types;
    operands[2..2 + features_len].copy_from_slice(&slot.features[..features_len]);
    unwrap!(Frame::with_opcode(
        own,
        LogicalAddress::BROADCAST,
        Opcode::REPORT_FEATURES,
        &operands[..2 + features_len],
    ))
}
