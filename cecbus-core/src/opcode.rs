/// Message opcode [1; CEC 15, 2; 11.10]
///
/// The byte that follows the header of every non-poll message. Only opcodes the bus engine
/// itself interprets, or that are commonly needed to build replies, have named constants.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Opcode(u8);

impl Opcode {
    pub const FEATURE_ABORT: Self = Self(0x00);
    pub const IMAGE_VIEW_ON: Self = Self(0x04);
    pub const TUNER_STEP_INCREMENT: Self = Self(0x05);
    pub const TUNER_STEP_DECREMENT: Self = Self(0x06);
    pub const TUNER_DEVICE_STATUS: Self = Self(0x07);
    pub const GIVE_TUNER_DEVICE_STATUS: Self = Self(0x08);
    pub const RECORD_ON: Self = Self(0x09);
    pub const RECORD_STATUS: Self = Self(0x0a);
    pub const RECORD_OFF: Self = Self(0x0b);
    pub const TEXT_VIEW_ON: Self = Self(0x0d);
    pub const RECORD_TV_SCREEN: Self = Self(0x0f);
    pub const GIVE_DECK_STATUS: Self = Self(0x1a);
    pub const DECK_STATUS: Self = Self(0x1b);
    pub const SET_MENU_LANGUAGE: Self = Self(0x32);
    pub const CLEAR_ANALOGUE_TIMER: Self = Self(0x33);
    pub const SET_ANALOGUE_TIMER: Self = Self(0x34);
    pub const TIMER_STATUS: Self = Self(0x35);
    pub const STANDBY: Self = Self(0x36);
    pub const PLAY: Self = Self(0x41);
    pub const DECK_CONTROL: Self = Self(0x42);
    pub const TIMER_CLEARED_STATUS: Self = Self(0x43);
    pub const USER_CONTROL_PRESSED: Self = Self(0x44);
    pub const USER_CONTROL_RELEASED: Self = Self(0x45);
    pub const GIVE_OSD_NAME: Self = Self(0x46);
    pub const SET_OSD_NAME: Self = Self(0x47);
    pub const SET_OSD_STRING: Self = Self(0x64);
    pub const SET_TIMER_PROGRAM_TITLE: Self = Self(0x67);
    pub const SYSTEM_AUDIO_MODE_REQUEST: Self = Self(0x70);
    pub const GIVE_AUDIO_STATUS: Self = Self(0x71);
    pub const SET_SYSTEM_AUDIO_MODE: Self = Self(0x72);
    pub const REPORT_AUDIO_STATUS: Self = Self(0x7a);
    pub const GIVE_SYSTEM_AUDIO_MODE_STATUS: Self = Self(0x7d);
    pub const SYSTEM_AUDIO_MODE_STATUS: Self = Self(0x7e);
    pub const ROUTING_CHANGE: Self = Self(0x80);
    pub const ROUTING_INFORMATION: Self = Self(0x81);
    pub const ACTIVE_SOURCE: Self = Self(0x82);
    pub const GIVE_PHYSICAL_ADDR: Self = Self(0x83);
    pub const REPORT_PHYSICAL_ADDR: Self = Self(0x84);
    pub const REQUEST_ACTIVE_SOURCE: Self = Self(0x85);
    pub const SET_STREAM_PATH: Self = Self(0x86);
    pub const DEVICE_VENDOR_ID: Self = Self(0x87);
    pub const VENDOR_COMMAND: Self = Self(0x89);
    pub const VENDOR_REMOTE_BUTTON_DOWN: Self = Self(0x8a);
    pub const VENDOR_REMOTE_BUTTON_UP: Self = Self(0x8b);
    pub const GIVE_DEVICE_VENDOR_ID: Self = Self(0x8c);
    pub const MENU_REQUEST: Self = Self(0x8d);
    pub const MENU_STATUS: Self = Self(0x8e);
    pub const GIVE_DEVICE_POWER_STATUS: Self = Self(0x8f);
    pub const REPORT_POWER_STATUS: Self = Self(0x90);
    pub const GET_MENU_LANGUAGE: Self = Self(0x91);
    pub const SELECT_ANALOGUE_SERVICE: Self = Self(0x92);
    pub const SELECT_DIGITAL_SERVICE: Self = Self(0x93);
    pub const SET_DIGITAL_TIMER: Self = Self(0x97);
    pub const CLEAR_DIGITAL_TIMER: Self = Self(0x99);
    pub const SET_AUDIO_RATE: Self = Self(0x9a);
    pub const INACTIVE_SOURCE: Self = Self(0x9d);
    pub const CEC_VERSION: Self = Self(0x9e);
    pub const GET_CEC_VERSION: Self = Self(0x9f);
    pub const VENDOR_COMMAND_WITH_ID: Self = Self(0xa0);
    pub const CLEAR_EXT_TIMER: Self = Self(0xa1);
    pub const SET_EXT_TIMER: Self = Self(0xa2);
    pub const REPORT_SHORT_AUDIO_DESCRIPTOR: Self = Self(0xa3);
    pub const REQUEST_SHORT_AUDIO_DESCRIPTOR: Self = Self(0xa4);
    pub const GIVE_FEATURES: Self = Self(0xa5);
    pub const REPORT_FEATURES: Self = Self(0xa6);
    pub const REQUEST_CURRENT_LATENCY: Self = Self(0xa7);
    pub const REPORT_CURRENT_LATENCY: Self = Self(0xa8);
    pub const INITIATE_ARC: Self = Self(0xc0);
    pub const REPORT_ARC_INITIATED: Self = Self(0xc1);
    pub const REPORT_ARC_TERMINATED: Self = Self(0xc2);
    pub const REQUEST_ARC_INITIATION: Self = Self(0xc3);
    pub const REQUEST_ARC_TERMINATION: Self = Self(0xc4);
    pub const TERMINATE_ARC: Self = Self(0xc5);
    /// Capability Discovery and Control wrapper
    pub const CDC_MESSAGE: Self = Self(0xf8);
    pub const ABORT: Self = Self(0xff);

    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    pub const fn into_u8(self) -> u8 {
        self.0
    }
}

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        value.into_u8()
    }
}
