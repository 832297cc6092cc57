//! Logical address configuration
//!
//! Describes which logical addresses the adapter claims and how it announces itself on the bus.

use heapless::Vec;

use crate::core::{CecVersion, DeviceKind, PrimaryDeviceType, VendorId};
use crate::state::MAX_LOGICAL_ADDRESSES;

/// Maximal OSD name length [1; CEC 17]
pub const MAX_OSD_NAME_LENGTH: usize = 14;

/// Capacity of the RC profile and device features operands of Report Features
pub const MAX_FEATURES_LENGTH: usize = 12;

/// Extension bit of a features operand byte: another byte of the same operand follows
const FEATURE_EXTENSION: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// More slots than the adapter can filter
    TooManySlots,
    /// Unregistered kind combined with other slots
    UnregisteredNotAlone,
    DuplicateKind,
    /// Record kind already implies playback functionality
    RecordWithPlayback,
    /// RC profile and device features operands are not terminated
    MalformedFeatures,
    /// CEC 2.0 allows at most two slots: a TV or audio system plus a playback or record device
    InvalidCombination,
    /// A configuration is active or being claimed
    Busy,
}

/// One requested logical address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LogicalAddressSlot {
    pub kind: DeviceKind,
    pub primary_device_type: PrimaryDeviceType,
    /// All Device Types operand of Report Features
    pub all_device_types: u8,
    /// RC profile operand followed by device features operand
    pub features: [u8; MAX_FEATURES_LENGTH],
}

impl LogicalAddressSlot {
    pub const fn new(kind: DeviceKind, primary_device_type: PrimaryDeviceType) -> Self {
        Self {
            kind,
            primary_device_type,
            all_device_types: 0,
            features: [0; MAX_FEATURES_LENGTH],
        }
    }

    /// Length of the RC profile and device features operands, `None` if unterminated
    pub fn features_len(&self) -> Option<usize> {
        let mut terminated = 0;
        for (i, byte) in self.features.iter().enumerate() {
            if byte & FEATURE_EXTENSION == 0 {
                terminated += 1;
                if terminated == 2 {
                    return Some(i + 1);
                }
            }
        }
        None
    }
}

/// Requested logical addresses and announcement data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogicalAddressConfig {
    pub version: CecVersion,
    pub vendor_id: Option<VendorId>,
    pub osd_name: Vec<u8, MAX_OSD_NAME_LENGTH>,
    /// Claim the unregistered address if no slot could claim an address
    pub allow_unregistered_fallback: bool,
    /// The adapter only carries CDC messages
    pub cdc_only: bool,
    /// Requested addresses in claim order
    pub slots: Vec<LogicalAddressSlot, MAX_LOGICAL_ADDRESSES>,
}

impl Default for LogicalAddressConfig {
    fn default() -> Self {
        Self {
            version: CecVersion::V2_0,
            vendor_id: None,
            osd_name: Vec::new(),
            allow_unregistered_fallback: false,
            cdc_only: false,
            slots: Vec::new(),
        }
    }
}

impl LogicalAddressConfig {
    pub fn new(version: CecVersion, slots: &[LogicalAddressSlot]) -> Result<Self, ConfigError> {
        Ok(Self {
            version,
            slots: Vec::from_slice(slots).map_err(|_| ConfigError::TooManySlots)?,
            ..Default::default()
        })
    }

    /// Validates the configuration for an adapter with `available` address slots.
    ///
    /// A CDC-only configuration is reduced to a single unregistered slot first.
    pub fn validate(&mut self, available: usize) -> Result<(), ConfigError> {
        if self.cdc_only {
            self.osd_name.clear();
            self.vendor_id = None;
            let slot = LogicalAddressSlot::new(DeviceKind::Unregistered, PrimaryDeviceType::Switch);
            self.slots.clear();
            // Cannot fail: capacity is at least one
            let _ = self.slots.push(slot);
        }

        if self.slots.len() > available {
            return Err(ConfigError::TooManySlots);
        }
        if self.slots.len() > 1
            && self
                .slots
                .iter()
                .any(|slot| slot.kind == DeviceKind::Unregistered)
        {
            return Err(ConfigError::UnregisteredNotAlone);
        }

        let mut kinds: u8 = 0;
        for slot in self.slots.iter_mut() {
            let bit = 1 << slot.kind as u8;
            if kinds & bit != 0 {
                return Err(ConfigError::DuplicateKind);
            }
            kinds |= bit;
            if has_kind(kinds, DeviceKind::Record) && has_kind(kinds, DeviceKind::Playback) {
                return Err(ConfigError::RecordWithPlayback);
            }
            let len = slot.features_len().ok_or(ConfigError::MalformedFeatures)?;
            slot.features[len..].fill(0);
        }

        if self.version == CecVersion::V2_0 {
            if self.slots.len() > 2 {
                return Err(ConfigError::InvalidCombination);
            }
            if self.slots.len() == 2
                && !((has_kind(kinds, DeviceKind::Tv) || has_kind(kinds, DeviceKind::AudioSystem))
                    && (has_kind(kinds, DeviceKind::Playback)
                        || has_kind(kinds, DeviceKind::Record)))
            {
                return Err(ConfigError::InvalidCombination);
            }
        }
        Ok(())
    }
}

fn has_kind(kinds: u8, kind: DeviceKind) -> bool {
    kinds & (1 << kind as u8) != 0
}
