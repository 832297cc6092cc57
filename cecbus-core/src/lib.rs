//! CEC protocol core data types
//!
//! This crate provides basic data type definitions used by other cecbus crates.
//! Users should not depend on this crate directly. Use `cecbus::core` reexport instead.
//!
//! References:
//! 1. HDMI Specification 1.4b, Supplement 1 "Consumer Electronics Control"
//! 2. HDMI Specification 2.0, Section 11 "CEC 2.0"
#![no_std]

mod opcode;

pub use opcode::Opcode;

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidValue;

/// Logical address [1; CEC 10.2]
///
/// Identifies the functional role of a device on the bus. Address 15 is both the broadcast
/// destination and the initiator address of a device that holds no other address.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LogicalAddress(u8);

impl LogicalAddress {
    const MAX_VALUE: u8 = 0xf;

    pub const TV: Self = Self(0);
    pub const RECORD_1: Self = Self(1);
    pub const RECORD_2: Self = Self(2);
    pub const TUNER_1: Self = Self(3);
    pub const PLAYBACK_1: Self = Self(4);
    pub const AUDIO_SYSTEM: Self = Self(5);
    pub const TUNER_2: Self = Self(6);
    pub const TUNER_3: Self = Self(7);
    pub const PLAYBACK_2: Self = Self(8);
    pub const RECORD_3: Self = Self(9);
    pub const TUNER_4: Self = Self(10);
    pub const PLAYBACK_3: Self = Self(11);
    /// Available for CEC 2.0 devices only
    pub const BACKUP_1: Self = Self(12);
    /// Available for CEC 2.0 devices only
    pub const BACKUP_2: Self = Self(13);
    pub const SPECIFIC: Self = Self(14);
    pub const UNREGISTERED: Self = Self(Self::MAX_VALUE);
    pub const BROADCAST: Self = Self(Self::MAX_VALUE);

    pub const fn new(value: u8) -> Option<Self> {
        if value <= Self::MAX_VALUE {
            Some(Self::from_u8_truncating(value))
        } else {
            None
        }
    }

    pub const fn from_u8_truncating(value: u8) -> Self {
        Self(value & Self::MAX_VALUE)
    }

    pub const fn into_u8(self) -> u8 {
        self.0
    }

    /// True for address 15 in either of its roles
    pub const fn is_broadcast(self) -> bool {
        self.0 == Self::MAX_VALUE
    }
}

impl From<LogicalAddress> for u8 {
    fn from(value: LogicalAddress) -> Self {
        value.into_u8()
    }
}

impl From<LogicalAddress> for usize {
    fn from(value: LogicalAddress) -> Self {
        u8::from(value).into()
    }
}

impl TryFrom<u8> for LogicalAddress {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(InvalidValue)
    }
}

/// A set of logical addresses
///
/// Bit N of the underlying mask corresponds to the logical address N.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LogicalAddressSet(u16);

impl LogicalAddressSet {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(u16::MAX);

    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    pub const fn into_bits(self) -> u16 {
        self.0
    }

    pub const fn complement(self) -> Self {
        Self(!self.0)
    }

    pub const fn new_eq(address: LogicalAddress) -> Self {
        Self(1u16 << address.into_u8())
    }

    pub const fn from_slice(addresses: &[LogicalAddress]) -> Self {
        let mut set = Self::NONE;
        let mut i = 0;
        while i < addresses.len() {
            set.insert(addresses[i]);
            i += 1;
        }
        set
    }

    pub const fn contains(&self, address: LogicalAddress) -> bool {
        (self.0 >> address.into_u8()) & 0x1 != 0
    }

    pub const fn insert(&mut self, address: LogicalAddress) {
        self.0 |= Self::new_eq(address).0
    }

    pub const fn remove(&mut self, address: LogicalAddress) {
        self.0 &= Self::new_eq(address).complement().0
    }

    pub const fn first(&self) -> Option<LogicalAddress> {
        LogicalAddress::new(self.0.trailing_zeros() as u8)
    }

    pub const fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    pub const fn is_empty(&self) -> bool {
        self.0 == Self::NONE.0
    }
}

impl Default for LogicalAddressSet {
    fn default() -> Self {
        LogicalAddressSet::NONE
    }
}

impl core::ops::Not for LogicalAddressSet {
    type Output = Self;
    fn not(self) -> Self::Output {
        Self(!self.0)
    }
}

impl core::ops::BitAnd<LogicalAddressSet> for LogicalAddressSet {
    type Output = Self;
    fn bitand(self, rhs: LogicalAddressSet) -> Self::Output {
        LogicalAddressSet(self.0 & rhs.0)
    }
}

impl core::ops::BitOr<LogicalAddressSet> for LogicalAddressSet {
    type Output = Self;
    fn bitor(self, rhs: LogicalAddressSet) -> Self::Output {
        LogicalAddressSet(self.0 | rhs.0)
    }
}

impl core::ops::BitOrAssign<LogicalAddressSet> for LogicalAddressSet {
    fn bitor_assign(&mut self, rhs: LogicalAddressSet) {
        self.0 |= rhs.0;
    }
}

impl core::iter::IntoIterator for LogicalAddressSet {
    type Item = LogicalAddress;
    type IntoIter = LogicalAddressSetIterator;
    fn into_iter(self) -> Self::IntoIter {
        LogicalAddressSetIterator { residual: self }
    }
}

pub struct LogicalAddressSetIterator {
    residual: LogicalAddressSet,
}

impl core::iter::Iterator for LogicalAddressSetIterator {
    type Item = LogicalAddress;
    fn next(&mut self) -> Option<Self::Item> {
        let first = self.residual.first();
        if let Some(address) = first {
            self.residual.remove(address);
        }
        first
    }
}

/// Physical address [1; 8.7]
///
/// Four 4-bit digits describing the position of a device in the HDMI topology,
/// e.g. `1.0.0.0`. `f.f.f.f` marks an unknown address.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhysicalAddress(u16);

impl PhysicalAddress {
    pub const ROOT: Self = Self(0x0000);
    pub const INVALID: Self = Self(0xffff);

    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    pub const fn into_u16(self) -> u16 {
        self.0
    }

    pub const fn is_valid(self) -> bool {
        self.0 != Self::INVALID.0
    }

    /// Big-endian wire representation
    pub const fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

impl Default for PhysicalAddress {
    fn default() -> Self {
        Self::INVALID
    }
}

impl From<PhysicalAddress> for u16 {
    fn from(value: PhysicalAddress) -> Self {
        value.into_u16()
    }
}

impl core::fmt::Display for PhysicalAddress {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let [a, b, c, d] = [12, 8, 4, 0].map(|shift| (self.0 >> shift) & 0xf);
        write!(f, "{a:x}.{b:x}.{c:x}.{d:x}")
    }
}

/// Protocol version announced by the device
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CecVersion {
    V1_4 = 5,
    V2_0 = 6,
}

impl CecVersion {
    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for CecVersion {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(CecVersion::V1_4),
            6 => Ok(CecVersion::V2_0),
            _ => Err(InvalidValue),
        }
    }
}

/// Category of a logical address slot
///
/// Each kind owns a priority-ordered list of candidate addresses that are polled during
/// address arbitration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceKind {
    Tv,
    Record,
    Tuner,
    Playback,
    AudioSystem,
    Specific,
    Unregistered,
}

impl DeviceKind {
    pub const fn candidates(self) -> &'static [LogicalAddress] {
        use LogicalAddress as La;
        match self {
            DeviceKind::Tv => &[La::TV, La::SPECIFIC],
            DeviceKind::Record => &[
                La::RECORD_1,
                La::RECORD_2,
                La::RECORD_3,
                La::BACKUP_1,
                La::BACKUP_2,
            ],
            DeviceKind::Tuner => &[
                La::TUNER_1,
                La::TUNER_2,
                La::TUNER_3,
                La::TUNER_4,
                La::BACKUP_1,
                La::BACKUP_2,
            ],
            DeviceKind::Playback => &[
                La::PLAYBACK_1,
                La::PLAYBACK_2,
                La::PLAYBACK_3,
                La::BACKUP_1,
                La::BACKUP_2,
            ],
            DeviceKind::AudioSystem => &[La::AUDIO_SYSTEM],
            DeviceKind::Specific => &[La::SPECIFIC, La::BACKUP_1, La::BACKUP_2],
            DeviceKind::Unregistered => &[La::UNREGISTERED],
        }
    }

    /// Addresses that belong to the kind itself, backup addresses excluded
    pub const fn primary_set(self) -> LogicalAddressSet {
        use LogicalAddress as La;
        match self {
            DeviceKind::Tv => LogicalAddressSet::new_eq(La::TV),
            DeviceKind::Record => {
                LogicalAddressSet::from_slice(&[La::RECORD_1, La::RECORD_2, La::RECORD_3])
            }
            DeviceKind::Tuner => LogicalAddressSet::from_slice(&[
                La::TUNER_1,
                La::TUNER_2,
                La::TUNER_3,
                La::TUNER_4,
            ]),
            DeviceKind::Playback => {
                LogicalAddressSet::from_slice(&[La::PLAYBACK_1, La::PLAYBACK_2, La::PLAYBACK_3])
            }
            DeviceKind::AudioSystem => LogicalAddressSet::new_eq(La::AUDIO_SYSTEM),
            DeviceKind::Specific => LogicalAddressSet::new_eq(La::SPECIFIC),
            DeviceKind::Unregistered => LogicalAddressSet::new_eq(La::UNREGISTERED),
        }
    }
}

/// Primary device type operand [1; CEC 17]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PrimaryDeviceType {
    Tv = 0,
    Record = 1,
    Tuner = 3,
    Playback = 4,
    AudioSystem = 5,
    Switch = 6,
    Processor = 7,
}

impl PrimaryDeviceType {
    pub const fn into_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for PrimaryDeviceType {
    type Error = InvalidValue;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(PrimaryDeviceType::Tv),
            1 => Ok(PrimaryDeviceType::Record),
            3 => Ok(PrimaryDeviceType::Tuner),
            4 => Ok(PrimaryDeviceType::Playback),
            5 => Ok(PrimaryDeviceType::AudioSystem),
            6 => Ok(PrimaryDeviceType::Switch),
            7 => Ok(PrimaryDeviceType::Processor),
            _ => Err(InvalidValue),
        }
    }
}

/// IEEE OUI of the device vendor
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct VendorId(u32);

impl VendorId {
    const MAX_VALUE: u32 = 0x00ff_ffff;

    pub const fn new(value: u32) -> Option<Self> {
        if value <= Self::MAX_VALUE {
            Some(Self(value))
        } else {
            None
        }
    }

    pub const fn into_u32(self) -> u32 {
        self.0
    }

    /// Big-endian 3-byte wire representation
    pub const fn to_bytes(self) -> [u8; 3] {
        let [_, a, b, c] = self.0.to_be_bytes();
        [a, b, c]
    }
}

impl TryFrom<u32> for VendorId {
    type Error = InvalidValue;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(InvalidValue)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::format;
    use std::vec::Vec;

    #[test]
    fn test_logical_address_set() {
        let mut set = LogicalAddressSet::NONE;
        set.insert(LogicalAddress::PLAYBACK_2);
        set.insert(LogicalAddress::TUNER_1);

        assert_eq!(set.first(), Some(LogicalAddress::TUNER_1));
        assert_eq!(set.len(), 2);
        assert!(set.contains(LogicalAddress::PLAYBACK_2));
        assert!(!set.contains(LogicalAddress::PLAYBACK_1));

        set.remove(LogicalAddress::TUNER_1);
        assert_eq!(set, LogicalAddressSet::new_eq(LogicalAddress::PLAYBACK_2));
    }

    #[test]
    fn test_logical_address_set_iteration() {
        let set = LogicalAddressSet::from_bits(0b1000_0000_0001_0001);
        let addresses: Vec<_> = set.into_iter().map(LogicalAddress::into_u8).collect();
        assert_eq!(addresses, [0, 4, 15]);
        assert_eq!(LogicalAddressSet::NONE.first(), None);
    }

    #[test]
    fn test_logical_address_range() {
        assert_eq!(LogicalAddress::new(15), Some(LogicalAddress::BROADCAST));
        assert_eq!(LogicalAddress::new(16), None);
        assert!(LogicalAddress::UNREGISTERED.is_broadcast());
        assert!(!LogicalAddress::SPECIFIC.is_broadcast());
    }

    #[test]
    fn test_physical_address_display() {
        assert_eq!(format!("{}", PhysicalAddress::new(0x1200)), "1.2.0.0");
        assert_eq!(format!("{}", PhysicalAddress::INVALID), "f.f.f.f");
        assert!(!PhysicalAddress::default().is_valid());
        assert_eq!(PhysicalAddress::new(0x3400).to_bytes(), [0x34, 0x00]);
    }

    #[test]
    fn test_primary_set_excludes_backup() {
        for kind in [DeviceKind::Record, DeviceKind::Tuner, DeviceKind::Playback] {
            let candidates = LogicalAddressSet::from_slice(kind.candidates());
            assert!(candidates.contains(LogicalAddress::BACKUP_1));
            assert!(!kind.primary_set().contains(LogicalAddress::BACKUP_1));
            assert_eq!(kind.primary_set().first(), Some(kind.candidates()[0]));
        }
    }

    #[test]
    fn test_vendor_id() {
        assert!(VendorId::new(0x0100_0000).is_none());
        assert_eq!(unwrap_vendor(0x0012_3456).to_bytes(), [0x12, 0x34, 0x56]);
    }

    fn unwrap_vendor(value: u32) -> VendorId {
        VendorId::try_from(value).unwrap()
    }
}
