//! CEC frame as it appears on the wire

use cecbus_core::{LogicalAddress, Opcode};

/// Maximal number of bytes in a frame, header included
pub const MAX_LENGTH: usize = 16;

#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InvalidLength;

/// Wire frame: a header byte followed by an optional opcode and up to 14 operands
///
/// The header packs the initiator into the high nibble and the destination into the low nibble.
/// A frame of a single header byte is a poll. The frame is never empty.
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    length: u8,
    bytes: [u8; MAX_LENGTH],
}

impl Frame {
    /// Creates a frame from a slice of 1..=16 bytes.
    pub fn new(data: &[u8]) -> Result<Self, InvalidLength> {
        if data.is_empty() || data.len() > MAX_LENGTH {
            return Err(InvalidLength);
        }
        let mut bytes = [0; MAX_LENGTH];
        bytes[..data.len()].copy_from_slice(data);
        Ok(Self {
            length: data.len() as u8,
            bytes,
        })
    }

    /// Creates a poll frame, used to check whether `destination` is in use.
    pub const fn poll(initiator: LogicalAddress, destination: LogicalAddress) -> Self {
        let mut bytes = [0; MAX_LENGTH];
        bytes[0] = header(initiator, destination);
        Self { length: 1, bytes }
    }

    /// Creates a frame with an opcode and up to 14 operands.
    pub fn with_opcode(
        initiator: LogicalAddress,
        destination: LogicalAddress,
        opcode: Opcode,
        operands: &[u8],
    ) -> Result<Self, InvalidLength> {
        if operands.len() > MAX_LENGTH - 2 {
            return Err(InvalidLength);
        }
        let mut bytes = [0; MAX_LENGTH];
        bytes[0] = header(initiator, destination);
        bytes[1] = opcode.into_u8();
        bytes[2..2 + operands.len()].copy_from_slice(operands);
        Ok(Self {
            length: (2 + operands.len()) as u8,
            bytes,
        })
    }

    pub fn initiator(&self) -> LogicalAddress {
        LogicalAddress::from_u8_truncating(self.bytes[0] >> 4)
    }

    pub fn destination(&self) -> LogicalAddress {
        LogicalAddress::from_u8_truncating(self.bytes[0])
    }

    pub fn set_initiator(&mut self, initiator: LogicalAddress) {
        self.bytes[0] = header(initiator, self.destination());
    }

    pub fn set_destination(&mut self, destination: LogicalAddress) {
        self.bytes[0] = header(self.initiator(), destination);
    }

    pub fn is_broadcast(&self) -> bool {
        self.destination().is_broadcast()
    }

    pub fn is_poll(&self) -> bool {
        self.length == 1
    }

    pub fn opcode(&self) -> Option<Opcode> {
        (self.length > 1).then(|| Opcode::new(self.bytes[1]))
    }

    pub fn operands(&self) -> &[u8] {
        self.bytes.get(2..usize::from(self.length)).unwrap_or(&[])
    }
}

const fn header(initiator: LogicalAddress, destination: LogicalAddress) -> u8 {
    (initiator.into_u8() << 4) | destination.into_u8()
}

impl core::ops::Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.bytes[..usize::from(self.length)]
    }
}

impl core::ops::DerefMut for Frame {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.bytes[..usize::from(self.length)]
    }
}

impl core::fmt::Debug for Frame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Frame(")?;
        for (i, byte) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ":")?;
            }
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}
