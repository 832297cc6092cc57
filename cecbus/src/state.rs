use crate::core::{LogicalAddress, LogicalAddressSet, PhysicalAddress};

/// Maximal number of logical addresses an adapter may hold
pub const MAX_LOGICAL_ADDRESSES: usize = 4;

/// Addressing state of the adapter, shared by admission, scheduler and arbitration
pub(crate) struct AdapterState {
    pub physical_address: PhysicalAddress,
    /// Claimed addresses as a set
    pub logical_addresses: LogicalAddressSet,
    /// Claimed address per configuration slot
    pub claimed: [Option<LogicalAddress>; MAX_LOGICAL_ADDRESSES],
    /// Address per slot from the previous configuration, preferred on the next arbitration
    pub last_claimed: [Option<LogicalAddress>; MAX_LOGICAL_ADDRESSES],
    pub configured: bool,
    pub configuring: bool,
    /// Initiator of the most recent transmission
    pub last_initiator: Option<LogicalAddress>,
    pub needs_hpd: bool,
    pub monitor_all: bool,
    pub stopped: bool,
    sequence: u32,
}

impl AdapterState {
    pub const fn new(needs_hpd: bool) -> Self {
        Self {
            physical_address: PhysicalAddress::INVALID,
            logical_addresses: LogicalAddressSet::NONE,
            claimed: [None; MAX_LOGICAL_ADDRESSES],
            last_claimed: [None; MAX_LOGICAL_ADDRESSES],
            configured: false,
            configuring: false,
            last_initiator: None,
            needs_hpd,
            monitor_all: false,
            stopped: false,
            sequence: 0,
        }
    }

    /// Returns the next sequence number. Zero is skipped on wrap-around.
    pub fn next_sequence(&mut self) -> u32 {
        self.sequence = self.sequence.wrapping_add(1);
        if self.sequence == 0 {
            self.sequence = 1;
        }
        self.sequence
    }

    /// The adapter may not carry traffic until a physical address appears
    pub fn is_idle_unconfigured(&self) -> bool {
        !self.configured && !self.configuring
    }

    pub fn record_claim(&mut self, slot: usize, address: LogicalAddress) {
        self.claimed[slot] = Some(address);
        self.last_claimed[slot] = Some(address);
        self.logical_addresses.insert(address);
    }

    pub fn release_all(&mut self) {
        self.claimed = [None; MAX_LOGICAL_ADDRESSES];
        self.logical_addresses = LogicalAddressSet::NONE;
        self.configured = false;
        self.configuring = false;
    }

    pub fn snapshot(&self) -> BusState {
        BusState {
            physical_address: self.physical_address,
            logical_addresses: self.logical_addresses,
            configured: self.configured,
            configuring: self.configuring,
        }
    }
}

/// Observable addressing state of the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusState {
    pub physical_address: PhysicalAddress,
    pub logical_addresses: LogicalAddressSet,
    pub configured: bool,
    pub configuring: bool,
}
