//! Logical address arbitration
//!
//! Each configuration slot polls the candidate addresses of its device kind.
//! An unacknowledged poll means the address is free. The address held by the slot before is
//! polled first.

use crate::config::LogicalAddressConfig;
use crate::core::{CecVersion, DeviceKind, LogicalAddress, LogicalAddressSet, PhysicalAddress};
use crate::driver::adapter::{Adapter, AdapterError};
use crate::driver::frame::Frame;
use crate::driver::status::TxStatus;
use crate::message::Message;
use crate::node::{AdapterCell, Inner, Shared, transmit_blocking, unconfigure, with_adapter};
use crate::policy::POLL_ATTEMPTS;
use crate::responder;
use crate::scheduler::Completion;
use crate::state::MAX_LOGICAL_ADDRESSES;
use crate::time::Instant;
use crate::TransmitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum ClaimError {
    /// Cancelled by a state change
    Interrupted,
    NoConfiguration,
    /// No slot got an address and the unregistered fallback is not allowed
    NoAddress,
    Transmit(TransmitError),
    Adapter(AdapterError),
}

impl From<TransmitError> for ClaimError {
    fn from(value: TransmitError) -> Self {
        Self::Transmit(value)
    }
}

impl From<AdapterError> for ClaimError {
    fn from(value: AdapterError) -> Self {
        Self::Adapter(value)
    }
}

/// Claims the configured logical addresses and leaves the adapter configured or unconfigured
pub(crate) async fn claim<A: Adapter>(shared: Shared<'_>, adapter: &AdapterCell<A>) {
    if let Err(err) = claim_all(shared, adapter).await {
        warn!("logical address arbitration failed: {:?}", err);
        unconfigure(shared, adapter, Instant::now());
    }
}

async fn claim_all<A: Adapter>(
    shared: Shared<'_>,
    adapter: &AdapterCell<A>,
) -> Result<(), ClaimError> {
    let (config, physical_address) = shared
        .lock(|inner| {
            inner.state.logical_addresses = LogicalAddressSet::NONE;
            inner.state.claimed = [None; MAX_LOGICAL_ADDRESSES];
            Some((inner.config.clone()?, inner.state.physical_address))
        })
        .ok_or(ClaimError::NoConfiguration)?;
    with_adapter(adapter, |adapter| adapter.claim_address(None))?;
    debug!("arbitration at {:?}", physical_address);

    let unregistered = config
        .slots
        .first()
        .is_some_and(|slot| slot.kind == DeviceKind::Unregistered);
    if !unregistered {
        for (index, slot) in config.slots.iter().enumerate() {
            // Only the root device may be the TV
            let kind = match slot.kind {
                DeviceKind::Tv if physical_address != PhysicalAddress::ROOT => {
                    DeviceKind::Specific
                }
                kind => kind,
            };
            if !claim_slot(shared, adapter, index, kind, config.version).await? {
                debug!("no free logical address for {:?}", kind);
            }
        }
    }

    let fallback = shared.lock(|inner| {
        if !inner.state.configuring {
            return Err(ClaimError::Interrupted);
        }
        let fallback = inner.state.logical_addresses.is_empty() && !unregistered;
        if inner.state.logical_addresses.is_empty() {
            if fallback && !config.allow_unregistered_fallback {
                return Err(ClaimError::NoAddress);
            }
            inner.state.claimed[0] = Some(LogicalAddress::UNREGISTERED);
            inner
                .state
                .logical_addresses
                .insert(LogicalAddress::UNREGISTERED);
        }
        inner.finish_configuring();
        info!(
            "configured logical addresses {:?}",
            inner.state.logical_addresses
        );
        Ok(fallback)
    })?;

    if !fallback && !config.cdc_only {
        let now = Instant::now();
        shared.lock(|inner| announce(inner, &config, now));
    }
    Ok(())
}

/// Returns `true` if an address was claimed for slot `index`
async fn claim_slot<A: Adapter>(
    shared: Shared<'_>,
    adapter: &AdapterCell<A>,
    index: usize,
    kind: DeviceKind,
    version: CecVersion,
) -> Result<bool, ClaimError> {
    let candidates = kind.candidates();
    let last = shared.lock(|inner| inner.state.last_claimed[index]);
    let first = match last {
        Some(address) if kind.primary_set().contains(address) => address,
        _ => candidates[0],
    };
    if claim_address(shared, adapter, index, first).await? {
        return Ok(true);
    }

    for &candidate in candidates {
        let backup = candidate == LogicalAddress::BACKUP_1 || candidate == LogicalAddress::BACKUP_2;
        if candidate == first || (backup && version == CecVersion::V1_4) {
            continue;
        }
        if claim_address(shared, adapter, index, candidate).await? {
            return Ok(true);
        }
    }
    // Kept across interruptions, forgotten once every candidate is taken
    shared.lock(|inner| inner.state.last_claimed[index] = None);
    Ok(false)
}

/// Polls `address` and claims it if nobody acknowledges
async fn claim_address<A: Adapter>(
    shared: Shared<'_>,
    adapter: &AdapterCell<A>,
    index: usize,
    address: LogicalAddress,
) -> Result<bool, ClaimError> {
    if shared.lock(|inner| inner.state.logical_addresses.contains(address)) {
        return Ok(false);
    }

    let poll = Message::new(Frame::poll(address, address));
    for _ in 0..POLL_ATTEMPTS {
        let result = transmit_blocking(shared, poll).await;
        if !shared.lock(|inner| inner.state.configuring) {
            return Err(ClaimError::Interrupted);
        }
        let status = result?.tx.status;
        if status.contains(TxStatus::ABORTED) {
            return Err(ClaimError::Interrupted);
        }
        if status.contains(TxStatus::OK) {
            debug!("logical address {:?} in use", address);
            return Ok(false);
        }
        if status.contains(TxStatus::NACK) {
            with_adapter(adapter, |adapter| adapter.claim_address(Some(address)))?;
            shared.lock(|inner| inner.state.record_claim(index, address));
            info!("claimed logical address {:?}", address);
            return Ok(true);
        }
    }
    // Arbitration lost or bus errors on every poll
    debug!("logical address {:?} skipped", address);
    Ok(false)
}

/// Queues the broadcasts announcing the claimed addresses
fn announce(inner: &mut Inner, config: &LogicalAddressConfig, now: Instant) {
    let physical_address = inner.state.physical_address;
    let claimed = inner.state.claimed;
    for (index, slot) in config.slots.iter().enumerate() {
        let Some(own) = claimed[index] else {
            continue;
        };
        if own != LogicalAddress::UNREGISTERED && config.version == CecVersion::V2_0 {
            send(inner, responder::report_features(own, config, index), now);
        }
        send(
            inner,
            responder::report_physical_address(own, physical_address, slot.primary_device_type),
            now,
        );
        if let Some(vendor_id) = config.vendor_id {
            send(
                inner,
                responder::device_vendor_id(own, vendor_id.to_bytes()),
                now,
            );
        }
    }
}

fn send(inner: &mut Inner, frame: Frame, now: Instant) {
    if let Err(err) = inner.submit(Message::new(frame), Completion::Detached(None), now) {
        warn!("announcement {:?} not sent: {:?}", frame, err);
    }
}
