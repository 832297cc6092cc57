use core::cell::RefCell;
use core::future::poll_fn;
use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::NoopMutex;
use embassy_time::Timer;

use super::inner::{ControlRequest, Work};
use super::{ControlError, Shared};
use crate::claim;
use crate::config::{ConfigError, LogicalAddressConfig};
use crate::core::PhysicalAddress;
use crate::driver::adapter::Adapter;
use crate::time::Instant;

/// Adapter owned by the runner, shared between its loops
pub(crate) type AdapterCell<A> = NoopMutex<RefCell<A>>;

pub(crate) fn with_adapter<A: Adapter, R>(
    adapter: &AdapterCell<A>,
    f: impl FnOnce(&mut A) -> R,
) -> R {
    adapter.lock(|cell| f(&mut cell.borrow_mut()))
}

/// Node background task runner
///
/// Feeds the adapter from the transmit queue, expires deadlines, applies control requests and
/// runs logical address arbitration. Run for proper node operation.
pub struct Runner<'a> {
    shared: Shared<'a>,
}

impl<'a> Runner<'a> {
    pub(crate) fn new(shared: Shared<'a>) -> Self {
        Self { shared }
    }

    pub async fn run<A: Adapter>(&mut self, adapter: A) {
        let adapter: AdapterCell<A> = NoopMutex::new(RefCell::new(adapter));
        let needs_hpd = self.shared.lock(|inner| inner.state.needs_hpd);
        if !needs_hpd {
            if let Err(err) = with_adapter(&adapter, |adapter| adapter.enable(true)) {
                error!("failed to enable adapter: {:?}", err);
            }
        }

        select(
            transmit_loop(self.shared, &adapter),
            control_loop(self.shared, &adapter),
        )
        .await;
    }
}

async fn transmit_loop<A: Adapter>(shared: Shared<'_>, adapter: &AdapterCell<A>) {
    let mut armed = Instant::MAX;
    loop {
        let deadline = armed;
        let timer = async {
            if deadline == Instant::MAX {
                core::future::pending::<()>().await
            } else {
                Timer::at(deadline).await
            }
        };
        let work = poll_fn(|cx| shared.lock(|inner| inner.poll_transmit(cx, deadline, Instant::now())));

        match select(timer, work).await {
            // Expired on the next poll
            Either::First(()) => {}
            Either::Second(Work::Rearm(deadline)) => armed = deadline,
            Either::Second(Work::Transmit(job)) => {
                let result = with_adapter(adapter, |adapter| {
                    adapter.transmit(job.attempts, job.signal_free_time, &job.frame)
                });
                if let Err(err) = result {
                    warn!("adapter rejected {:?}: {:?}", job.frame, err);
                    shared.lock(|inner| inner.transmit_rejected(&job, Instant::now()));
                }
            }
        }
    }
}

async fn control_loop<A: Adapter>(shared: Shared<'_>, adapter: &AdapterCell<A>) {
    loop {
        let request = poll_fn(|cx| shared.lock(|inner| inner.control.poll_request(cx, false))).await;
        let mut result = apply(shared, adapter, request);
        loop {
            shared.lock(|inner| inner.control.complete(result));
            if !shared.lock(|inner| inner.state.configuring) {
                break;
            }
            let interrupt = poll_fn(|cx| shared.lock(|inner| inner.poll_interrupt(cx)));
            match select(claim::claim(shared, adapter), interrupt).await {
                Either::First(()) => break,
                Either::Second(request) => {
                    debug!("arbitration interrupted");
                    result = apply(shared, adapter, request);
                }
            }
        }
    }
}

fn apply<A: Adapter>(
    shared: Shared<'_>,
    adapter: &AdapterCell<A>,
    request: ControlRequest,
) -> Result<(), ControlError> {
    match request {
        ControlRequest::PhysicalAddress(physical_address) => {
            set_physical_address(shared, adapter, physical_address)
        }
        ControlRequest::LogicalAddresses(config) => set_logical_addresses(shared, adapter, config),
        ControlRequest::MonitorAll(enable) => set_monitor_all(shared, adapter, enable),
    }
}

/// Releases all logical addresses, in the adapter as well, and aborts all messages.
///
/// Returns `true` if a state change was posted.
pub(crate) fn unconfigure<A: Adapter>(
    shared: Shared<'_>,
    adapter: &AdapterCell<A>,
    now: Instant,
) -> bool {
    let (posted, program) = shared.lock(|inner| {
        let posted = inner.unconfigure(now);
        let program = !inner.state.needs_hpd || inner.state.physical_address.is_valid();
        (posted, program)
    });
    if program {
        if let Err(err) = with_adapter(adapter, |adapter| adapter.claim_address(None)) {
            warn!("failed to clear logical addresses: {:?}", err);
        }
    }
    posted
}

fn set_physical_address<A: Adapter>(
    shared: Shared<'_>,
    adapter: &AdapterCell<A>,
    physical_address: PhysicalAddress,
) -> Result<(), ControlError> {
    let (current, needs_hpd, monitor_all) = shared.lock(|inner| {
        (
            inner.state.physical_address,
            inner.state.needs_hpd,
            inner.state.monitor_all,
        )
    });
    if physical_address == current {
        return Ok(());
    }
    info!("physical address {:?}", physical_address);

    if current.is_valid() {
        shared.lock(|inner| inner.state.physical_address = PhysicalAddress::INVALID);
        if !unconfigure(shared, adapter, Instant::now()) {
            shared.lock(|inner| inner.post_state());
        }
        if needs_hpd {
            if monitor_all {
                if let Err(err) = with_adapter(adapter, |adapter| adapter.set_monitor_all(false)) {
                    warn!("failed to disable monitor mode: {:?}", err);
                }
            }
            if let Err(err) = with_adapter(adapter, |adapter| adapter.enable(false)) {
                warn!("failed to disable adapter: {:?}", err);
            }
            shared.lock(|inner| inner.scheduler.reset_transmitting());
        }
    }
    if !physical_address.is_valid() {
        return Ok(());
    }

    shared.lock(|inner| inner.state.last_initiator = None);
    if needs_hpd {
        with_adapter(adapter, |adapter| adapter.enable(true))?;
        if monitor_all {
            if let Err(err) = with_adapter(adapter, |adapter| adapter.set_monitor_all(true)) {
                // Cannot leave the adapter half enabled
                if let Err(disable) = with_adapter(adapter, |adapter| adapter.enable(false)) {
                    warn!("failed to disable adapter: {:?}", disable);
                }
                return Err(err.into());
            }
        }
    }

    shared.lock(|inner| {
        inner.set_physical_address(physical_address);
        if inner.config.is_some() && !inner.state.stopped {
            inner.begin_configuring();
        }
    });
    Ok(())
}

fn set_logical_addresses<A: Adapter>(
    shared: Shared<'_>,
    adapter: &AdapterCell<A>,
    config: Option<LogicalAddressConfig>,
) -> Result<(), ControlError> {
    let Some(config) = config else {
        unconfigure(shared, adapter, Instant::now());
        shared.lock(|inner| inner.config = None);
        return Ok(());
    };

    shared.lock(|inner| {
        if inner.state.configured || inner.state.configuring {
            return Err(ControlError::Config(ConfigError::Busy));
        }
        inner.config = Some(config);
        if inner.state.physical_address.is_valid() && !inner.state.stopped {
            inner.begin_configuring();
        }
        Ok(())
    })
}

fn set_monitor_all<A: Adapter>(
    shared: Shared<'_>,
    adapter: &AdapterCell<A>,
    enable: bool,
) -> Result<(), ControlError> {
    let (current, powered) = shared.lock(|inner| {
        (
            inner.state.monitor_all,
            !inner.state.needs_hpd || inner.state.physical_address.is_valid(),
        )
    });
    if enable == current {
        return Ok(());
    }
    if powered {
        with_adapter(adapter, |adapter| adapter.set_monitor_all(enable))?;
    }
    shared.lock(|inner| inner.state.monitor_all = enable);
    Ok(())
}
