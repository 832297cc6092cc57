//! CEC node
//!
//! The node holds the adapter state, the transmit scheduler and the event queue behind one
//! mutex. It is accessed through handles:
//! * _Bus_ submits messages. Cheap to copy.
//! * _Control_ sets the physical address, the logical address configuration and monitor mode.
//! * _Events_ receives messages and notifications.
//! * _Link_ is passed to the adapter driver for completion and reception callbacks.
//! * _Runner_ drives the adapter and runs address arbitration. Run it for proper node operation.
//!
//! ## Examples
//!
//! ```
//! use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex as Mutex;
//! use cecbus::node::{Config, Node};
//!
//! let config = Config {
//!     needs_hpd: true,
//!     ..Default::default()
//! };
//! let mut node = Node::<Mutex>::new(config);
//! let (bus, link, control, events, runner) = node.split();
//! ```

use core::cell::RefCell;
use core::future::poll_fn;
use embassy_sync::blocking_mutex::{Mutex, raw::RawMutex};

use crate::config::{ConfigError, LogicalAddressConfig};
use crate::core::{LogicalAddressSet, PhysicalAddress};
use crate::driver::adapter::AdapterError;
use crate::driver::frame::Frame;
use crate::driver::internal::DynamicLink;
use crate::driver::status::{AttemptCounters, TxStatus};
use crate::events::{Event, OwnerId};
use crate::message::Message;
use crate::scheduler::{Completion, Ticket};
use crate::state::{BusState, MAX_LOGICAL_ADDRESSES};
use crate::time::Instant;
use crate::TransmitError;

mod inner;
mod runner;

pub(crate) use inner::{ControlRequest, Inner};
pub use crate::driver::link::Link;
pub use runner::Runner;
pub(crate) use runner::{AdapterCell, unconfigure, with_adapter};

/// Adapter capabilities and node behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// The adapter may only be enabled while a valid physical address is set
    pub needs_hpd: bool,
    /// Number of logical addresses the adapter can hold, 1..=4
    pub available_logical_addresses: u8,
    /// Leave core protocol requests to listeners instead of answering them
    pub passthrough: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            needs_hpd: false,
            available_logical_addresses: MAX_LOGICAL_ADDRESSES as u8,
            passthrough: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControlError {
    Adapter(AdapterError),
    Config(ConfigError),
    /// No logical address could be claimed or no configuration is set
    NotConfigured,
}

impl From<AdapterError> for ControlError {
    fn from(value: AdapterError) -> Self {
        Self::Adapter(value)
    }
}

impl From<ConfigError> for ControlError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

/// Result of an accepted non-blocking submission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Submission {
    /// Queued for transmission. The final message is reported as [`Event::Transmitted`](crate::events::Event::Transmitted).
    Queued(Ticket),
    /// Completed without bus access
    Completed(Message),
}

pub(crate) trait DynamicNode {
    fn with_inner(&self, f: &mut dyn FnMut(&mut Inner));
}

#[derive(Clone, Copy)]
pub(crate) struct Shared<'a>(&'a (dyn DynamicNode + Sync));

impl<'a> Shared<'a> {
    /// Runs `f` with the node state locked
    pub fn lock<R>(self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let mut f = Some(f);
        let mut result = None;
        self.0.with_inner(&mut |inner| {
            if let Some(f) = f.take() {
                result = Some(f(inner));
            }
        });
        unwrap!(result)
    }
}

/// CEC node state
pub struct Node<M: RawMutex> {
    inner: Mutex<M, RefCell<Inner>>,
}

impl<M: RawMutex + Sync> Node<M> {
    pub fn new(config: Config) -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner::new(config))),
        }
    }

    pub fn split(&mut self) -> (Bus<'_>, Link<'_>, Control<'_>, Events<'_>, Runner<'_>) {
        let shared = Shared(&*self);
        (
            Bus(shared),
            Link::new(&*self),
            Control(shared),
            Events(shared),
            Runner::new(shared),
        )
    }
}

impl<M: RawMutex> DynamicNode for Node<M> {
    fn with_inner(&self, f: &mut dyn FnMut(&mut Inner)) {
        self.inner.lock(|cell| f(&mut cell.borrow_mut()));
    }
}

impl<M: RawMutex> DynamicLink for Node<M> {
    fn transmit_done(&self, status: TxStatus, counters: AttemptCounters, timestamp: Instant) {
        self.inner.lock(|cell| {
            cell.borrow_mut()
                .transmit_done(status, counters, timestamp)
        });
    }

    fn received(&self, frame: &Frame, timestamp: Instant) {
        self.inner
            .lock(|cell| cell.borrow_mut().received(frame, timestamp));
    }
}

/// Message submission handle
#[derive(Clone, Copy)]
pub struct Bus<'a>(Shared<'a>);

impl<'a> Bus<'a> {
    /// Submits a message without waiting for its completion.
    ///
    /// The final message is reported as [`Event::Transmitted`](crate::events::Event::Transmitted) tagged with `owner`.
    pub fn try_transmit(
        &self,
        message: Message,
        owner: Option<OwnerId>,
    ) -> Result<Submission, TransmitError> {
        let now = Instant::now();
        self.0
            .lock(|inner| inner.submit(message, Completion::Detached(owner), now))
    }

    /// Transmits a message and waits for its completion, including the reply if one is expected.
    ///
    /// Dropping the future aborts the message.
    pub async fn transmit(&self, message: Message) -> Result<Message, TransmitError> {
        transmit_blocking(self.0, message).await
    }

    pub fn state(&self) -> BusState {
        self.0.lock(|inner| inner.state.snapshot())
    }
}

/// Submits `message` and parks until it reaches a terminal state
pub(crate) async fn transmit_blocking(
    shared: Shared<'_>,
    message: Message,
) -> Result<Message, TransmitError> {
    let now = Instant::now();
    let ticket = match shared.lock(|inner| inner.submit(message, Completion::blocking(), now))? {
        Submission::Completed(message) => return Ok(message),
        Submission::Queued(ticket) => ticket,
    };

    let _guard = BlockingTransmit { shared, ticket };
    let message = poll_fn(|cx| {
        shared.lock(|inner| inner.scheduler.poll_completion(cx, ticket))
    })
    .await;
    Ok(message)
}

/// Aborts a blocking request whose caller stopped waiting
struct BlockingTransmit<'a> {
    shared: Shared<'a>,
    ticket: Ticket,
}

impl Drop for BlockingTransmit<'_> {
    fn drop(&mut self) {
        let ticket = self.ticket;
        let now = Instant::now();
        self.shared.lock(|inner| inner.abandon(ticket, now));
    }
}

/// Adapter configuration handle
///
/// Requests are applied by the runner. Dropping a request future does not undo a request the
/// runner already started to apply.
pub struct Control<'a>(Shared<'a>);

impl<'a> Control<'a> {
    pub fn state(&self) -> BusState {
        self.0.lock(|inner| inner.state.snapshot())
    }

    /// Sets the physical address. An invalid address unconfigures the adapter.
    ///
    /// A valid address starts logical address arbitration if addresses are configured.
    pub async fn set_physical_address(
        &mut self,
        physical_address: PhysicalAddress,
    ) -> Result<(), ControlError> {
        self.request(ControlRequest::PhysicalAddress(physical_address))
            .await
    }

    /// Sets the logical addresses to claim. `None` unconfigures the adapter.
    ///
    /// Arbitration starts once a valid physical address is set. Returns before arbitration
    /// completes, see [`Self::wait_configured`].
    pub async fn set_logical_addresses(
        &mut self,
        config: Option<LogicalAddressConfig>,
    ) -> Result<(), ControlError> {
        let config = match config {
            Some(mut config) => {
                let available = self.0.lock(|inner| inner.available);
                config.validate(available)?;
                Some(config)
            }
            None => None,
        };
        self.request(ControlRequest::LogicalAddresses(config)).await
    }

    /// Enables delivery of traffic between other devices as [`Event::Monitored`](crate::events::Event::Monitored)
    pub async fn set_monitor_all(&mut self, enable: bool) -> Result<(), ControlError> {
        self.request(ControlRequest::MonitorAll(enable)).await
    }

    /// Waits for the end of arbitration and returns the claimed addresses
    pub async fn wait_configured(&mut self) -> Result<LogicalAddressSet, ControlError> {
        poll_fn(|cx| self.0.lock(|inner| inner.poll_configured(cx))).await
    }

    /// Aborts all messages and rejects further submissions
    pub fn shutdown(&mut self) {
        let now = Instant::now();
        self.0.lock(|inner| inner.shutdown(now));
    }

    async fn request(&mut self, request: ControlRequest) -> Result<(), ControlError> {
        let shared = self.0;
        poll_fn(|cx| shared.lock(|inner| inner.control.poll_idle(cx))).await;
        shared.lock(|inner| inner.control.post(request));

        let _guard = PendingControl(shared);
        poll_fn(|cx| shared.lock(|inner| inner.control.poll_result(cx))).await
    }
}

struct PendingControl<'a>(Shared<'a>);

impl Drop for PendingControl<'_> {
    fn drop(&mut self) {
        self.0.lock(|inner| inner.control.abandon());
    }
}

/// Event receiver handle
pub struct Events<'a>(Shared<'a>);

impl<'a> Events<'a> {
    pub async fn receive(&mut self) -> Event {
        poll_fn(|cx| self.0.lock(|inner| inner.events.poll_pop(cx))).await
    }

    pub fn try_receive(&mut self) -> Option<Event> {
        self.0.lock(|inner| inner.events.pop())
    }

    /// Returns the number of events dropped on overflow since the previous call
    pub fn take_lost(&mut self) -> u32 {
        self.0.lock(|inner| inner.events.take_lost())
    }
}
