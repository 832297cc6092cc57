#![allow(dead_code)]

use cecbus::config::{LogicalAddressConfig, LogicalAddressSlot};
use cecbus::core::{CecVersion, DeviceKind, LogicalAddress, PhysicalAddress, PrimaryDeviceType};
use cecbus::driver::adapter::{Adapter, AdapterError, SignalFreeTime};
use cecbus::driver::status::{AttemptCounters, TxStatus};
use cecbus::events::Event;
use cecbus::frame::Frame;
use cecbus::node::{Bus, Config, Control, Events, Link, Node, Runner};
use cecbus::time::Instant;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use futures_executor::LocalPool;
use futures_task::LocalSpawn;
use std::boxed::Box;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::rc::Rc;
use std::vec::Vec;

pub const PHYSICAL_ADDRESS: PhysicalAddress = PhysicalAddress::new(0x1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transmission {
    pub attempts: u8,
    pub signal_free_time: SignalFreeTime,
    pub frame: Frame,
}

/// Everything the engine asked the adapter to do
#[derive(Default)]
pub struct AdapterLog {
    pub enabled: bool,
    pub monitor_all: bool,
    /// `claim_address` arguments in call order
    pub addresses: Vec<Option<LogicalAddress>>,
    /// Started transmissions not yet reported by the test
    pub transmissions: VecDeque<Transmission>,
    /// Fail the next `transmit` call
    pub reject_next: bool,
}

pub struct MockAdapter(pub Rc<RefCell<AdapterLog>>);

impl Adapter for MockAdapter {
    fn enable(&mut self, enable: bool) -> Result<(), AdapterError> {
        let mut log = self.0.borrow_mut();
        log.enabled = enable;
        if !enable {
            log.transmissions.clear();
        }
        Ok(())
    }

    fn claim_address(&mut self, address: Option<LogicalAddress>) -> Result<(), AdapterError> {
        self.0.borrow_mut().addresses.push(address);
        Ok(())
    }

    fn transmit(
        &mut self,
        attempts: u8,
        signal_free_time: SignalFreeTime,
        frame: &Frame,
    ) -> Result<(), AdapterError> {
        let mut log = self.0.borrow_mut();
        assert!(log.enabled);
        assert!(log.transmissions.is_empty(), "second transmission in flight");
        if core::mem::take(&mut log.reject_next) {
            return Err(AdapterError::Rejected);
        }
        log.transmissions.push_back(Transmission {
            attempts,
            signal_free_time,
            frame: *frame,
        });
        Ok(())
    }

    fn set_monitor_all(&mut self, enable: bool) -> Result<(), AdapterError> {
        self.0.borrow_mut().monitor_all = enable;
        Ok(())
    }
}

/// Node with a mock adapter. The test plays the role of the bus.
pub struct Fixture {
    pub executor: LocalPool,
    pub adapter: Rc<RefCell<AdapterLog>>,
    pub link: Link<'static>,
    pub bus: Bus<'static>,
    pub events: Events<'static>,
    pub control: Option<Control<'static>>,
}

impl Fixture {
    pub fn new(config: Config) -> Self {
        let executor = LocalPool::new();
        let node = Box::leak(Box::new(Node::<CriticalSectionRawMutex>::new(config)));
        let (bus, link, control, events, runner) = node.split();
        let adapter = Rc::new(RefCell::new(AdapterLog::default()));

        let mut fixture = Self {
            executor,
            adapter: adapter.clone(),
            link,
            bus,
            events,
            control: Some(control),
        };
        fixture.spawn(run_node(runner, MockAdapter(adapter)));
        fixture.stall();
        fixture
    }

    pub fn spawn(&self, future: impl Future<Output = ()> + 'static) {
        self.executor
            .spawner()
            .spawn_local_obj(Box::new(future).into())
            .unwrap();
    }

    pub fn stall(&mut self) {
        self.executor.run_until_stalled();
    }

    /// Takes the transmission the adapter is working on
    pub fn next_transmission(&mut self) -> Transmission {
        self.stall();
        self.adapter
            .borrow_mut()
            .transmissions
            .pop_front()
            .expect("no transmission in flight")
    }

    pub fn has_transmission(&mut self) -> bool {
        self.stall();
        !self.adapter.borrow().transmissions.is_empty()
    }

    /// Reports the outcome of the transmission taken before
    pub fn complete(&mut self, status: TxStatus) {
        self.link
            .transmit_done(status, AttemptCounters::from_status(status), Instant::now());
        self.stall();
    }

    /// Completes the next transmission with `status` and returns its frame
    pub fn answer(&mut self, status: TxStatus) -> Frame {
        let transmission = self.next_transmission();
        self.complete(status);
        transmission.frame
    }

    pub fn receive(&mut self, bytes: &[u8]) {
        self.link.received(&frame(bytes), Instant::now());
        self.stall();
    }

    pub fn drain_events(&mut self) -> Vec<Event> {
        core::iter::from_fn(|| self.events.try_receive()).collect()
    }

    /// Sets the physical address and claims `config`, answering the polls with `polls`.
    ///
    /// Returns the poll frames.
    pub fn configure(&mut self, config: LogicalAddressConfig, polls: &[TxStatus]) -> Vec<Frame> {
        let mut control = self.control.take().expect("control handle in use");
        let done = Rc::new(RefCell::new(None));
        let result = done.clone();
        self.spawn(async move {
            control.set_physical_address(PHYSICAL_ADDRESS).await.unwrap();
            control.set_logical_addresses(Some(config)).await.unwrap();
            let configured = control.wait_configured().await;
            *result.borrow_mut() = Some((configured, control));
        });
        let frames: Vec<Frame> = polls.iter().map(|&status| self.answer(status)).collect();
        assert!(frames.iter().all(Frame::is_poll));
        self.stall();
        let (configured, control) = done.borrow_mut().take().expect("arbitration not finished");
        configured.unwrap();
        self.control = Some(control);
        frames
    }

    /// Claims Playback 1 and completes the announcements
    pub fn configure_playback(&mut self) {
        self.configure(playback_config(), &[TxStatus::NACK | TxStatus::MAX_RETRIES]);
        // Report Features, Report Physical Address
        self.answer(TxStatus::OK);
        self.answer(TxStatus::OK);
        self.drain_events();
    }
}

async fn run_node(mut runner: Runner<'static>, adapter: MockAdapter) {
    runner.run(adapter).await
}

pub fn frame(bytes: &[u8]) -> Frame {
    Frame::new(bytes).unwrap()
}

pub fn playback_config() -> LogicalAddressConfig {
    let slot = LogicalAddressSlot::new(DeviceKind::Playback, PrimaryDeviceType::Playback);
    LogicalAddressConfig::new(CecVersion::V2_0, &[slot]).unwrap()
}
