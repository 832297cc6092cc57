use core::task::{Context, Poll};
use embassy_sync::waitqueue::WakerRegistration;

use super::{Config, ControlError, Submission};
use crate::admission::{self, Admission};
use crate::config::LogicalAddressConfig;
use crate::core::{CecVersion, LogicalAddress, LogicalAddressSet, PhysicalAddress};
use crate::driver::frame::Frame;
use crate::driver::status::{AttemptCounters, TxStatus};
use crate::events::{Event, EventQueue};
use crate::message::Message;
use crate::receive;
use crate::responder::{self, Disposition};
use crate::scheduler::{Completion, Scheduler, Ticket, TransmitJob};
use crate::state::{AdapterState, MAX_LOGICAL_ADDRESSES};
use crate::time::Instant;
use crate::TransmitError;

/// Exactly one of these is set in a driver report
const OUTCOME_BITS: u8 = TxStatus::OK.into_bits()
    | TxStatus::ARB_LOST.into_bits()
    | TxStatus::NACK.into_bits()
    | TxStatus::LOW_DRIVE.into_bits()
    | TxStatus::ERROR.into_bits();

pub(crate) struct Inner {
    pub state: AdapterState,
    pub scheduler: Scheduler,
    pub events: EventQueue,
    pub control: ControlMailbox,
    /// Configuration to claim, kept across physical address changes
    pub config: Option<LogicalAddressConfig>,
    pub passthrough: bool,
    /// Number of logical addresses the adapter can hold
    pub available: usize,
    configured_waker: WakerRegistration,
}

/// Work for the runner's transmit loop
pub(crate) enum Work {
    Transmit(TransmitJob),
    /// The earliest deadline moved
    Rearm(Instant),
}

impl Inner {
    pub fn new(config: Config) -> Self {
        Self {
            state: AdapterState::new(config.needs_hpd),
            scheduler: Scheduler::new(),
            events: EventQueue::new(),
            control: ControlMailbox::new(),
            config: None,
            passthrough: config.passthrough,
            available: usize::from(config.available_logical_addresses)
                .clamp(1, MAX_LOGICAL_ADDRESSES),
            configured_waker: WakerRegistration::new(),
        }
    }

    fn cdc_only(&self) -> bool {
        self.config.as_ref().is_some_and(|config| config.cdc_only)
    }

    pub fn submit(
        &mut self,
        mut message: Message,
        completion: Completion,
        now: Instant,
    ) -> Result<Submission, TransmitError> {
        match admission::admit(&self.state, self.cdc_only(), &mut message)? {
            Admission::SelfPoll => {
                message.sequence = self.state.next_sequence();
                message.tx.status = TxStatus::NACK | TxStatus::MAX_RETRIES;
                message.tx.counters.nack = 1;
                message.tx.timestamp = Some(now);
                Ok(Submission::Completed(message))
            }
            Admission::Enqueue => {
                if self.scheduler.is_stopped() {
                    return Err(TransmitError::Stopped);
                }
                if let Err(err) = self
                    .scheduler
                    .check_capacity(completion.reserves(&message))
                {
                    debug!("no room for {:?}: {:?}", message.frame, err);
                    return Err(err);
                }
                message.sequence = self.state.next_sequence();
                let ticket = self.scheduler.enqueue(message, completion)?;
                Ok(Submission::Queued(ticket))
            }
        }
    }

    /// Takes the next transmission, or reports the earliest deadline if it differs from `armed`
    pub fn poll_transmit(
        &mut self,
        cx: &mut Context<'_>,
        armed: Instant,
        now: Instant,
    ) -> Poll<Work> {
        self.scheduler.expire(now, &mut self.events);
        if let Some(job) = self.scheduler.start_next(&mut self.state, now) {
            return Poll::Ready(Work::Transmit(job));
        }
        let deadline = self.scheduler.next_deadline();
        if deadline != armed {
            return Poll::Ready(Work::Rearm(deadline));
        }
        self.scheduler.register_worker(cx);
        Poll::Pending
    }

    pub fn transmit_done(&mut self, status: TxStatus, counters: AttemptCounters, timestamp: Instant) {
        let bits = status.into_bits();
        let status = if (bits & OUTCOME_BITS).count_ones() == 1
            && bits & !(OUTCOME_BITS | TxStatus::MAX_RETRIES.into_bits()) == 0
        {
            status
        } else {
            warn!("transmit done with invalid status {:?}", status);
            TxStatus::from_bits(TxStatus::ERROR.into_bits() | bits & TxStatus::MAX_RETRIES.into_bits())
        };
        self.scheduler
            .transmit_done(&self.state, status, counters, timestamp, &mut self.events);
    }

    pub fn transmit_rejected(&mut self, job: &TransmitJob, now: Instant) {
        self.scheduler.transmit_rejected(job, now, &mut self.events);
    }

    pub fn abandon(&mut self, ticket: Ticket, now: Instant) {
        self.scheduler.abandon(ticket, now, &mut self.events);
    }

    pub fn received(&mut self, frame: &Frame, timestamp: Instant) {
        let initiator = frame.initiator();
        if initiator != LogicalAddress::UNREGISTERED
            && self.state.logical_addresses.contains(initiator)
        {
            trace!("echo {:?}", frame);
            return;
        }
        trace!("received {:?}", frame);
        // Another initiator used the bus
        self.state.last_initiator = None;

        let version = self
            .config
            .as_ref()
            .map_or(CecVersion::V2_0, |config| config.version);
        let for_us =
            frame.is_broadcast() || self.state.logical_addresses.contains(frame.destination());
        let valid = for_us && receive::is_well_formed(frame, version);

        let mut forward = true;
        if valid && self.state.configured && frame.len() > 1 {
            if let Some(share) =
                self.scheduler
                    .complete_reply(frame, timestamp, &mut self.events)
            {
                forward = share;
            }
        }

        let message = Message::received(*frame, timestamp);
        if !valid {
            if self.state.monitor_all && !for_us {
                self.events.push(Event::Monitored(message));
            }
            return;
        }
        if frame.len() <= 1 || self.state.logical_addresses.is_empty() {
            return;
        }

        let disposition = match &self.config {
            Some(config) => responder::respond(frame, &self.state, config, self.passthrough),
            None => Disposition::Forward,
        };
        match disposition {
            Disposition::Forward if forward => self.events.push(Event::Received(message)),
            Disposition::Forward => {}
            Disposition::Consumed(Some(reply)) => {
                if let Err(err) = self.submit(Message::new(reply), Completion::Detached(None), timestamp)
                {
                    debug!("reply to {:?} not sent: {:?}", frame, err);
                }
            }
            Disposition::Consumed(None) => {}
        }
    }

    pub fn post_state(&mut self) {
        self.events.push(Event::StateChange(self.state.snapshot()));
    }

    /// Releases all logical addresses and aborts all messages.
    ///
    /// Returns `true` if a state change was posted.
    pub fn unconfigure(&mut self, now: Instant) -> bool {
        let was_active = self.state.configured || self.state.configuring;
        self.state.release_all();
        self.scheduler.flush(now, &mut self.events);
        self.configured_waker.wake();
        if was_active {
            self.post_state();
        }
        was_active
    }

    pub fn begin_configuring(&mut self) {
        assert!(!self.state.configured && !self.state.configuring);
        self.state.configuring = true;
        self.post_state();
    }

    pub fn finish_configuring(&mut self) {
        self.state.configuring = false;
        self.state.configured = true;
        self.configured_waker.wake();
        self.post_state();
    }

    pub fn set_physical_address(&mut self, physical_address: PhysicalAddress) {
        self.state.physical_address = physical_address;
        self.post_state();
    }

    pub fn poll_configured(
        &mut self,
        cx: &mut Context<'_>,
    ) -> Poll<Result<LogicalAddressSet, ControlError>> {
        if self.state.configured {
            return Poll::Ready(Ok(self.state.logical_addresses));
        }
        if !self.state.configuring && self.control.is_idle() {
            return Poll::Ready(Err(ControlError::NotConfigured));
        }
        self.configured_waker.register(cx.waker());
        Poll::Pending
    }

    /// Takes a control request that cancels the arbitration in progress.
    ///
    /// A request for the current physical address changes nothing and completes right away.
    pub fn poll_interrupt(&mut self, cx: &mut Context<'_>) -> Poll<ControlRequest> {
        loop {
            match self.control.poll_request(cx, true) {
                Poll::Ready(ControlRequest::PhysicalAddress(physical_address))
                    if physical_address == self.state.physical_address =>
                {
                    self.control.complete(Ok(()));
                }
                poll => return poll,
            }
        }
    }

    pub fn shutdown(&mut self, now: Instant) {
        info!("shutdown");
        self.state.stopped = true;
        self.scheduler.shutdown(now, &mut self.events);
        self.configured_waker.wake();
    }
}

/// Request applied by the runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ControlRequest {
    PhysicalAddress(PhysicalAddress),
    LogicalAddresses(Option<LogicalAddressConfig>),
    MonitorAll(bool),
}

impl ControlRequest {
    /// Requests that cancel address arbitration in progress
    pub fn interrupts_arbitration(&self) -> bool {
        match self {
            ControlRequest::PhysicalAddress(_) => true,
            ControlRequest::LogicalAddresses(config) => config.is_none(),
            ControlRequest::MonitorAll(_) => false,
        }
    }
}

enum MailboxSlot {
    Empty,
    Posted(ControlRequest),
    Running,
    Done(Result<(), ControlError>),
}

/// Single request rendezvous between the control handle and the runner
pub(crate) struct ControlMailbox {
    slot: MailboxSlot,
    /// The caller stopped waiting for the running request
    abandoned: bool,
    runner: WakerRegistration,
    caller: WakerRegistration,
}

impl ControlMailbox {
    const fn new() -> Self {
        Self {
            slot: MailboxSlot::Empty,
            abandoned: false,
            runner: WakerRegistration::new(),
            caller: WakerRegistration::new(),
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.slot, MailboxSlot::Empty)
    }

    pub fn poll_idle(&mut self, cx: &mut Context<'_>) -> Poll<()> {
        if self.is_idle() {
            return Poll::Ready(());
        }
        self.caller.register(cx.waker());
        Poll::Pending
    }

    pub fn post(&mut self, request: ControlRequest) {
        assert!(self.is_idle());
        self.slot = MailboxSlot::Posted(request);
        self.runner.wake();
    }

    /// Takes the posted request. With `interrupting_only`, other requests are left posted.
    pub fn poll_request(
        &mut self,
        cx: &mut Context<'_>,
        interrupting_only: bool,
    ) -> Poll<ControlRequest> {
        if let MailboxSlot::Posted(request) = &self.slot {
            if !interrupting_only || request.interrupts_arbitration() {
                let MailboxSlot::Posted(request) =
                    core::mem::replace(&mut self.slot, MailboxSlot::Running)
                else {
                    unreachable!()
                };
                return Poll::Ready(request);
            }
        }
        self.runner.register(cx.waker());
        Poll::Pending
    }

    pub fn complete(&mut self, result: Result<(), ControlError>) {
        if core::mem::take(&mut self.abandoned) {
            self.slot = MailboxSlot::Empty;
        } else {
            self.slot = MailboxSlot::Done(result);
        }
        self.caller.wake();
    }

    pub fn poll_result(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), ControlError>> {
        if let MailboxSlot::Done(result) = self.slot {
            self.slot = MailboxSlot::Empty;
            return Poll::Ready(result);
        }
        self.caller.register(cx.waker());
        Poll::Pending
    }

    /// The caller dropped its request future
    pub fn abandon(&mut self) {
        match self.slot {
            MailboxSlot::Posted(_) | MailboxSlot::Done(_) => self.slot = MailboxSlot::Empty,
            MailboxSlot::Running => self.abandoned = true,
            MailboxSlot::Empty => {}
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::config::LogicalAddressSlot;
    use crate::core::{DeviceKind, Opcode, PrimaryDeviceType};
    use crate::message::RxStatus;
    use crate::time::Duration;
    use futures_test::task::new_count_waker;

    fn configured() -> Inner {
        let mut inner = Inner::new(Config::default());
        let slot = LogicalAddressSlot::new(DeviceKind::Playback, PrimaryDeviceType::Playback);
        inner.config = Some(unwrap!(LogicalAddressConfig::new(CecVersion::V2_0, &[slot])));
        inner.state.physical_address = PhysicalAddress::new(0x1000);
        inner.state.record_claim(0, LogicalAddress::PLAYBACK_1);
        inner.state.configured = true;
        inner
    }

    fn frame(bytes: &[u8]) -> Frame {
        unwrap!(Frame::new(bytes))
    }

    fn drain(inner: &mut Inner) -> std::vec::Vec<Event> {
        core::iter::from_fn(|| inner.events.pop()).collect()
    }

    fn start(inner: &mut Inner) -> TransmitJob {
        let (waker, _) = new_count_waker();
        let mut cx = Context::from_waker(&waker);
        match inner.poll_transmit(&mut cx, Instant::MAX, Instant::from_millis(0)) {
            Poll::Ready(Work::Transmit(job)) => job,
            _ => panic!("no transmission"),
        }
    }

    #[test]
    fn test_self_poll_completes_immediately() {
        let mut inner = configured();
        let poll = Message::new(Frame::poll(LogicalAddress::PLAYBACK_1, LogicalAddress::PLAYBACK_1));
        match inner.submit(poll, Completion::Detached(None), Instant::from_millis(5)) {
            Ok(Submission::Completed(message)) => {
                assert_eq!(message.tx.status, TxStatus::NACK | TxStatus::MAX_RETRIES);
                assert_eq!(message.tx.counters.nack, 1);
                assert_ne!(message.sequence, 0);
            }
            other => panic!("unexpected submission {:?}", other),
        }
        assert_eq!(inner.scheduler.pending_len(), 0);
    }

    #[test]
    fn test_echo_is_dropped() {
        let mut inner = configured();
        inner.received(&frame(&[0x4f, 0x82, 0x10, 0x00]), Instant::from_millis(0));
        assert!(inner.events.pop().is_none());
    }

    #[test]
    fn test_invalid_status_becomes_error() {
        let mut inner = configured();
        unwrap!(inner.submit(
            Message::new(frame(&[0x40, 0x36])),
            Completion::Detached(None),
            Instant::from_millis(0)
        ));
        start(&mut inner);
        let status = TxStatus::OK | TxStatus::NACK;
        inner.transmit_done(status, AttemptCounters::default(), Instant::from_millis(10));
        // Retried as a failed attempt
        assert_eq!(inner.scheduler.pending_len(), 1);
    }

    #[test]
    fn test_reply_is_not_forwarded_to_listeners() {
        let mut inner = configured();
        let request = Message::new(frame(&[0x40, 0x8f]))
            .with_reply(Opcode::REPORT_POWER_STATUS, Some(Duration::from_millis(1000)));
        let ticket = match inner.submit(request, Completion::blocking(), Instant::from_millis(0)) {
            Ok(Submission::Queued(ticket)) => ticket,
            other => panic!("unexpected submission {:?}", other),
        };
        start(&mut inner);
        inner.transmit_done(TxStatus::OK, AttemptCounters::default(), Instant::from_millis(10));

        inner.received(&frame(&[0x04, 0x90, 0x00]), Instant::from_millis(20));
        assert!(drain(&mut inner).is_empty());

        let (waker, _) = new_count_waker();
        let mut cx = Context::from_waker(&waker);
        match inner.scheduler.poll_completion(&mut cx, ticket) {
            Poll::Ready(message) => {
                assert_eq!(message.rx.status, RxStatus::OK);
                assert_eq!(message.frame.operands(), &[0x00]);
            }
            Poll::Pending => panic!("request still waiting"),
        }
    }

    #[test]
    fn test_core_request_is_answered() {
        let mut inner = configured();
        inner.received(&frame(&[0x04, 0x9f]), Instant::from_millis(0));
        assert!(drain(&mut inner).is_empty());
        let job = start(&mut inner);
        assert_eq!(job.frame, frame(&[0x40, 0x9e, 0x06]));
    }

    #[test]
    fn test_monitor_all() {
        let mut inner = configured();
        let foreign = frame(&[0x05, 0x8f]);
        inner.received(&foreign, Instant::from_millis(0));
        assert!(inner.events.pop().is_none());

        inner.state.monitor_all = true;
        inner.received(&foreign, Instant::from_millis(0));
        match inner.events.pop() {
            Some(Event::Monitored(message)) => assert_eq!(message.frame, foreign),
            other => panic!("unexpected event {:?}", other),
        }

        inner.received(&frame(&[0x04, 0x8f]), Instant::from_millis(0));
        assert!(matches!(inner.events.pop(), Some(Event::Received(_))));
    }

    #[test]
    fn test_unconfigure_aborts_and_posts_state() {
        let mut inner = configured();
        unwrap!(inner.submit(
            Message::new(frame(&[0x40, 0x36])),
            Completion::Detached(None),
            Instant::from_millis(0)
        ));
        assert!(inner.unconfigure(Instant::from_millis(1)));

        let events = drain(&mut inner);
        assert!(matches!(events[0], Event::Transmitted { message, .. } if message.tx.status.contains(TxStatus::ABORTED)));
        assert!(matches!(events[1], Event::StateChange(state) if !state.configured && state.logical_addresses.is_empty()));

        // Nothing to release a second time
        assert!(!inner.unconfigure(Instant::from_millis(2)));
        assert!(inner.events.pop().is_none());
    }

    #[test]
    fn test_interrupt_ignores_current_physical_address() {
        let (waker, _) = new_count_waker();
        let mut cx = Context::from_waker(&waker);
        let mut inner = configured();
        let current = inner.state.physical_address;

        inner.control.post(ControlRequest::PhysicalAddress(current));
        assert!(inner.poll_interrupt(&mut cx).is_pending());
        assert_eq!(inner.control.poll_result(&mut cx), Poll::Ready(Ok(())));

        inner.control.post(ControlRequest::PhysicalAddress(PhysicalAddress::INVALID));
        assert_eq!(
            inner.poll_interrupt(&mut cx),
            Poll::Ready(ControlRequest::PhysicalAddress(PhysicalAddress::INVALID))
        );
    }

    #[test]
    fn test_mailbox() {
        let (waker, count) = new_count_waker();
        let mut cx = Context::from_waker(&waker);
        let mut mailbox = ControlMailbox::new();

        mailbox.post(ControlRequest::MonitorAll(true));
        assert!(mailbox.poll_request(&mut cx, true).is_pending());
        assert_eq!(
            mailbox.poll_request(&mut cx, false),
            Poll::Ready(ControlRequest::MonitorAll(true))
        );
        assert!(mailbox.poll_result(&mut cx).is_pending());
        mailbox.complete(Ok(()));
        assert_eq!(count.get(), 1);
        assert_eq!(mailbox.poll_result(&mut cx), Poll::Ready(Ok(())));
        assert!(mailbox.is_idle());

        // An abandoned running request leaves the mailbox idle on completion
        mailbox.post(ControlRequest::PhysicalAddress(PhysicalAddress::INVALID));
        assert!(mailbox.poll_request(&mut cx, true).is_ready());
        mailbox.abandon();
        assert!(mailbox.poll_idle(&mut cx).is_pending());
        mailbox.complete(Err(ControlError::NotConfigured));
        assert!(mailbox.poll_idle(&mut cx).is_ready());
    }
}
