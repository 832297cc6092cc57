//! Transmit state machine
//!
//! Requests live in a fixed pool of slots. A slot is linked into the pending queue or the
//! reply-wait set, occupies the in-flight position, or is terminal. The scheduler never blocks
//! and never calls the adapter: the runner takes a [`TransmitJob`] from it, calls the adapter
//! with the node state unlocked and reports the outcome back.
//!
//! Every operation takes the current time, so timing behaviour is deterministic.

use core::task::{Context, Poll};
use embassy_sync::waitqueue::WakerRegistration;

use crate::correlator::{self, Reply};
use crate::driver::adapter::SignalFreeTime;
use crate::driver::frame::Frame;
use crate::driver::status::{AttemptCounters, TxStatus};
use crate::events::{Event, EventQueue, OwnerId};
use crate::message::{Message, MessageFlags, RxReport, RxStatus};
use crate::policy::{self, TRANSMIT_WATCHDOG};
use crate::state::AdapterState;
use crate::time::Instant;
use crate::TransmitError;

mod lists;

use lists::{List, SlotLists};

/// Capacity of the pending queue
pub const TX_QUEUE_CAPACITY: usize = 18;

/// Number of requests that may wait for a reply or hold a completion for a blocking caller
///
/// Counted from submission until the slot is freed, independently of the pending queue.
pub const WAIT_CAPACITY: usize = 16;

/// Number of requests tracked at once: a full pending queue, the transmission in flight and
/// the reserved requests
pub(crate) const REQUEST_SLOT_COUNT: usize = TX_QUEUE_CAPACITY + 1 + WAIT_CAPACITY;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum TxState {
    Idle,
    /// The adapter owns a transmission. `slot` is cleared if the request was cancelled while
    /// the adapter still works on it.
    Transmitting {
        slot: Option<u8>,
        since: Instant,
    },
    /// Stopped for good
    Draining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Location {
    Pending,
    InFlight,
    Waiting,
    Done,
}

/// Completion route of a request
pub(crate) enum Completion {
    /// Reported as [`Event::Transmitted`]
    Detached(Option<OwnerId>),
    /// Collected by a parked caller with [`Scheduler::poll_completion`]
    Blocking {
        waker: WakerRegistration,
        done: bool,
    },
}

impl Completion {
    pub const fn blocking() -> Self {
        Self::Blocking {
            waker: WakerRegistration::new(),
            done: false,
        }
    }

    /// True if the request may outlive its transmission
    pub fn reserves(&self, message: &Message) -> bool {
        message.timeout.is_some() || matches!(self, Completion::Blocking { .. })
    }
}

struct Request {
    message: Message,
    /// Counted against [`WAIT_CAPACITY`]
    reserved: bool,
    /// Remaining attempts, zero until the first transmission
    attempts: u8,
    location: Location,
    completion: Completion,
    reply_deadline: Option<Instant>,
}

/// Handle of a blocking request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Ticket {
    slot: u8,
    sequence: u32,
}

impl Ticket {
    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

/// A transmission handed to the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TransmitJob {
    pub slot: u8,
    pub sequence: u32,
    pub attempts: u8,
    pub signal_free_time: SignalFreeTime,
    pub frame: Frame,
}

pub(crate) struct Scheduler {
    requests: [Option<Request>; REQUEST_SLOT_COUNT],
    lists: SlotLists,
    /// Tracked separately from the pending list, both must agree
    pending_len: usize,
    reserved_len: usize,
    state: TxState,
    worker: WakerRegistration,
    tx_timeouts: u32,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            requests: [const { None }; REQUEST_SLOT_COUNT],
            lists: SlotLists::new(),
            pending_len: 0,
            reserved_len: 0,
            state: TxState::Idle,
            worker: WakerRegistration::new(),
            tx_timeouts: 0,
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending_len
    }

    pub fn waiting_len(&self) -> usize {
        self.lists.len(List::Waiting)
    }

    pub fn is_transmitting(&self) -> bool {
        matches!(self.state, TxState::Transmitting { slot: Some(_), .. })
    }

    pub fn is_stopped(&self) -> bool {
        self.state == TxState::Draining
    }

    /// Number of transmissions abandoned by the watchdog
    pub fn tx_timeouts(&self) -> u32 {
        self.tx_timeouts
    }

    /// Checks room for a new request, `reserve` as given by [`Completion::reserves`]
    pub fn check_capacity(&self, reserve: bool) -> Result<(), TransmitError> {
        if self.pending_len >= TX_QUEUE_CAPACITY {
            return Err(TransmitError::QueueFull);
        }
        if reserve && self.reserved_len >= WAIT_CAPACITY {
            return Err(TransmitError::WaitSetFull);
        }
        Ok(())
    }

    pub fn register_worker(&mut self, cx: &mut Context<'_>) {
        self.worker.register(cx.waker());
    }

    /// Appends an admitted message to the pending queue.
    ///
    /// The message must carry its sequence number. Nothing changes if the queue is full.
    pub fn enqueue(
        &mut self,
        message: Message,
        completion: Completion,
    ) -> Result<Ticket, TransmitError> {
        if self.state == TxState::Draining {
            return Err(TransmitError::Stopped);
        }
        let reserved = completion.reserves(&message);
        self.check_capacity(reserved)?;
        let slot = unwrap!(self.lists.front(List::Free));
        if reserved {
            self.reserved_len += 1;
        }
        self.requests[usize::from(slot)] = Some(Request {
            message,
            reserved,
            attempts: 0,
            location: Location::Pending,
            completion,
            reply_deadline: None,
        });
        self.lists.push_back(List::Pending, slot);
        self.pending_len += 1;
        self.worker.wake();
        Ok(Ticket {
            slot,
            sequence: message.sequence,
        })
    }

    /// Moves the head of the pending queue in flight if the adapter is free
    pub fn start_next(&mut self, state: &mut AdapterState, now: Instant) -> Option<TransmitJob> {
        if self.state != TxState::Idle {
            return None;
        }
        let slot = self.lists.front(List::Pending)?;
        self.lists.unlink(slot);
        self.pending_len -= 1;

        let request = unwrap!(self.requests[usize::from(slot)].as_mut());
        let frame = request.message.frame;
        let retry = request.attempts != 0;
        if !retry {
            request.attempts = policy::attempts(&frame, state.configured);
        }
        let signal_free_time =
            policy::signal_free_time(retry, frame.initiator(), &mut state.last_initiator);
        request.location = Location::InFlight;
        self.state = TxState::Transmitting {
            slot: Some(slot),
            since: now,
        };

        debug!("transmit {:?}, attempts {}", frame, request.attempts);
        Some(TransmitJob {
            slot,
            sequence: request.message.sequence,
            attempts: request.attempts,
            signal_free_time,
            frame,
        })
    }

    /// The adapter refused `job` synchronously
    pub fn transmit_rejected(&mut self, job: &TransmitJob, now: Instant, events: &mut EventQueue) {
        let TxState::Transmitting { slot, .. } = self.state else {
            return;
        };
        if slot == Some(job.slot) {
            self.cancel(job.slot, TxStatus::ABORTED, now, events);
        }
        self.state = TxState::Idle;
        self.worker.wake();
    }

    /// Applies the adapter report on the transmission in flight
    pub fn transmit_done(
        &mut self,
        state: &AdapterState,
        status: TxStatus,
        counters: AttemptCounters,
        timestamp: Instant,
        events: &mut EventQueue,
    ) {
        let TxState::Transmitting { slot, .. } = self.state else {
            debug!("transmit done without a transmission in progress");
            return;
        };
        self.state = TxState::Idle;
        self.worker.wake();
        // Cancelled while the adapter was busy
        let Some(slot) = slot else {
            return;
        };

        let request = unwrap!(self.requests[usize::from(slot)].as_mut());
        let message = &mut request.message;
        message.tx.status |= status;
        message.tx.counters.accumulate(&counters);
        message.tx.timestamp = Some(timestamp);

        let made = policy::attempts_made(&counters);
        if request.attempts > made && !status.intersects(TxStatus::MAX_RETRIES | TxStatus::OK) {
            request.attempts -= made;
            trace!(
                "retry {:?}, {} attempts left",
                message.frame,
                request.attempts
            );
            request.location = Location::Pending;
            self.lists.push_front(List::Pending, slot);
            self.pending_len += 1;
            return;
        }

        request.attempts = 0;
        if !status.contains(TxStatus::OK) {
            message.tx.status |= TxStatus::MAX_RETRIES;
        }
        match message.timeout {
            Some(timeout) if status.contains(TxStatus::OK) && state.configured => {
                request.location = Location::Waiting;
                request.reply_deadline = Some(timestamp + timeout);
                self.lists.push_back(List::Waiting, slot);
            }
            _ => self.finalize(slot, events),
        }
    }

    /// Terminates a request wherever it is. Terminal requests are left alone.
    ///
    /// A request that was transmitted gets its reply wait aborted. Otherwise `status` is added
    /// to the transmit status along with `MAX_RETRIES`.
    fn cancel(&mut self, slot: u8, status: TxStatus, now: Instant, events: &mut EventQueue) {
        let request = unwrap!(self.requests[usize::from(slot)].as_mut());
        match request.location {
            Location::Pending => {
                self.lists.unlink(slot);
                self.pending_len -= 1;
            }
            Location::Waiting => self.lists.unlink(slot),
            Location::InFlight => {
                if let TxState::Transmitting { slot: current, .. } = &mut self.state {
                    *current = None;
                }
            }
            Location::Done => return,
        }

        let message = &mut request.message;
        if message.tx.status.contains(TxStatus::OK) {
            message.rx = RxReport {
                status: RxStatus::ABORTED,
                timestamp: Some(now),
            };
        } else {
            message.tx.status |= status | TxStatus::MAX_RETRIES;
            message.tx.counters.error = message.tx.counters.error.saturating_add(1);
            message.tx.timestamp = Some(now);
            request.attempts = 0;
        }
        self.finalize(slot, events);
    }

    fn finalize(&mut self, slot: u8, events: &mut EventQueue) {
        self.lists.unlink(slot);
        let index = usize::from(slot);
        let request = unwrap!(self.requests[index].as_mut());
        request.location = Location::Done;
        request.reply_deadline = None;
        if let Completion::Blocking { waker, done } = &mut request.completion {
            *done = true;
            waker.wake();
            return;
        }

        let request = self.free(slot);
        if let Completion::Detached(owner) = request.completion {
            events.push(Event::Transmitted {
                owner,
                message: request.message,
            });
        }
    }

    fn free(&mut self, slot: u8) -> Request {
        let request = unwrap!(self.requests[usize::from(slot)].take());
        if request.reserved {
            self.reserved_len -= 1;
        }
        self.lists.push_back(List::Free, slot);
        request
    }


    /// Aborts all pending, in-flight and waiting requests, in this order
    pub fn flush(&mut self, now: Instant, events: &mut EventQueue) {
        while let Some(slot) = self.lists.front(List::Pending) {
            self.cancel(slot, TxStatus::ABORTED, now, events);
        }
        if let TxState::Transmitting {
            slot: Some(slot), ..
        } = self.state
        {
            self.cancel(slot, TxStatus::ABORTED, now, events);
        }
        while let Some(slot) = self.lists.front(List::Waiting) {
            self.cancel(slot, TxStatus::ABORTED, now, events);
        }

        if self.pending_len != 0 {
            warn!("pending queue depth {} after flush", self.pending_len);
            self.pending_len = 0;
        }
    }

    /// Flushes and stops accepting requests
    pub fn shutdown(&mut self, now: Instant, events: &mut EventQueue) {
        self.flush(now, events);
        self.state = TxState::Draining;
        self.worker.wake();
    }

    /// The adapter was disabled and dropped its transmission without a report
    pub fn reset_transmitting(&mut self) {
        if let TxState::Transmitting { .. } = self.state {
            self.state = TxState::Idle;
            self.worker.wake();
        }
    }

    /// Handles the transmit watchdog and elapsed reply deadlines
    pub fn expire(&mut self, now: Instant, events: &mut EventQueue) {
        if let TxState::Transmitting { slot, since } = self.state {
            if now >= since + TRANSMIT_WATCHDOG {
                if let Some(slot) = slot {
                    let request = unwrap!(self.requests[usize::from(slot)].as_ref());
                    warn!("message {:?} timed out", request.message.frame);
                    self.cancel(slot, TxStatus::TIMEOUT, now, events);
                }
                self.tx_timeouts = self.tx_timeouts.wrapping_add(1);
                self.state = TxState::Idle;
                self.worker.wake();
            }
        }

        let mut cursor = self.lists.front(List::Waiting);
        while let Some(slot) = cursor {
            cursor = self.lists.next(slot);
            let request = unwrap!(self.requests[usize::from(slot)].as_mut());
            if request.reply_deadline.is_some_and(|deadline| deadline <= now) {
                request.message.rx = RxReport {
                    status: RxStatus::TIMEOUT,
                    timestamp: Some(now),
                };
                self.finalize(slot, events);
            }
        }
    }

    /// Earliest instant at which [`Self::expire`] has work, `Instant::MAX` if none
    pub fn next_deadline(&self) -> Instant {
        let watchdog = match self.state {
            TxState::Transmitting { since, .. } => since + TRANSMIT_WATCHDOG,
            _ => Instant::MAX,
        };
        self.lists
            .iter(List::Waiting)
            .filter_map(|slot| self.requests[usize::from(slot)].as_ref()?.reply_deadline)
            .fold(watchdog, Instant::min)
    }

    /// Completes the first waiting request answered by `frame`.
    ///
    /// Returns `None` if no request matched. Otherwise returns whether listeners should see the
    /// reply as well: if the request asked for it or nobody waits for the completion.
    pub fn complete_reply(
        &mut self,
        frame: &Frame,
        timestamp: Instant,
        events: &mut EventQueue,
    ) -> Option<bool> {
        let reply = Reply::parse(frame)?;
        let mut cursor = self.lists.front(List::Waiting);
        while let Some(slot) = cursor {
            cursor = self.lists.next(slot);
            let request = unwrap!(self.requests[usize::from(slot)].as_mut());
            if !correlator::matches(&mut request.message, &reply) {
                continue;
            }

            let message = &mut request.message;
            message.frame = *frame;
            message.rx = RxReport {
                status: if reply.abort {
                    RxStatus::OK | RxStatus::FEATURE_ABORT
                } else {
                    RxStatus::OK
                },
                timestamp: Some(timestamp),
            };
            let awaited = !matches!(request.completion, Completion::Detached(None));
            let forward = !awaited || message.flags.contains(MessageFlags::REPLY_TO_FOLLOWERS);
            self.finalize(slot, events);
            return Some(forward);
        }
        None
    }

    fn owns(&self, ticket: Ticket) -> bool {
        self.requests[usize::from(ticket.slot)]
            .as_ref()
            .is_some_and(|request| request.message.sequence == ticket.sequence)
    }

    /// Returns the final message of a blocking request and frees its slot
    pub fn poll_completion(&mut self, cx: &mut Context<'_>, ticket: Ticket) -> Poll<Message> {
        assert!(self.owns(ticket));
        let request = unwrap!(self.requests[usize::from(ticket.slot)].as_mut());
        match &mut request.completion {
            Completion::Blocking { waker, done: false } => {
                waker.register(cx.waker());
                return Poll::Pending;
            }
            Completion::Blocking { done: true, .. } => {}
            Completion::Detached(_) => unreachable!(),
        }
        let message = request.message;
        self.free(ticket.slot);
        Poll::Ready(message)
    }

    /// The caller of a blocking request stopped waiting. The request is aborted if not terminal.
    pub fn abandon(&mut self, ticket: Ticket, now: Instant, events: &mut EventQueue) {
        if !self.owns(ticket) {
            return;
        }
        self.cancel(ticket.slot, TxStatus::ABORTED, now, events);
        self.free(ticket.slot);
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        assert_eq!(self.pending_len, self.lists.len(List::Pending));
        let reserved = self.requests.iter().flatten().filter(|r| r.reserved).count();
        assert_eq!(self.reserved_len, reserved);
        let mut in_flight = 0;
        for (index, request) in self.requests.iter().enumerate() {
            let slot = index as u8;
            let Some(request) = request else {
                assert!(self.lists.iter(List::Free).any(|free| free == slot));
                continue;
            };
            match request.location {
                Location::Pending => {
                    assert!(self.lists.iter(List::Pending).any(|s| s == slot))
                }
                Location::Waiting => {
                    assert!(self.lists.iter(List::Waiting).any(|s| s == slot))
                }
                Location::InFlight => {
                    in_flight += 1;
                    assert!(!self.lists.is_linked(slot));
                    assert!(matches!(
                        self.state,
                        TxState::Transmitting { slot: Some(s), .. } if s == slot
                    ));
                }
                Location::Done => assert!(!self.lists.is_linked(slot)),
            }
        }
        assert!(in_flight <= 1);
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::core::{LogicalAddress, Opcode};
    use crate::time::Duration;
    use futures_test::task::new_count_waker;
    use std::vec::Vec;

    struct Fixture {
        scheduler: Scheduler,
        state: AdapterState,
        events: EventQueue,
    }

    impl Fixture {
        fn new() -> Self {
            let mut state = AdapterState::new(false);
            state.record_claim(0, LogicalAddress::PLAYBACK_1);
            state.configured = true;
            Self {
                scheduler: Scheduler::new(),
                state,
                events: EventQueue::new(),
            }
        }

        fn submit(&mut self, message: Message, completion: Completion) -> Ticket {
            let mut message = message;
            message.sequence = self.state.next_sequence();
            let ticket = unwrap!(self.scheduler.enqueue(message, completion));
            self.scheduler.check_invariants();
            ticket
        }

        fn start(&mut self, millis: u64) -> TransmitJob {
            let job = unwrap!(
                self.scheduler
                    .start_next(&mut self.state, Instant::from_millis(millis))
            );
            self.scheduler.check_invariants();
            job
        }

        fn done(&mut self, status: TxStatus, millis: u64) {
            self.scheduler.transmit_done(
                &self.state,
                status,
                AttemptCounters::from_status(status),
                Instant::from_millis(millis),
                &mut self.events,
            );
            self.scheduler.check_invariants();
        }

        fn transmitted(&mut self) -> Vec<Message> {
            let mut messages = Vec::new();
            while let Some(event) = self.events.pop() {
                if let Event::Transmitted { message, .. } = event {
                    messages.push(message);
                }
            }
            messages
        }
    }

    fn message(bytes: &[u8]) -> Message {
        Message::new(unwrap!(Frame::new(bytes)))
    }

    fn request(bytes: &[u8], reply: Opcode) -> Message {
        message(bytes).with_reply(reply, Some(Duration::from_millis(1000)))
    }

    #[test]
    fn test_retry_resumes_at_head() {
        let mut fixture = Fixture::new();
        let first = fixture.submit(message(&[0x40, 0x36]), Completion::Detached(None));
        fixture.submit(message(&[0x40, 0x04]), Completion::Detached(None));

        let job = fixture.start(0);
        assert_eq!(job.sequence, first.sequence());
        assert_eq!(job.attempts, 4);
        assert_eq!(job.signal_free_time, SignalFreeTime::NewInitiator);
        assert_eq!(fixture.scheduler.pending_len(), 1);

        fixture.done(TxStatus::NACK, 30);
        assert_eq!(fixture.scheduler.pending_len(), 2);
        assert!(fixture.transmitted().is_empty());

        let retry = fixture.start(40);
        assert_eq!(retry.sequence, first.sequence());
        assert_eq!(retry.attempts, 3);
        assert_eq!(retry.signal_free_time, SignalFreeTime::Retry);
    }

    #[test]
    fn test_hardware_max_retries_finalizes() {
        let mut fixture = Fixture::new();
        fixture.submit(message(&[0x40, 0x36]), Completion::Detached(Some(OwnerId(7))));
        fixture.start(0);
        fixture.done(TxStatus::NACK | TxStatus::MAX_RETRIES, 30);

        assert_eq!(fixture.scheduler.pending_len(), 0);
        match fixture.events.pop() {
            Some(Event::Transmitted { owner, message }) => {
                assert_eq!(owner, Some(OwnerId(7)));
                assert!(message.tx.status.contains(TxStatus::NACK | TxStatus::MAX_RETRIES));
                assert_eq!(message.tx.timestamp, Some(Instant::from_millis(30)));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_attempts_exhausted() {
        let mut fixture = Fixture::new();
        fixture.submit(message(&[0x40, 0x36]), Completion::Detached(None));
        for i in 0..4 {
            fixture.start(i * 100);
            fixture.done(TxStatus::ARB_LOST, i * 100 + 50);
        }

        let messages = fixture.transmitted();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].tx.counters.arb_lost, 4);
        assert!(messages[0].tx.status.contains(TxStatus::MAX_RETRIES));
        assert_eq!(fixture.scheduler.start_next(&mut fixture.state, Instant::from_millis(500)), None);
    }

    #[test]
    fn test_watchdog() {
        let mut fixture = Fixture::new();
        fixture.submit(message(&[0x40, 0x36]), Completion::Detached(None));
        fixture.start(0);
        assert_eq!(fixture.scheduler.next_deadline(), Instant::from_millis(2100));

        fixture.scheduler.expire(Instant::from_millis(2099), &mut fixture.events);
        assert!(fixture.scheduler.is_transmitting());

        fixture.scheduler.expire(Instant::from_millis(2100), &mut fixture.events);
        fixture.scheduler.check_invariants();
        assert!(!fixture.scheduler.is_transmitting());
        assert_eq!(fixture.scheduler.tx_timeouts(), 1);
        assert_eq!(fixture.scheduler.next_deadline(), Instant::MAX);

        let messages = fixture.transmitted();
        assert!(messages[0].tx.status.contains(TxStatus::TIMEOUT | TxStatus::MAX_RETRIES));
        assert_eq!(messages[0].tx.counters.error, 1);

        // A late report is ignored
        fixture.done(TxStatus::OK, 2500);
        assert!(fixture.transmitted().is_empty());
    }

    #[test]
    fn test_reply_timeout() {
        let mut fixture = Fixture::new();
        fixture.submit(
            request(&[0x40, 0x8f], Opcode::REPORT_POWER_STATUS),
            Completion::Detached(None),
        );
        fixture.start(0);
        fixture.done(TxStatus::OK, 10);
        assert_eq!(fixture.scheduler.waiting_len(), 1);
        assert_eq!(fixture.scheduler.next_deadline(), Instant::from_millis(1010));

        fixture.scheduler.expire(Instant::from_millis(1009), &mut fixture.events);
        assert_eq!(fixture.scheduler.waiting_len(), 1);

        fixture.scheduler.expire(Instant::from_millis(1010), &mut fixture.events);
        fixture.scheduler.check_invariants();
        assert_eq!(fixture.scheduler.waiting_len(), 0);
        let messages = fixture.transmitted();
        assert_eq!(messages[0].rx.status, RxStatus::TIMEOUT);
        assert!(!messages[0].is_ok());
    }

    #[test]
    fn test_reply_round_trip() {
        let mut fixture = Fixture::new();
        fixture.submit(
            request(&[0x40, 0x8f], Opcode::REPORT_POWER_STATUS),
            Completion::Detached(Some(OwnerId(1))),
        );
        fixture.start(0);
        fixture.done(TxStatus::OK, 10);

        let unrelated = unwrap!(Frame::new(&[0x54, 0x90, 0x00]));
        let events = &mut fixture.events;
        assert_eq!(
            fixture
                .scheduler
                .complete_reply(&unrelated, Instant::from_millis(20), events),
            None
        );

        let reply = unwrap!(Frame::new(&[0x04, 0x90, 0x01]));
        assert_eq!(
            fixture
                .scheduler
                .complete_reply(&reply, Instant::from_millis(30), events),
            Some(false)
        );
        fixture.scheduler.check_invariants();
        assert_eq!(fixture.scheduler.waiting_len(), 0);

        let messages = fixture.transmitted();
        assert_eq!(messages[0].frame, reply);
        assert_eq!(messages[0].rx.status, RxStatus::OK);
        assert_eq!(messages[0].rx.timestamp, Some(Instant::from_millis(30)));
        assert!(messages[0].is_ok());
    }

    #[test]
    fn test_feature_abort_reply() {
        let mut fixture = Fixture::new();
        fixture.submit(
            request(&[0x40, 0x46], Opcode::SET_OSD_NAME),
            Completion::Detached(None),
        );
        fixture.start(0);
        fixture.done(TxStatus::OK, 10);

        let abort = unwrap!(Frame::new(&[0x04, 0x00, 0x46, 0x00]));
        let events = &mut fixture.events;
        // Nobody waits for an unowned request, listeners get the reply
        assert_eq!(
            fixture
                .scheduler
                .complete_reply(&abort, Instant::from_millis(20), events),
            Some(true)
        );
        let messages = fixture.transmitted();
        assert_eq!(messages[0].rx.status, RxStatus::OK | RxStatus::FEATURE_ABORT);
    }

    #[test]
    fn test_unconfigured_ok_does_not_wait() {
        let mut fixture = Fixture::new();
        fixture.state.configured = false;
        fixture.submit(
            request(&[0x40, 0x8f], Opcode::REPORT_POWER_STATUS),
            Completion::Detached(None),
        );
        fixture.start(0);
        fixture.done(TxStatus::OK, 10);
        assert_eq!(fixture.scheduler.waiting_len(), 0);
        assert_eq!(fixture.transmitted().len(), 1);
    }

    #[test]
    fn test_flush_aborts_everything_and_is_idempotent() {
        let mut fixture = Fixture::new();
        fixture.submit(
            request(&[0x40, 0x8f], Opcode::REPORT_POWER_STATUS),
            Completion::Detached(None),
        );
        fixture.start(0);
        fixture.done(TxStatus::OK, 10);
        fixture.submit(message(&[0x40, 0x36]), Completion::Detached(None));
        fixture.start(20);
        fixture.submit(message(&[0x40, 0x04]), Completion::Detached(None));

        fixture.scheduler.flush(Instant::from_millis(30), &mut fixture.events);
        fixture.scheduler.check_invariants();
        let messages = fixture.transmitted();
        assert_eq!(messages.len(), 3);
        // Pending first, then in flight, then waiting
        assert_eq!(messages[0].frame.opcode(), Some(Opcode::IMAGE_VIEW_ON));
        assert!(messages[0].tx.status.contains(TxStatus::ABORTED));
        assert_eq!(messages[1].frame.opcode(), Some(Opcode::STANDBY));
        assert!(messages[1].tx.status.contains(TxStatus::ABORTED));
        assert_eq!(messages[2].rx.status, RxStatus::ABORTED);
        assert!(!messages[2].tx.status.contains(TxStatus::ABORTED));

        for _ in 0..2 {
            assert_eq!(fixture.scheduler.pending_len(), 0);
            assert_eq!(fixture.scheduler.waiting_len(), 0);
            assert!(!fixture.scheduler.is_transmitting());
            fixture.scheduler.flush(Instant::from_millis(40), &mut fixture.events);
            fixture.scheduler.check_invariants();
            assert!(fixture.transmitted().is_empty());
        }

        // The adapter is still busy with the cancelled frame
        assert_eq!(fixture.scheduler.start_next(&mut fixture.state, Instant::from_millis(50)), None);
        fixture.done(TxStatus::OK, 60);
        assert!(fixture.transmitted().is_empty());
    }

    #[test]
    fn test_queue_full() {
        let mut fixture = Fixture::new();
        for _ in 0..TX_QUEUE_CAPACITY {
            fixture.submit(message(&[0x4f, 0x85]), Completion::Detached(None));
        }
        assert_eq!(
            fixture.scheduler.check_capacity(false),
            Err(TransmitError::QueueFull)
        );
        assert_eq!(
            fixture
                .scheduler
                .enqueue(message(&[0x4f, 0x85]), Completion::Detached(None)),
            Err(TransmitError::QueueFull)
        );
        fixture.scheduler.check_invariants();
        assert_eq!(fixture.scheduler.pending_len(), TX_QUEUE_CAPACITY);
    }

    #[test]
    fn test_waiting_requests_keep_queue_capacity() {
        let mut fixture = Fixture::new();
        for i in 0..WAIT_CAPACITY as u64 {
            fixture.submit(
                request(&[0x40, 0x8f], Opcode::REPORT_POWER_STATUS),
                Completion::Detached(None),
            );
            fixture.start(i * 10);
            fixture.done(TxStatus::OK, i * 10 + 5);
        }
        assert_eq!(fixture.scheduler.waiting_len(), WAIT_CAPACITY);
        assert_eq!(
            fixture.scheduler.enqueue(
                request(&[0x40, 0x8f], Opcode::REPORT_POWER_STATUS),
                Completion::Detached(None)
            ),
            Err(TransmitError::WaitSetFull)
        );
        assert_eq!(
            fixture
                .scheduler
                .enqueue(message(&[0x40, 0x36]), Completion::blocking()),
            Err(TransmitError::WaitSetFull)
        );

        for _ in 0..TX_QUEUE_CAPACITY {
            fixture.submit(message(&[0x4f, 0x85]), Completion::Detached(None));
        }
        fixture.start(500);
        fixture.submit(message(&[0x4f, 0x85]), Completion::Detached(None));
        assert_eq!(fixture.scheduler.pending_len(), TX_QUEUE_CAPACITY);
        assert_eq!(
            fixture
                .scheduler
                .enqueue(message(&[0x4f, 0x85]), Completion::Detached(None)),
            Err(TransmitError::QueueFull)
        );

        // A reply frees its reservation
        let reply = unwrap!(Frame::new(&[0x04, 0x90, 0x00]));
        let events = &mut fixture.events;
        fixture
            .scheduler
            .complete_reply(&reply, Instant::from_millis(600), events);
        assert_eq!(fixture.scheduler.check_capacity(true), Err(TransmitError::QueueFull));
        fixture.done(TxStatus::OK, 610);
        fixture.start(620);
        assert_eq!(fixture.scheduler.check_capacity(true), Ok(()));
        fixture.scheduler.check_invariants();
    }

    #[test]
    fn test_blocking_completion() {
        let mut fixture = Fixture::new();
        let ticket = fixture.submit(message(&[0x40, 0x36]), Completion::blocking());
        let (waker, count) = new_count_waker();
        let mut cx = Context::from_waker(&waker);

        assert!(fixture.scheduler.poll_completion(&mut cx, ticket).is_pending());
        fixture.start(0);
        fixture.done(TxStatus::OK, 10);
        assert_eq!(count.get(), 1);
        assert!(fixture.transmitted().is_empty());

        match fixture.scheduler.poll_completion(&mut cx, ticket) {
            Poll::Ready(message) => assert!(message.is_ok()),
            Poll::Pending => panic!("completion not ready"),
        }
        fixture.scheduler.check_invariants();
        assert_eq!(fixture.scheduler.lists.len(List::Free), REQUEST_SLOT_COUNT);
    }

    #[test]
    fn test_abandon_in_flight() {
        let mut fixture = Fixture::new();
        let ticket = fixture.submit(message(&[0x40, 0x36]), Completion::blocking());
        fixture.start(0);

        fixture
            .scheduler
            .abandon(ticket, Instant::from_millis(5), &mut fixture.events);
        fixture.scheduler.check_invariants();
        assert!(!fixture.scheduler.is_transmitting());
        assert_eq!(fixture.scheduler.lists.len(List::Free), REQUEST_SLOT_COUNT);

        fixture.done(TxStatus::OK, 10);
        assert!(fixture.transmitted().is_empty());
        assert!(
            fixture
                .scheduler
                .start_next(&mut fixture.state, Instant::from_millis(20))
                .is_none()
        );
    }

    #[test]
    fn test_shutdown_rejects() {
        let mut fixture = Fixture::new();
        fixture.submit(message(&[0x40, 0x36]), Completion::Detached(None));
        fixture.scheduler.shutdown(Instant::from_millis(0), &mut fixture.events);
        assert!(fixture.scheduler.is_stopped());
        assert_eq!(fixture.transmitted().len(), 1);
        assert_eq!(
            fixture
                .scheduler
                .enqueue(message(&[0x40, 0x36]), Completion::Detached(None)),
            Err(TransmitError::Stopped)
        );
    }
}
