//! Notifications for listeners of the bus
//!
//! The node keeps a bounded queue of events. When listeners fall behind, the oldest events are
//! dropped and counted.

use core::task::{Context, Poll};
use embassy_sync::waitqueue::WakerRegistration;
use heapless::Deque;

use crate::message::Message;
use crate::state::BusState;

pub const EVENT_QUEUE_CAPACITY: usize = 32;

/// Tag of a non-blocking submission, returned with its completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OwnerId(pub u16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Physical or logical addresses changed
    StateChange(BusState),
    /// A non-blocking submission reached its final state
    Transmitted {
        owner: Option<OwnerId>,
        message: Message,
    },
    /// A message addressed to the adapter or broadcast
    Received(Message),
    /// A message addressed to another device, delivered in monitor-all mode
    Monitored(Message),
}

pub(crate) struct EventQueue {
    events: Deque<Event, EVENT_QUEUE_CAPACITY>,
    lost: u32,
    waker: WakerRegistration,
}

impl EventQueue {
    pub const fn new() -> Self {
        Self {
            events: Deque::new(),
            lost: 0,
            waker: WakerRegistration::new(),
        }
    }

    pub fn push(&mut self, event: Event) {
        if self.events.is_full() {
            self.events.pop_front();
            self.lost = self.lost.saturating_add(1);
        }
        // Cannot fail: a slot was freed above
        let _ = self.events.push_back(event);
        self.waker.wake();
    }

    pub fn pop(&mut self) -> Option<Event> {
        self.events.pop_front()
    }

    pub fn poll_pop(&mut self, cx: &mut Context<'_>) -> Poll<Event> {
        match self.events.pop_front() {
            Some(event) => Poll::Ready(event),
            None => {
                self.waker.register(cx.waker());
                Poll::Pending
            }
        }
    }

    pub fn take_lost(&mut self) -> u32 {
        core::mem::take(&mut self.lost)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }
}
