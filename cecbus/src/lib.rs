//! # cecbus
//!
//! This library implements the bus engine of an HDMI-CEC \[1\] adapter in no_std environments:
//! transmit scheduling with retries and timing policy, logical address arbitration,
//! correlation of replies with outstanding requests and distribution of events to listeners.
//! It uses fixed-capacity queues and requires no dynamic memory allocation.
//!
//! The library primarily targets the Embassy async framework.
//!
//! ## Architecture
//!
//! ```text
//!              ┌────────┐   ┌─────────┐
//!              │ Runner ├──►│ Adapter │
//!              └────┬───┘   └─────────┘
//!                   ▼
//! ┌──────┐     ┌────────┐     ┌─────────┐
//! │ Link ├────►│  Node  │◄────┤   Bus   │
//! └──────┘     └──┬───┬─┘     └─────────┘
//!                 │   │       ┌─────────┐
//!                 │   └──────◄┤ Control │
//!                 ▼           └─────────┘
//!            ┌────────┐
//!            │ Events │
//!            └────────┘
//! ```
//! Components:
//! * _Node_ holds the adapter addressing state, the transmit queue with retry bookkeeping,
//!   the set of requests waiting for a reply and the event queue.
//! * _Runner_ is a worker task. It hands transmissions to the adapter one at a time, expires
//!   the transmit watchdog and reply deadlines, applies control requests and runs logical
//!   address arbitration.
//! * _Adapter_ is implemented by the CEC peripheral driver, see [`driver::adapter::Adapter`].
//! * _Link_ is the driver's channel back into the node: transmit outcomes and received frames.
//! * _Bus_ is a shared handle for submitting messages, blocking or not.
//! * _Control_ is a unique handle that sets the physical address, the logical address
//!   configuration and monitor mode.
//! * _Events_ delivers received messages, completions of non-blocking submissions and state
//!   changes.
//!
//! A message lives in exactly one place at a time: the pending queue, the adapter, the reply
//! wait set, or a terminal state. Every message reaches a terminal state exactly once.
//!
//! ## Concurrency model
//!
//! The Node uses a mutex to synchronize Link, Runner and handle accesses. There are two mutex
//! implementation options:
//! * _CriticalSectionRawMutex_ allows the driver to report from an interrupt handler.
//! * _ThreadModeRawMutex_ has no system-wide effects but requires the driver to report from a
//!   thread (non-interrupt) executor.
//!
//! Critical sections are bounded: the pending queue and the reply wait set are fixed-capacity
//! lists. The adapter is never called with the node mutex held.
//!
//! ## Limitations
//!
//! * Low-level pin monitoring and error injection are not supported.
//! * The core protocol responder answers the mandatory requests only; everything else is
//!   left to listeners.
//!
//! # References:
//!
//! * \[1\] High-Definition Multimedia Interface Specification Version 1.4b,
//!   Supplement 1: Consumer Electronics Control (CEC)
#![no_std]

pub use cecbus_core as core;
pub use cecbus_driver as driver;
pub use cecbus_driver::{frame, time};

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

mod admission;
mod claim;
pub mod config;
mod correlator;
pub mod events;
pub mod message;
pub mod node;
pub mod policy;
mod receive;
mod responder;
mod scheduler;
mod state;

pub use admission::TransmitError;
pub use scheduler::{TX_QUEUE_CAPACITY, Ticket, WAIT_CAPACITY};
pub use state::{BusState, MAX_LOGICAL_ADDRESSES};
