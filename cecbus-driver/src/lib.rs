//! cecbus driver interface
//!
//! The crate provides an interface between a CEC adapter driver and the cecbus engine.
//! Limited scope facilitates compatibility across versions.
//! Driver crates should depend on this crate. cecbus users should depend on
//! the `cecbus` crate instead.
//!
//! The interface has two directions:
//! * `Adapter` is implemented by the driver and called by the engine runner to enable the
//!   hardware, program the claimed logical address and start a transmission.
//! * `Link` is handed to the driver and reports transmit outcomes and received frames back.
//!
//! The engine never keeps more than one transmission in flight. Every accepted
//! `Adapter::transmit` call must be followed by exactly one `Link::transmit_done`
//! (or `Link::transmit_attempt_done`) report. `Link` methods never block, so a driver may call
//! them from an interrupt handler.
//!
//! The driver performs retries itself if it can, up to the attempt count given with
//! the transmission. Drivers that cannot retry report every attempt individually; the engine then
//! reschedules the frame.

#![no_std]

pub mod adapter;
pub mod frame;
pub mod internal;
pub mod link;
pub mod status;

pub mod time {
    pub use embassy_time::{Duration, Instant};
}
