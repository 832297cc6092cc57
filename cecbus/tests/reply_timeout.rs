//! Advances the global mock clock, so it needs a test binary of its own.

mod common;

use cecbus::core::Opcode;
use cecbus::driver::status::TxStatus;
use cecbus::events::{Event, OwnerId};
use cecbus::message::{Message, RxStatus};
use cecbus::node::Config;
use cecbus::policy::TRANSMIT_WATCHDOG;
use common::{Fixture, frame};
use embassy_time::{Duration, MockDriver};
use std::cell::RefCell;
use std::rc::Rc;

#[test]
fn test_deadlines() {
    let time = MockDriver::get();
    let mut fixture = Fixture::new(Config::default());
    fixture.configure_playback();
    let bus = fixture.bus;

    // Reply deadline
    let request = Message::new(frame(&[0x40, 0x8f]))
        .with_reply(Opcode::REPORT_POWER_STATUS, Some(Duration::from_millis(500)));
    let result = Rc::new(RefCell::new(None));
    let done = result.clone();
    fixture.spawn(async move {
        *done.borrow_mut() = Some(bus.transmit(request).await);
    });
    fixture.answer(TxStatus::OK);

    time.advance(Duration::from_millis(499));
    fixture.stall();
    assert!(result.borrow().is_none());
    time.advance(Duration::from_millis(1));
    fixture.stall();
    let message = result.borrow_mut().take().unwrap().unwrap();
    assert!(message.tx.status.contains(TxStatus::OK));
    assert_eq!(message.rx.status, RxStatus::TIMEOUT);
    assert!(!message.is_ok());

    // A late reply is an ordinary message
    fixture.receive(&[0x04, 0x90, 0x01]);
    assert!(matches!(
        fixture.drain_events().as_slice(),
        [Event::Received(_)]
    ));

    // Transmit watchdog
    bus.try_transmit(Message::new(frame(&[0x40, 0x36])), Some(OwnerId(1)))
        .unwrap();
    bus.try_transmit(Message::new(frame(&[0x40, 0x04])), Some(OwnerId(2)))
        .unwrap();
    let lost = fixture.next_transmission();
    assert_eq!(lost.frame, frame(&[0x40, 0x36]));

    time.advance(TRANSMIT_WATCHDOG - Duration::from_millis(1));
    fixture.stall();
    assert!(fixture.drain_events().is_empty());
    time.advance(Duration::from_millis(1));
    fixture.stall();
    match fixture.drain_events().as_slice() {
        [Event::Transmitted { owner, message }] => {
            assert_eq!(*owner, Some(OwnerId(1)));
            assert!(message.tx.status.contains(TxStatus::TIMEOUT | TxStatus::MAX_RETRIES));
        }
        other => panic!("unexpected events {:?}", other),
    }

    // The queue moves on
    assert_eq!(fixture.answer(TxStatus::OK), frame(&[0x40, 0x04]));
}
