//! Property checks over the synchronous frame pipeline

mod common;

use common::ScriptedLine;
use proptest::prelude::*;
use voltage_rtu_slave::checksum::append_crc;
use voltage_rtu_slave::{ManualClock, ModbusRtuSlave, RegisterBank};

const SIZE: usize = 5000;

fn slave() -> ModbusRtuSlave<ScriptedLine, ManualClock, RegisterBank> {
    let clock = ManualClock::new();
    ModbusRtuSlave::new(
        Default::default(),
        ScriptedLine::new(clock.clone()),
        clock,
        RegisterBank::new(SIZE),
    )
    .unwrap()
}

fn with_crc(mut body: Vec<u8>) -> Vec<u8> {
    append_crc(&mut body);
    body
}

fn write_multiple(unit: u8, start: u16, values: &[u16]) -> Vec<u8> {
    let mut body = vec![unit, 0x10];
    body.extend_from_slice(&start.to_be_bytes());
    body.extend_from_slice(&(values.len() as u16).to_be_bytes());
    body.push((values.len() * 2) as u8);
    for value in values {
        body.extend_from_slice(&value.to_be_bytes());
    }
    with_crc(body)
}

fn read_holding(unit: u8, start: u16, count: u16) -> Vec<u8> {
    let mut body = vec![unit, 0x03];
    body.extend_from_slice(&start.to_be_bytes());
    body.extend_from_slice(&count.to_be_bytes());
    with_crc(body)
}

proptest! {
    #[test]
    fn prop_write_then_read_round_trip(
        start in 0u16..5000,
        values in proptest::collection::vec(any::<u16>(), 1..=123),
    ) {
        let mut slave = slave();
        let response = slave.process_frame(&write_multiple(1, start, &values)).unwrap();

        if start as usize + values.len() <= SIZE {
            prop_assert_eq!(response[1], 0x10);
            let read = slave
                .process_frame(&read_holding(1, start, values.len() as u16))
                .unwrap();
            prop_assert_eq!(read[2] as usize, values.len() * 2);
            let payload = &read[3..read.len() - 2];
            let decoded: Vec<u16> = payload
                .chunks(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            prop_assert_eq!(decoded, values);
        } else {
            prop_assert_eq!(&response[1..3], &[0x90, 0x02]);
            prop_assert!(slave.store().as_slice().iter().all(|&v| v == 0));
        }
    }

    #[test]
    fn prop_broadcast_never_answered(
        function in prop_oneof![Just(0x03u8), Just(0x04), Just(0x06), Just(0x10), Just(0x2B)],
        payload in proptest::collection::vec(any::<u8>(), 0..20),
    ) {
        let mut slave = slave();
        let mut body = vec![0x00, function];
        body.extend_from_slice(&payload);
        prop_assert!(slave.process_frame(&with_crc(body)).is_none());
    }

    #[test]
    fn prop_arbitrary_bytes_never_panic(raw in proptest::collection::vec(any::<u8>(), 0..300)) {
        let mut slave = slave();
        if let Some(response) = slave.process_frame(&raw) {
            prop_assert!(response.len() <= 256);
            prop_assert_eq!(response[0], 1);
        }
    }

    #[test]
    fn prop_corrupted_frame_is_silent(
        start in 0u16..5000,
        count in 1u16..=125,
        bit in 0usize..64,
    ) {
        let mut slave = slave();
        let mut frame = read_holding(1, start, count);
        frame[bit / 8] ^= 1 << (bit % 8);
        prop_assert!(slave.process_frame(&frame).is_none());
    }
}
