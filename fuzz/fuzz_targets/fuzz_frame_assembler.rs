#![no_main]

use std::time::{Duration, Instant};

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use voltage_rtu_slave::{FrameAssembler, FrameTiming};

#[derive(Debug, Arbitrary)]
struct Arrival {
    gap_us: u16,
    bytes: Vec<u8>,
}

fuzz_target!(|arrivals: Vec<Arrival>| {
    let mut assembler = FrameAssembler::new(FrameTiming::default());
    let mut now = Instant::now();

    for arrival in arrivals {
        now += Duration::from_micros(arrival.gap_us as u64);
        let frame = assembler
            .push(&arrival.bytes, now)
            .or_else(|| assembler.poll(now));
        if let Some(frame) = frame {
            assert!((4..=256).contains(&frame.len()));
        }
        assert!(assembler.pending_len() <= 256);
    }
});
