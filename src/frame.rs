//! RTU frame delimiting and frame view
//!
//! RTU frames carry no length field. A frame ends when the line stays silent
//! for 3.5 character times (t3.5). A silence longer than 1.5 character times
//! (t1.5) inside a frame means the frame was interrupted and must be thrown
//! away. Above 19200 baud the timeouts are fixed at 750 µs and 1750 µs.
//!
//! ```text
//!  | addr | fc | data ... | crc lo | crc hi |   >= t3.5 silence   | addr | ...
//!  |<-------- gaps <= t1.5 between characters -------->|
//! ```

use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::checksum;
use crate::constants::{
    CRC_LEN, DEFAULT_BAUD_RATE, DEFAULT_BITS_PER_CHAR, FIXED_INTER_CHAR_TIMEOUT_US,
    FIXED_INTER_FRAME_TIMEOUT_US, FIXED_TIMING_BAUD_THRESHOLD, MAX_RTU_FRAME_SIZE,
    MIN_RTU_FRAME_SIZE,
};
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::SlaveId;

/// Inter-character (t1.5) and inter-frame (t3.5) silence thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameTiming {
    /// Longest gap tolerated between two characters of one frame
    pub inter_char: Duration,
    /// Silence that terminates a frame
    pub inter_frame: Duration,
    /// Time one character occupies the line.
    ///
    /// Used to recover the arrival of the first byte of a multi-byte read.
    /// Zero treats every read as arriving in an instant.
    pub char_time: Duration,
}

impl FrameTiming {
    /// Explicit thresholds. `inter_char` must not exceed `inter_frame`.
    ///
    /// The character time starts at zero; set it with [`with_char_time`](Self::with_char_time)
    /// when reads deliver several bytes at once.
    pub fn new(inter_char: Duration, inter_frame: Duration) -> ModbusResult<Self> {
        if inter_frame.is_zero() {
            return Err(ModbusError::configuration("inter-frame silence must be > 0"));
        }
        if inter_char > inter_frame {
            return Err(ModbusError::configuration(format!(
                "inter-character timeout {:?} exceeds inter-frame silence {:?}",
                inter_char, inter_frame
            )));
        }
        Ok(Self {
            inter_char,
            inter_frame,
            char_time: Duration::ZERO,
        })
    }

    /// Same thresholds with a known character time
    pub fn with_char_time(mut self, char_time: Duration) -> Self {
        self.char_time = char_time;
        self
    }

    /// Single frame gap with the t1.5 check disabled.
    ///
    /// Serial adapters that deliver bytes in bursts (USB, network bridges)
    /// cannot honour t1.5 and need this instead.
    pub fn relaxed(frame_gap: Duration) -> ModbusResult<Self> {
        Self::new(frame_gap, frame_gap)
    }

    /// Standard thresholds for a line speed.
    ///
    /// `bits_per_char` counts start, data, parity and stop bits (11 for 8E1).
    pub fn for_line(baud_rate: u32, bits_per_char: u32) -> ModbusResult<Self> {
        if baud_rate == 0 {
            return Err(ModbusError::configuration("baud rate must be > 0"));
        }
        let char_ns = bits_per_char as u64 * 1_000_000_000 / baud_rate as u64;
        if baud_rate > FIXED_TIMING_BAUD_THRESHOLD {
            return Ok(Self {
                inter_char: Duration::from_micros(FIXED_INTER_CHAR_TIMEOUT_US),
                inter_frame: Duration::from_micros(FIXED_INTER_FRAME_TIMEOUT_US),
                char_time: Duration::from_nanos(char_ns),
            });
        }

        Ok(Self::from_char_ns(char_ns))
    }

    fn from_char_ns(char_ns: u64) -> Self {
        Self {
            inter_char: Duration::from_nanos(char_ns * 3 / 2),
            inter_frame: Duration::from_nanos(char_ns * 7 / 2),
            char_time: Duration::from_nanos(char_ns),
        }
    }
}

impl Default for FrameTiming {
    /// 9600 baud 8N1 (10 bits per character), the default serial line
    fn default() -> Self {
        Self::from_char_ns(
            DEFAULT_BITS_PER_CHAR as u64 * 1_000_000_000 / DEFAULT_BAUD_RATE as u64,
        )
    }
}

/// Accumulates received bytes into candidate frames using line silence.
///
/// Emitted frames have not been CRC-checked yet.
#[derive(Debug)]
pub struct FrameAssembler {
    timing: FrameTiming,
    buffer: BytesMut,
    last_byte_at: Option<Instant>,
    corrupted: bool,
    discarded: u64,
}

impl FrameAssembler {
    pub fn new(timing: FrameTiming) -> Self {
        Self {
            timing,
            buffer: BytesMut::with_capacity(MAX_RTU_FRAME_SIZE),
            last_byte_at: None,
            corrupted: false,
            discarded: 0,
        }
    }

    pub fn timing(&self) -> FrameTiming {
        self.timing
    }

    /// Bytes buffered for the frame in progress
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Frames thrown away for bad timing, overflow or short length
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Feed one read worth of bytes; `at` is when the last of them arrived.
    ///
    /// The chunk occupied the line for `data.len()` character times before
    /// `at`, so the silence before it is measured from the start of its first
    /// byte. If that silence is at least t3.5, the previous frame is closed
    /// and returned; the new bytes start the next one.
    pub fn push(&mut self, data: &[u8], at: Instant) -> Option<Bytes> {
        if data.is_empty() {
            return None;
        }

        let mut completed = None;
        if let Some(last) = self.last_byte_at {
            let silence = at
                .saturating_duration_since(last)
                .saturating_sub(self.transfer_time(data.len()));
            if silence >= self.timing.inter_frame {
                completed = self.close();
            } else if silence > self.timing.inter_char && !self.corrupted {
                warn!(
                    "Inter-character gap {:?} exceeds t1.5 {:?}, discarding frame in progress",
                    silence, self.timing.inter_char
                );
                self.corrupted = true;
            }
        }

        let room = MAX_RTU_FRAME_SIZE - self.buffer.len();
        if data.len() > room {
            if !self.corrupted {
                warn!(
                    "RTU frame exceeds {} bytes, discarding frame in progress",
                    MAX_RTU_FRAME_SIZE
                );
            }
            self.corrupted = true;
            self.buffer.extend_from_slice(&data[..room]);
        } else {
            self.buffer.extend_from_slice(data);
        }
        self.last_byte_at = Some(at);

        completed
    }

    /// Close the frame in progress once t3.5 of silence has elapsed
    pub fn poll(&mut self, now: Instant) -> Option<Bytes> {
        let last = self.last_byte_at?;
        if now.saturating_duration_since(last) >= self.timing.inter_frame {
            self.close()
        } else {
            None
        }
    }

    /// Forget any partial frame
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last_byte_at = None;
        self.corrupted = false;
    }

    fn transfer_time(&self, len: usize) -> Duration {
        let chars = u32::try_from(len).unwrap_or(u32::MAX);
        self.timing.char_time.saturating_mul(chars)
    }

    fn close(&mut self) -> Option<Bytes> {
        let frame = self.buffer.split().freeze();
        let corrupted = std::mem::take(&mut self.corrupted);
        self.last_byte_at = None;

        if corrupted {
            self.discarded += 1;
            debug!("Discarded corrupted frame ({} bytes)", frame.len());
            return None;
        }
        if frame.len() < MIN_RTU_FRAME_SIZE {
            self.discarded += 1;
            debug!(
                "Discarded short frame: {} bytes (min {})",
                frame.len(),
                MIN_RTU_FRAME_SIZE
            );
            return None;
        }

        debug!("Frame complete: {} bytes", frame.len());
        Some(frame)
    }
}

/// CRC-validated RTU frame: address, PDU, CRC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtuFrame {
    raw: Bytes,
}

impl RtuFrame {
    /// Validate length and CRC of a candidate frame
    pub fn parse(raw: Bytes) -> ModbusResult<Self> {
        if raw.len() < MIN_RTU_FRAME_SIZE {
            return Err(ModbusError::frame(format!(
                "RTU frame too short: {} bytes",
                raw.len()
            )));
        }
        if raw.len() > MAX_RTU_FRAME_SIZE {
            return Err(ModbusError::frame(format!(
                "RTU frame too large: {} bytes",
                raw.len()
            )));
        }
        if !checksum::verify(&raw) {
            let split = raw.len() - CRC_LEN;
            return Err(ModbusError::frame(format!(
                "CRC mismatch: expected 0x{:04X}, got 0x{:04X}",
                checksum::crc16(&raw[..split]),
                u16::from_le_bytes([raw[split], raw[split + 1]])
            )));
        }
        Ok(Self { raw })
    }

    #[inline]
    pub fn slave_id(&self) -> SlaveId {
        self.raw[0]
    }

    #[inline]
    pub fn function_code(&self) -> u8 {
        self.raw[1]
    }

    /// Function code and data, without address and CRC
    #[inline]
    pub fn pdu(&self) -> &[u8] {
        &self.raw[1..self.raw.len() - CRC_LEN]
    }

    #[inline]
    pub fn crc(&self) -> u16 {
        let split = self.raw.len() - CRC_LEN;
        u16::from_le_bytes([self.raw[split], self.raw[split + 1]])
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const READ_FRAME: [u8; 8] = [0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0x0B];

    fn timing() -> FrameTiming {
        FrameTiming::new(Duration::from_micros(1_500), Duration::from_micros(3_500)).unwrap()
    }

    #[test]
    fn test_timing_for_line() {
        let t = FrameTiming::for_line(9600, 11).unwrap();
        // 11 bits at 9600 baud = 1145.8 µs per character
        assert_eq!(t.char_time.as_micros(), 1145);
        assert_eq!(t.inter_char.as_micros(), 1718);
        assert_eq!(t.inter_frame.as_micros(), 4010);

        // Default line is 9600 8N1
        let t = FrameTiming::default();
        assert_eq!(t, FrameTiming::for_line(9600, 10).unwrap());
        assert_eq!(t.char_time.as_micros(), 1041);

        let t = FrameTiming::for_line(19200, 10).unwrap();
        assert_eq!(t.inter_frame.as_micros(), 1822);

        let t = FrameTiming::for_line(115_200, 11).unwrap();
        assert_eq!(t.inter_char, Duration::from_micros(750));
        assert_eq!(t.inter_frame, Duration::from_micros(1750));
        assert_eq!(t.char_time.as_nanos(), 95_486);

        assert!(FrameTiming::for_line(0, 11).is_err());
    }

    #[test]
    fn test_timing_validation() {
        assert!(FrameTiming::new(Duration::from_millis(5), Duration::from_millis(4)).is_err());
        assert!(FrameTiming::new(Duration::ZERO, Duration::ZERO).is_err());
        let relaxed = FrameTiming::relaxed(Duration::from_millis(20)).unwrap();
        assert_eq!(relaxed.inter_char, relaxed.inter_frame);
        assert_eq!(relaxed.char_time, Duration::ZERO);

        let char_time = FrameTiming::default().char_time;
        let relaxed = relaxed.with_char_time(char_time);
        assert_eq!(relaxed.char_time, char_time);
        assert_eq!(relaxed.inter_frame, Duration::from_millis(20));
    }

    #[test]
    fn test_fifo_chunks_stay_one_frame() {
        // 9600 8E1, a 16550 handing over 8 bytes then 9 bytes of a
        // back-to-back 17 byte frame
        let timing = FrameTiming::for_line(9600, 11).unwrap();
        let c = timing.char_time;
        let mut asm = FrameAssembler::new(timing);
        let t0 = Instant::now();
        let frame: Vec<u8> = (0u8..17).collect();

        assert!(asm.push(&frame[..8], t0 + c * 8).is_none());
        assert!(asm.push(&frame[8..], t0 + c * 17).is_none());
        assert_eq!(asm.pending_len(), 17);

        let done = asm.poll(t0 + c * 17 + timing.inter_frame).unwrap();
        assert_eq!(&done[..], &frame[..]);
        assert_eq!(asm.discarded(), 0);
    }

    #[test]
    fn test_chunk_transfer_time_is_not_silence() {
        let timing = FrameTiming::default();
        let c = timing.char_time;
        let mut asm = FrameAssembler::new(timing);
        let t0 = Instant::now();

        asm.push(&READ_FRAME[..4], t0 + c * 4);
        asm.push(&READ_FRAME[4..], t0 + c * 8);
        let frame = asm.poll(t0 + c * 8 + timing.inter_frame).unwrap();
        assert_eq!(&frame[..], &READ_FRAME);
    }

    #[test]
    fn test_real_silence_between_chunks_detected() {
        let timing = FrameTiming::default();
        let c = timing.char_time;
        let t0 = Instant::now();

        // 2 ms of silence: above t1.5 (1.56 ms), below t3.5 (3.65 ms)
        let mut asm = FrameAssembler::new(timing);
        asm.push(&READ_FRAME[..4], t0 + c * 4);
        asm.push(&READ_FRAME[4..], t0 + c * 8 + Duration::from_millis(2));
        assert!(asm.poll(t0 + Duration::from_millis(30)).is_none());
        assert_eq!(asm.discarded(), 1);

        // 4 ms of silence closes the first part as its own (short) frame
        let mut asm = FrameAssembler::new(timing);
        asm.push(&READ_FRAME[..3], t0 + c * 3);
        assert!(asm
            .push(&READ_FRAME, t0 + c * 11 + Duration::from_millis(4))
            .is_none());
        assert_eq!(asm.discarded(), 1);
        assert_eq!(asm.pending_len(), 8);
    }

    #[test]
    fn test_frame_completes_after_silence() {
        let mut asm = FrameAssembler::new(timing());
        let t0 = Instant::now();

        assert!(asm.push(&READ_FRAME[..3], t0).is_none());
        assert!(asm
            .push(&READ_FRAME[3..], t0 + Duration::from_micros(1_000))
            .is_none());
        assert_eq!(asm.pending_len(), 8);

        // Not silent long enough yet
        assert!(asm.poll(t0 + Duration::from_micros(3_000)).is_none());

        let frame = asm.poll(t0 + Duration::from_micros(4_500)).unwrap();
        assert_eq!(&frame[..], &READ_FRAME);
        assert_eq!(asm.pending_len(), 0);
        assert!(asm.poll(t0 + Duration::from_millis(10)).is_none());
    }

    #[test]
    fn test_next_frame_closes_previous() {
        let mut asm = FrameAssembler::new(timing());
        let t0 = Instant::now();

        assert!(asm.push(&READ_FRAME, t0).is_none());
        let frame = asm
            .push(&READ_FRAME, t0 + Duration::from_micros(3_500))
            .unwrap();
        assert_eq!(&frame[..], &READ_FRAME);
        assert_eq!(asm.pending_len(), 8);
    }

    #[test]
    fn test_mid_frame_gap_discards_frame() {
        let mut asm = FrameAssembler::new(timing());
        let t0 = Instant::now();

        asm.push(&READ_FRAME[..4], t0);
        // 2 ms > t1.5 but < t3.5
        asm.push(&READ_FRAME[4..], t0 + Duration::from_millis(2));
        assert!(asm.poll(t0 + Duration::from_millis(10)).is_none());
        assert_eq!(asm.discarded(), 1);

        // Assembler recovers for the next frame
        let t1 = t0 + Duration::from_millis(20);
        asm.push(&READ_FRAME, t1);
        assert!(asm.poll(t1 + Duration::from_millis(4)).is_some());
    }

    #[test]
    fn test_short_frame_discarded() {
        let mut asm = FrameAssembler::new(timing());
        let t0 = Instant::now();

        asm.push(&[0x01, 0x03, 0xC4], t0);
        assert!(asm.poll(t0 + Duration::from_millis(5)).is_none());
        assert_eq!(asm.discarded(), 1);
    }

    #[test]
    fn test_oversized_frame_discarded() {
        let mut asm = FrameAssembler::new(timing());
        let t0 = Instant::now();

        let noise = vec![0x55u8; MAX_RTU_FRAME_SIZE + 10];
        asm.push(&noise, t0);
        assert_eq!(asm.pending_len(), MAX_RTU_FRAME_SIZE);
        assert!(asm.poll(t0 + Duration::from_millis(5)).is_none());
        assert_eq!(asm.discarded(), 1);
    }

    #[test]
    fn test_reset_drops_partial_frame() {
        let mut asm = FrameAssembler::new(timing());
        let t0 = Instant::now();

        asm.push(&READ_FRAME[..5], t0);
        asm.reset();
        assert_eq!(asm.pending_len(), 0);
        assert!(asm.poll(t0 + Duration::from_millis(5)).is_none());
        assert_eq!(asm.discarded(), 0);
    }

    #[test]
    fn test_rtu_frame_parse() {
        let frame = RtuFrame::parse(Bytes::from_static(&READ_FRAME)).unwrap();
        assert_eq!(frame.slave_id(), 0x01);
        assert_eq!(frame.function_code(), 0x03);
        assert_eq!(frame.pdu(), &[0x03, 0x00, 0x00, 0x00, 0x02]);
        assert_eq!(frame.crc(), 0x0BC4);
        assert_eq!(frame.as_bytes(), &READ_FRAME);
    }

    #[test]
    fn test_rtu_frame_rejects_bad_crc() {
        let mut raw = READ_FRAME;
        raw[7] ^= 0xFF;
        let err = RtuFrame::parse(Bytes::copy_from_slice(&raw)).unwrap_err();
        assert!(matches!(err, ModbusError::Frame { .. }));

        let err = RtuFrame::parse(Bytes::from_static(&[0x01, 0x03, 0x00])).unwrap_err();
        assert!(matches!(err, ModbusError::Frame { .. }));
    }
}
