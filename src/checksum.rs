//! CRC-16/MODBUS validation for RTU frames
//!
//! Polynomial 0xA001 (reflected 0x8005), initial value 0xFFFF. The checksum is
//! transmitted low byte first, after the slave address and PDU.
//!
//! A frame that fails verification is never answered: RTU masters rely on
//! their own timeout and retry to recover from line noise.

use crc::{Crc, CRC_16_MODBUS};

use crate::constants::CRC_LEN;

/// CRC calculator for RTU
const CRC_MODBUS: Crc<u16> = Crc::<u16>::new(&CRC_16_MODBUS);

/// Compute the CRC over `data` (address + PDU, without trailer)
#[inline]
pub fn crc16(data: &[u8]) -> u16 {
    CRC_MODBUS.checksum(data)
}

/// Check the trailing two CRC bytes (low byte first) of a complete frame.
///
/// Frames too short to contain at least one byte plus a CRC never verify.
pub fn verify(frame: &[u8]) -> bool {
    if frame.len() <= CRC_LEN {
        return false;
    }
    let split = frame.len() - CRC_LEN;
    let received = u16::from_le_bytes([frame[split], frame[split + 1]]);
    crc16(&frame[..split]) == received
}

/// Append the CRC of the current contents
#[inline]
pub fn append_crc(frame: &mut Vec<u8>) {
    let crc = crc16(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}
