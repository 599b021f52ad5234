//! Modbus RTU protocol constants based on official specification
//!
//! These constants are derived from the Modbus application protocol and the
//! Modbus over serial line specification:
//! - Maximum RTU ADU size: 256 bytes
//! - Maximum PDU size: 253 bytes (ADU - slave address - CRC)
//! - Register limits are calculated to fit within the PDU size constraint

// ============================================================================
// Frame Size Constants
// ============================================================================

/// Maximum RTU ADU (Application Data Unit) size
/// Slave Address(1) + PDU(253) + CRC(2) = 256 bytes
pub const MAX_RTU_FRAME_SIZE: usize = 256;

/// Minimum RTU frame that can carry a request
/// Slave Address(1) + Function Code(1) + CRC(2) = 4 bytes
pub const MIN_RTU_FRAME_SIZE: usize = 4;

/// Maximum PDU (Protocol Data Unit) size per Modbus specification
/// RS485 ADU (256 bytes) - Slave Address (1 byte) - CRC (2 bytes) = 253 bytes
pub const MAX_PDU_SIZE: usize = 253;

/// CRC trailer length in an RTU frame
pub const CRC_LEN: usize = 2;

// ============================================================================
// Addressing
// ============================================================================

/// Broadcast address: every slave acts on the request, none replies
pub const BROADCAST_ADDRESS: u8 = 0;

/// Lowest assignable slave address
pub const MIN_SLAVE_ADDRESS: u8 = 1;

/// Highest assignable slave address (248-255 are reserved)
pub const MAX_SLAVE_ADDRESS: u8 = 247;

// ============================================================================
// Register Operation Limits
// ============================================================================

/// Maximum number of registers for FC03/FC04 (Read Holding/Input Registers)
///
/// Calculation for response PDU:
/// - Function Code: 1 byte
/// - Byte Count: 1 byte
/// - Register Data: N × 2 bytes
/// - Total: 1 + 1 + (N × 2) ≤ 253
/// - Therefore: N ≤ (253 - 2) / 2 = 125.5 → 125 registers
pub const MAX_READ_REGISTERS: usize = 125;

/// Maximum number of registers for FC16 (Write Multiple Registers)
///
/// Calculation for request PDU:
/// - Function Code: 1 byte
/// - Starting Address: 2 bytes
/// - Quantity of Registers: 2 bytes
/// - Byte Count: 1 byte
/// - Register Values: N × 2 bytes
/// - Total: 1 + 2 + 2 + 1 + (N × 2) ≤ 253
/// - Therefore: N ≤ (253 - 6) / 2 = 123.5 → 123 registers
pub const MAX_WRITE_REGISTERS: usize = 123;

// ============================================================================
// Register Database Sizing
// ============================================================================

/// Meters modelled by the default register database
pub const DEFAULT_METER_COUNT: usize = 25;

/// Registers reserved per meter
pub const DEFAULT_METER_REGISTER_COUNT: usize = 200;

/// Default register database size (25 meters × 200 registers)
pub const DEFAULT_REGISTER_COUNT: usize = DEFAULT_METER_COUNT * DEFAULT_METER_REGISTER_COUNT;

/// Initial value of every register
pub const DEFAULT_REGISTER_VALUE: u16 = 0x0000;

// ============================================================================
// Line Timing
// ============================================================================

/// Default line speed
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Bits per character on the default 8N1 line (start, 8 data, stop)
pub const DEFAULT_BITS_PER_CHAR: u32 = 10;

/// Baud rate above which the fixed inter-character/inter-frame timeouts apply
pub const FIXED_TIMING_BAUD_THRESHOLD: u32 = 19_200;

/// Fixed t1.5 inter-character timeout for baud rates above 19200
pub const FIXED_INTER_CHAR_TIMEOUT_US: u64 = 750;

/// Fixed t3.5 inter-frame silence for baud rates above 19200
pub const FIXED_INTER_FRAME_TIMEOUT_US: u64 = 1_750;

// ============================================================================
// Modbus Function Codes
// ============================================================================

/// Read Holding Registers (FC03)
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;

/// Read Input Registers (FC04)
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;

/// Write Single Register (FC06)
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;

/// Write Multiple Registers (FC16)
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Bit set on the function code of an exception response
pub const EXCEPTION_FLAG: u8 = 0x80;

// ============================================================================
// Modbus Exception Codes
// ============================================================================

/// Illegal Function
pub const EXCEPTION_ILLEGAL_FUNCTION: u8 = 0x01;

/// Illegal Data Address
pub const EXCEPTION_ILLEGAL_DATA_ADDRESS: u8 = 0x02;

/// Illegal Data Value
pub const EXCEPTION_ILLEGAL_DATA_VALUE: u8 = 0x03;

/// Slave Device Failure
pub const EXCEPTION_SLAVE_DEVICE_FAILURE: u8 = 0x04;
