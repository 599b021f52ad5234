//! # Voltage RTU Slave - Modbus RTU Slave Engine
//!
//! **Author:** Evan Liu <liuyifanz.1996@gmail.com>
//! **License:** MIT
//!
//! A Modbus RTU slave (server) for half-duplex serial lines: frame delimiting
//! by line silence, CRC-16 validation, request decoding, dispatch against a
//! register database and exception responses.
//!
//! ## Features
//!
//! - **Async**: single Tokio task, bounded reads, cooperative stop signal
//! - **Injected capabilities**: transport, clock and register store are
//!   constructor parameters, so the whole engine runs against mocks in tests
//! - **Stack-allocated PDU** for response building
//! - **Statistics and packet logging** through `tracing`
//!
//! ## Supported Function Codes
//!
//! | Code | Function | Slave |
//! |------|----------|-------|
//! | 0x03 | Read Holding Registers | ✅ |
//! | 0x04 | Read Input Registers | ✅ |
//! | 0x06 | Write Single Register | ✅ |
//! | 0x10 | Write Multiple Registers | ✅ |
//!
//! Anything else is answered with Illegal Function (0x01). Holding and input
//! registers share one register array.
//!
//! ## Quick Start
//!
//! ```rust
//! use voltage_rtu_slave::{ManualClock, RegisterBank, SlaveConfig};
//! use voltage_rtu_slave::transport::{ByteTransport, TransportStats};
//! use voltage_rtu_slave::{ModbusResult, ModbusRtuSlave};
//! use std::time::Duration;
//!
//! struct Loopback;
//!
//! impl ByteTransport for Loopback {
//!     async fn read(&mut self, _buf: &mut [u8], _timeout: Duration) -> ModbusResult<usize> {
//!         Ok(0)
//!     }
//!     async fn write(&mut self, _frame: &[u8]) -> ModbusResult<()> {
//!         Ok(())
//!     }
//!     fn stats(&self) -> TransportStats {
//!         TransportStats::default()
//!     }
//! }
//!
//! let mut slave = ModbusRtuSlave::new(
//!     SlaveConfig::default(),
//!     Loopback,
//!     ManualClock::new(),
//!     RegisterBank::new(5000),
//! )?;
//!
//! // Read two holding registers from address 0
//! let response = slave.process_frame(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x02, 0xC4, 0x0B]);
//! assert_eq!(
//!     response,
//!     Some(vec![0x01, 0x03, 0x04, 0x00, 0x00, 0x00, 0x00, 0xFA, 0x33])
//! );
//! # Ok::<(), voltage_rtu_slave::ModbusError>(())
//! ```

// ============================================================================
// Core modules
// ============================================================================

/// Core error types and result handling
pub mod error;

/// Modbus RTU constants
pub mod constants;

/// Modbus protocol definitions for the slave side
pub mod protocol;

/// CRC-16/MODBUS
pub mod checksum;

/// Time source capability
pub mod clock;

/// Frame delimiting and frame view
pub mod frame;

/// Byte transport capability and serial transport
pub mod transport;

/// Stack-allocated PDU for response building
pub mod pdu;

// ============================================================================
// Slave engine
// ============================================================================

/// Request decoding
pub mod decoder;

/// Register database
pub mod store;

/// Request dispatch
pub mod dispatcher;

/// Response encoding
pub mod encoder;

/// Slave and serial configuration
pub mod config;

/// The slave loop
pub mod server;

// ============================================================================
// Re-exports for convenience
// ============================================================================

pub use tokio;

// === Error handling ===
pub use error::{ModbusError, ModbusResult};

// === Core types ===
pub use protocol::{
    ExceptionCode, ModbusFunction, ModbusRequest, ModbusResponse, Request, ResponseBody, SlaveId,
};

// === Engine ===
pub use clock::{ManualClock, SystemClock, TimeSource};
pub use config::SlaveConfig;
pub use decoder::RequestDecoder;
pub use dispatcher::{Outcome, RequestDispatcher};
pub use encoder::encode_response;
pub use frame::{FrameAssembler, FrameTiming, RtuFrame};
pub use server::{ModbusRtuSlave, ServerStats};
pub use store::{RegisterBank, RegisterStore, SharedRegisterBank};
pub use transport::{ByteTransport, TransportStats};

// === Protocol limits ===
pub use constants::{MAX_PDU_SIZE, MAX_READ_REGISTERS, MAX_RTU_FRAME_SIZE, MAX_WRITE_REGISTERS};

// === PDU (advanced usage) ===
pub use pdu::{ModbusPdu, PduBuilder};

#[cfg(feature = "rtu")]
pub use config::SerialConfig;

#[cfg(feature = "rtu")]
pub use transport::SerialTransport;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get library information
pub fn info() -> String {
    format!(
        "Voltage RTU Slave v{} - Modbus RTU slave engine by Evan Liu",
        VERSION
    )
}
