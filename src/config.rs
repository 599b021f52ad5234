//! # Slave and serial line configuration
//!
//! [`SlaveConfig`] describes the Modbus side: which unit address to answer,
//! how many registers to serve and how the frame delimiter behaves.
//! [`SerialConfig`] describes the physical line (feature `rtu`).
//!
//! ```rust
//! use std::time::Duration;
//! use voltage_rtu_slave::SlaveConfig;
//!
//! let config = SlaveConfig::new()
//!     .with_unit_id(17)
//!     .with_register_count(1000)
//!     .with_read_timeout(Duration::from_millis(20));
//!
//! assert!(config.validate().is_ok());
//! ```

use std::time::Duration;

pub use crate::constants::DEFAULT_BAUD_RATE;
use crate::constants::{DEFAULT_REGISTER_COUNT, MAX_SLAVE_ADDRESS, MIN_SLAVE_ADDRESS};
use crate::error::{ModbusError, ModbusResult};
use crate::frame::FrameTiming;
use crate::protocol::SlaveId;

/// Default unit address answered by the slave.
pub const DEFAULT_UNIT_ID: SlaveId = 1;

/// Default bounded wait for one transport read (milliseconds).
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 10;

/// Default time allowed for writing one response (milliseconds).
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 1000;

/// Registers addressable with a 16-bit start address.
const MAX_ADDRESSABLE_REGISTERS: usize = u16::MAX as usize + 1;

/// Modbus-side slave settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlaveConfig {
    /// Unit address this slave answers (1-247).
    pub unit_id: SlaveId,
    /// Size of the register store.
    pub register_count: usize,
    /// Longest wait for a single transport read.
    pub read_timeout: Duration,
    /// Frame delimiter thresholds; `None` uses 9600 baud 8N1 timing, the
    /// `SerialConfig` default line.
    pub timing: Option<FrameTiming>,
    /// Log every received and transmitted frame as hex.
    pub packet_logging: bool,
}

impl SlaveConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the unit address.
    pub fn with_unit_id(mut self, unit_id: SlaveId) -> Self {
        self.unit_id = unit_id;
        self
    }

    /// Set the register store size.
    pub fn with_register_count(mut self, count: usize) -> Self {
        self.register_count = count;
        self
    }

    /// Set the bounded read wait.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Override the frame delimiter thresholds.
    pub fn with_timing(mut self, timing: FrameTiming) -> Self {
        self.timing = Some(timing);
        self
    }

    /// Enable or disable hex packet logging.
    pub fn with_packet_logging(mut self, enabled: bool) -> Self {
        self.packet_logging = enabled;
        self
    }

    /// Effective frame timing.
    pub fn frame_timing(&self) -> FrameTiming {
        self.timing.unwrap_or_default()
    }

    /// Check the settings before the slave starts.
    pub fn validate(&self) -> ModbusResult<()> {
        if !(MIN_SLAVE_ADDRESS..=MAX_SLAVE_ADDRESS).contains(&self.unit_id) {
            return Err(ModbusError::configuration(format!(
                "unit id {} outside {}..={}",
                self.unit_id, MIN_SLAVE_ADDRESS, MAX_SLAVE_ADDRESS
            )));
        }
        if self.register_count == 0 {
            return Err(ModbusError::configuration("register count must be > 0"));
        }
        if self.register_count > MAX_ADDRESSABLE_REGISTERS {
            return Err(ModbusError::configuration(format!(
                "register count {} exceeds the 16-bit address space",
                self.register_count
            )));
        }
        if self.read_timeout.is_zero() {
            return Err(ModbusError::configuration("read timeout must be > 0"));
        }
        Ok(())
    }
}

impl Default for SlaveConfig {
    fn default() -> Self {
        Self {
            unit_id: DEFAULT_UNIT_ID,
            register_count: DEFAULT_REGISTER_COUNT,
            read_timeout: Duration::from_millis(DEFAULT_READ_TIMEOUT_MS),
            timing: None,
            packet_logging: false,
        }
    }
}

/// Serial line settings.
#[cfg(feature = "rtu")]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    pub data_bits: tokio_serial::DataBits,
    pub parity: tokio_serial::Parity,
    pub stop_bits: tokio_serial::StopBits,
    pub flow_control: tokio_serial::FlowControl,
    /// Longest time allowed to hand one response to the line.
    pub write_timeout: Duration,
}

#[cfg(feature = "rtu")]
impl SerialConfig {
    /// 8N1 settings for `port` at `baud_rate`.
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
            ..Self::default()
        }
    }

    pub fn with_data_bits(mut self, data_bits: tokio_serial::DataBits) -> Self {
        self.data_bits = data_bits;
        self
    }

    pub fn with_parity(mut self, parity: tokio_serial::Parity) -> Self {
        self.parity = parity;
        self
    }

    pub fn with_stop_bits(mut self, stop_bits: tokio_serial::StopBits) -> Self {
        self.stop_bits = stop_bits;
        self
    }

    pub fn with_flow_control(mut self, flow_control: tokio_serial::FlowControl) -> Self {
        self.flow_control = flow_control;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Bits on the wire per character: start, data, parity and stop.
    pub fn bits_per_char(&self) -> u32 {
        let data = match self.data_bits {
            tokio_serial::DataBits::Five => 5,
            tokio_serial::DataBits::Six => 6,
            tokio_serial::DataBits::Seven => 7,
            tokio_serial::DataBits::Eight => 8,
        };
        let parity = match self.parity {
            tokio_serial::Parity::None => 0,
            tokio_serial::Parity::Odd | tokio_serial::Parity::Even => 1,
        };
        let stop = match self.stop_bits {
            tokio_serial::StopBits::One => 1,
            tokio_serial::StopBits::Two => 2,
        };
        1 + data + parity + stop
    }

    /// t1.5 / t3.5 thresholds for this line.
    pub fn frame_timing(&self) -> ModbusResult<FrameTiming> {
        FrameTiming::for_line(self.baud_rate, self.bits_per_char())
    }
}

#[cfg(feature = "rtu")]
impl Default for SerialConfig {
    fn default() -> Self {
        let port = if cfg!(windows) { "COM1" } else { "/dev/ttyUSB0" };
        Self {
            port: port.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: tokio_serial::DataBits::Eight,
            parity: tokio_serial::Parity::None,
            stop_bits: tokio_serial::StopBits::One,
            flow_control: tokio_serial::FlowControl::None,
            write_timeout: Duration::from_millis(DEFAULT_WRITE_TIMEOUT_MS),
        }
    }
}
