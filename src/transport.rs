//! # Byte transport for the RTU slave
//!
//! The slave loop only needs two things from the line: read whatever bytes
//! arrived within a bounded wait, and write a whole response frame. Both are
//! expressed by [`ByteTransport`], which the slave receives at construction.
//!
//! ## Transports
//!
//! - [`SerialTransport`] (feature `rtu`): RS-232/RS-485 through `tokio-serial`
//! - anything else implementing [`ByteTransport`] (tests use scripted mocks)
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use voltage_rtu_slave::config::SerialConfig;
//! use voltage_rtu_slave::transport::{ByteTransport, SerialTransport};
//!
//! # async fn example() -> voltage_rtu_slave::ModbusResult<()> {
//! let config = SerialConfig::new("/dev/ttyUSB0", 9600);
//! let mut transport = SerialTransport::open(&config)?;
//!
//! let mut buf = [0u8; 256];
//! let n = transport.read(&mut buf, Duration::from_millis(10)).await?;
//! println!("received {} bytes", n);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use tracing::info;

use crate::error::ModbusResult;

#[cfg(feature = "rtu")]
use tokio::io::{AsyncReadExt, AsyncWriteExt};
#[cfg(feature = "rtu")]
use tokio::time::timeout;
#[cfg(feature = "rtu")]
use tracing::debug;

#[cfg(feature = "rtu")]
use crate::config::SerialConfig;
#[cfg(feature = "rtu")]
use crate::error::ModbusError;

/// Byte-level counters kept by a transport
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportStats {
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub frames_sent: u64,
    pub errors: u64,
    pub timeouts: u64,
}

/// Half-duplex byte stream the slave listens and answers on.
///
/// # Contract
///
/// - `read` waits at most `timeout` and returns `Ok(0)` when nothing arrived.
///   A closed or failed line is an error, and errors from either method end
///   the slave loop.
/// - `write` returns once the whole frame has been handed to the line.
pub trait ByteTransport: Send {
    /// Read available bytes into `buf`, waiting at most `timeout`
    fn read(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
    ) -> impl Future<Output = ModbusResult<usize>> + Send;

    /// Write one complete frame and flush it
    fn write(&mut self, frame: &[u8]) -> impl Future<Output = ModbusResult<()>> + Send;

    /// Transport statistics
    fn stats(&self) -> TransportStats;
}

/// Format raw bytes as hex string for packet logging
pub fn format_hex_packet(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Log a packet with its direction
pub(crate) fn log_packet(direction: &str, data: &[u8], slave_id: Option<u8>) {
    let hex = format_hex_packet(data);
    match slave_id {
        Some(id) => info!("[MODBUS-RTU] {} slave:{} ({} bytes) {}", direction, id, data.len(), hex),
        None => info!("[MODBUS-RTU] {} ({} bytes) {}", direction, data.len(), hex),
    }
}

/// Serial line transport (RS-232 / RS-485)
#[cfg(feature = "rtu")]
pub struct SerialTransport {
    port_name: String,
    port: tokio_serial::SerialStream,
    write_timeout: Duration,
    stats: TransportStats,
}

#[cfg(feature = "rtu")]
impl SerialTransport {
    /// Open the port described by `config`
    pub fn open(config: &SerialConfig) -> ModbusResult<Self> {
        let builder = tokio_serial::new(&config.port, config.baud_rate)
            .data_bits(config.data_bits)
            .stop_bits(config.stop_bits)
            .parity(config.parity)
            .flow_control(config.flow_control)
            .timeout(config.write_timeout);

        let port = tokio_serial::SerialStream::open(&builder).map_err(|e| {
            ModbusError::transport(format!(
                "Failed to open serial port {}: {}",
                config.port, e
            ))
        })?;

        debug!(
            "Opened serial port {} at {} baud ({:?}, {:?}, {:?})",
            config.port, config.baud_rate, config.data_bits, config.parity, config.stop_bits
        );

        Ok(Self {
            port_name: config.port.clone(),
            port,
            write_timeout: config.write_timeout,
            stats: TransportStats::default(),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

#[cfg(feature = "rtu")]
impl ByteTransport for SerialTransport {
    async fn read(&mut self, buf: &mut [u8], wait: Duration) -> ModbusResult<usize> {
        match timeout(wait, self.port.read(buf)).await {
            Err(_) => Ok(0),
            Ok(Ok(0)) => {
                self.stats.errors += 1;
                Err(ModbusError::transport(format!(
                    "Serial port {} closed",
                    self.port_name
                )))
            }
            Ok(Ok(n)) => {
                self.stats.bytes_received += n as u64;
                Ok(n)
            }
            Ok(Err(e)) => {
                self.stats.errors += 1;
                Err(ModbusError::Io(e))
            }
        }
    }

    async fn write(&mut self, frame: &[u8]) -> ModbusResult<()> {
        let port = &mut self.port;
        let send = async {
            port.write_all(frame).await?;
            port.flush().await
        };

        match timeout(self.write_timeout, send).await {
            Ok(Ok(())) => {
                self.stats.bytes_sent += frame.len() as u64;
                self.stats.frames_sent += 1;
                Ok(())
            }
            Ok(Err(e)) => {
                self.stats.errors += 1;
                Err(ModbusError::Io(e))
            }
            Err(_) => {
                self.stats.timeouts += 1;
                self.stats.errors += 1;
                Err(ModbusError::timeout(
                    "write response",
                    self.write_timeout.as_millis() as u64,
                ))
            }
        }
    }

    fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}
