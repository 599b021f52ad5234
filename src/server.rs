//! # Modbus RTU slave loop
//!
//! [`ModbusRtuSlave`] wires the frame assembler, CRC check, decoder,
//! dispatcher and encoder to an injected [`ByteTransport`], [`TimeSource`]
//! and [`RegisterStore`].
//!
//! One iteration of the loop ([`ModbusRtuSlave::poll_once`]):
//!
//! 1. read whatever arrived within `read_timeout`
//! 2. feed it to the assembler with its arrival time
//! 3. when a frame is complete: verify CRC, decode, dispatch, encode
//! 4. transmit the response (if any) and reset the assembler
//!
//! The line is half-duplex, so bytes received while a response is being
//! prepared are discarded with the assembler reset.
//!
//! ## Example
//!
//! ```rust,no_run
//! use tokio::sync::broadcast;
//! use voltage_rtu_slave::{
//!     ModbusRtuSlave, RegisterBank, SerialConfig, SerialTransport, SlaveConfig, SystemClock,
//! };
//!
//! #[tokio::main]
//! async fn main() -> voltage_rtu_slave::ModbusResult<()> {
//!     let serial = SerialConfig::new("/dev/ttyUSB0", 9600);
//!     let config = SlaveConfig::new().with_timing(serial.frame_timing()?);
//!     let transport = SerialTransport::open(&serial)?;
//!     let store = RegisterBank::new(config.register_count);
//!
//!     let mut slave = ModbusRtuSlave::new(config, transport, SystemClock, store)?;
//!     let (_stop_tx, stop_rx) = broadcast::channel(1);
//!     slave.run(stop_rx).await
//! }
//! ```

use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, error, info, warn};

use crate::clock::TimeSource;
use crate::config::SlaveConfig;
use crate::constants::{BROADCAST_ADDRESS, MAX_RTU_FRAME_SIZE};
use crate::decoder::RequestDecoder;
use crate::dispatcher::{Outcome, RequestDispatcher};
use crate::encoder::encode_response;
use crate::error::ModbusResult;
use crate::frame::{FrameAssembler, RtuFrame};
use crate::protocol::{ExceptionCode, ModbusResponse};
use crate::store::RegisterStore;
use crate::transport::{log_packet, ByteTransport};

/// Slave statistics
#[derive(Debug, Clone)]
pub struct ServerStats {
    /// Frames delimited by the assembler
    pub frames_received: u64,
    /// Frames failing the CRC or length check
    pub frame_errors: u64,
    /// Partial frames dropped for timing, overflow or short length
    pub frames_discarded: u64,
    /// Valid frames addressed to another unit
    pub foreign_frames: u64,
    /// Requests executed or rejected with an exception
    pub requests_handled: u64,
    pub broadcasts: u64,
    pub exceptions_sent: u64,
    pub responses_sent: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub start_time: DateTime<Utc>,
}

impl ServerStats {
    fn new() -> Self {
        Self {
            frames_received: 0,
            frame_errors: 0,
            frames_discarded: 0,
            foreign_frames: 0,
            requests_handled: 0,
            broadcasts: 0,
            exceptions_sent: 0,
            responses_sent: 0,
            bytes_received: 0,
            bytes_sent: 0,
            start_time: Utc::now(),
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        (Utc::now() - self.start_time).num_seconds().max(0) as u64
    }
}

/// Modbus RTU slave serving one unit address
pub struct ModbusRtuSlave<T, C, S> {
    config: SlaveConfig,
    transport: T,
    clock: C,
    assembler: FrameAssembler,
    decoder: RequestDecoder,
    dispatcher: RequestDispatcher<S>,
    stats: ServerStats,
    rx_buffer: [u8; MAX_RTU_FRAME_SIZE],
}

impl<T, C, S> ModbusRtuSlave<T, C, S>
where
    T: ByteTransport,
    C: TimeSource,
    S: RegisterStore,
{
    /// Build a slave from its configuration and capabilities
    pub fn new(config: SlaveConfig, transport: T, clock: C, store: S) -> ModbusResult<Self> {
        config.validate()?;
        if store.size() != config.register_count {
            warn!(
                "Register store holds {} registers, configuration says {}",
                store.size(),
                config.register_count
            );
        }

        let timing = config.frame_timing();
        debug!(
            "Frame timing: t1.5={:?}, t3.5={:?}",
            timing.inter_char, timing.inter_frame
        );

        Ok(Self {
            config,
            transport,
            clock,
            assembler: FrameAssembler::new(timing),
            decoder: RequestDecoder::new(config.unit_id),
            dispatcher: RequestDispatcher::new(store),
            stats: ServerStats::new(),
            rx_buffer: [0; MAX_RTU_FRAME_SIZE],
        })
    }

    pub fn config(&self) -> &SlaveConfig {
        &self.config
    }

    pub fn stats(&self) -> ServerStats {
        let mut stats = self.stats.clone();
        stats.frames_discarded = self.assembler.discarded();
        stats
    }

    pub fn store(&self) -> &S {
        self.dispatcher.store()
    }

    pub fn store_mut(&mut self) -> &mut S {
        self.dispatcher.store_mut()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// One bounded read, then frame handling if a frame completed.
    ///
    /// Only transport failures are returned; everything else is handled.
    pub async fn poll_once(&mut self) -> ModbusResult<()> {
        let n = self
            .transport
            .read(&mut self.rx_buffer, self.config.read_timeout)
            .await?;
        // Taken as the arrival of the last byte read
        let now = self.clock.now();

        let completed = if n > 0 {
            self.stats.bytes_received += n as u64;
            self.assembler.push(&self.rx_buffer[..n], now)
        } else {
            None
        };
        let completed = completed.or_else(|| self.assembler.poll(now));

        if let Some(raw) = completed {
            if let Some(response) = self.handle_frame(raw) {
                self.transmit(&response).await?;
            }
        }
        Ok(())
    }

    /// Run a complete frame through the pipeline without touching the line.
    ///
    /// Returns the encoded response, or `None` when nothing must be sent.
    pub fn process_frame(&mut self, raw: &[u8]) -> Option<Vec<u8>> {
        self.handle_frame(Bytes::copy_from_slice(raw))
    }

    /// Serve requests until `shutdown` fires or the transport fails.
    ///
    /// The stop signal is checked between iterations, so a request is never
    /// left half-applied.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) -> ModbusResult<()> {
        info!(
            "RTU slave started: unit {}, {} registers",
            self.config.unit_id,
            self.store().size()
        );

        loop {
            match shutdown.try_recv() {
                Err(TryRecvError::Empty) => {}
                Ok(()) | Err(TryRecvError::Closed) | Err(TryRecvError::Lagged(_)) => {
                    debug!("Shutdown signal received for RTU slave");
                    break;
                }
            }

            if let Err(e) = self.poll_once().await {
                error!("RTU slave stopped on transport error: {}", e);
                return Err(e);
            }
        }

        let stats = self.stats();
        info!(
            "RTU slave stopped after {}s: {} requests, {} responses, {} exceptions, {} frame errors",
            stats.uptime_seconds(),
            stats.requests_handled,
            stats.responses_sent,
            stats.exceptions_sent,
            stats.frame_errors
        );
        Ok(())
    }

    fn handle_frame(&mut self, raw: Bytes) -> Option<Vec<u8>> {
        self.stats.frames_received += 1;
        if self.config.packet_logging {
            log_packet("recv", &raw, None);
        }

        let frame = match RtuFrame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.frame_errors += 1;
                warn!("Dropping frame: {}", e);
                return None;
            }
        };

        let decoded = match self.decoder.decode(&frame) {
            Some(decoded) => decoded,
            None => {
                self.stats.foreign_frames += 1;
                return None;
            }
        };

        self.stats.requests_handled += 1;
        if frame.slave_id() == BROADCAST_ADDRESS {
            self.stats.broadcasts += 1;
        }

        let response = match self
            .dispatcher
            .dispatch(frame.slave_id(), decoded.map(|req| req.request))
        {
            Outcome::Respond(response) => response,
            Outcome::Dropped => return None,
        };

        let encoded = encode_response(&response).or_else(|e| {
            error!("Failed to encode response: {}", e);
            encode_response(&ModbusResponse::exception(
                response.slave_id,
                response.function_code(),
                ExceptionCode::SlaveDeviceFailure,
            ))
        });

        match encoded {
            Ok(bytes) => {
                if response.is_exception() {
                    self.stats.exceptions_sent += 1;
                }
                Some(bytes)
            }
            Err(e) => {
                error!("Failed to encode fallback response: {}", e);
                None
            }
        }
    }

    async fn transmit(&mut self, frame: &[u8]) -> ModbusResult<()> {
        if self.config.packet_logging {
            log_packet("send", frame, frame.first().copied());
        } else {
            debug!("Sending {} bytes", frame.len());
        }

        self.transport.write(frame).await?;
        self.stats.responses_sent += 1;
        self.stats.bytes_sent += frame.len() as u64;

        // Anything heard while answering belongs to no valid frame
        self.assembler.reset();
        Ok(())
    }
}
