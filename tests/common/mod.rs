//! Scripted line and helpers shared by the integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use tokio::sync::broadcast;
use voltage_rtu_slave::transport::{ByteTransport, TransportStats};
use voltage_rtu_slave::{ManualClock, ModbusError, ModbusResult};

/// One thing that happens on the line
#[derive(Debug, Clone)]
pub enum Step {
    /// `data` arrives after `after` of silence
    Bytes { after: Duration, data: Vec<u8> },
    /// Nothing arrives for this long
    Silence(Duration),
    /// The port goes away
    Fail,
}

/// Serial line replaying a script against a shared manual clock.
///
/// Once the script runs out, every read is a full read timeout of silence,
/// and the optional stop sender fires.
pub struct ScriptedLine {
    clock: ManualClock,
    steps: VecDeque<Step>,
    written: Vec<Vec<u8>>,
    stats: TransportStats,
    stop: Option<broadcast::Sender<()>>,
}

impl ScriptedLine {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            steps: VecDeque::new(),
            written: Vec::new(),
            stats: TransportStats::default(),
            stop: None,
        }
    }

    /// A whole frame arriving in one chunk after an idle read
    pub fn frame(mut self, data: &[u8]) -> Self {
        self.steps.push_back(Step::Silence(Duration::from_millis(20)));
        self.steps.push_back(Step::Bytes {
            after: Duration::ZERO,
            data: data.to_vec(),
        });
        self
    }

    pub fn chunk(mut self, after: Duration, data: &[u8]) -> Self {
        self.steps.push_back(Step::Bytes {
            after,
            data: data.to_vec(),
        });
        self
    }

    pub fn silence(mut self, duration: Duration) -> Self {
        self.steps.push_back(Step::Silence(duration));
        self
    }

    pub fn fail(mut self) -> Self {
        self.steps.push_back(Step::Fail);
        self
    }

    pub fn stop_when_done(mut self, stop: broadcast::Sender<()>) -> Self {
        self.stop = Some(stop);
        self
    }

    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    pub fn is_done(&self) -> bool {
        self.steps.is_empty()
    }
}

impl ByteTransport for ScriptedLine {
    async fn read(&mut self, buf: &mut [u8], timeout: Duration) -> ModbusResult<usize> {
        match self.steps.pop_front() {
            Some(Step::Bytes { after, data }) => {
                self.clock.advance(after);
                buf[..data.len()].copy_from_slice(&data);
                self.stats.bytes_received += data.len() as u64;
                Ok(data.len())
            }
            Some(Step::Silence(duration)) => {
                self.clock.advance(duration);
                Ok(0)
            }
            Some(Step::Fail) => {
                self.stats.errors += 1;
                Err(ModbusError::transport("serial line lost"))
            }
            None => {
                self.clock.advance(timeout);
                if let Some(stop) = self.stop.take() {
                    let _ = stop.send(());
                }
                tokio::task::yield_now().await;
                Ok(0)
            }
        }
    }

    async fn write(&mut self, frame: &[u8]) -> ModbusResult<()> {
        self.stats.bytes_sent += frame.len() as u64;
        self.stats.frames_sent += 1;
        self.written.push(frame.to_vec());
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        self.stats.clone()
    }
}
