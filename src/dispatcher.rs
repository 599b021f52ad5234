//! Request dispatch against the register store
//!
//! Each request ends in exactly one of two states: a response to transmit or
//! nothing at all. Broadcasts always end in nothing, whether they succeeded
//! or failed.
//!
//! ```text
//! decoded ──► range check ──► store op ──► success body
//!    │             │              │
//!    └─ exception ─┴─ 0x02 ───────┴─ 0x04 (internal) ──► exception body
//!
//! unit 0 (broadcast) ──► executed, then Dropped
//! ```

use tracing::{debug, error, warn};

use crate::constants::BROADCAST_ADDRESS;
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::{ModbusResponse, Request, ResponseBody, SlaveId};
use crate::store::{check_range, RegisterStore};

/// Result of dispatching one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Transmit this response
    Respond(ModbusResponse),
    /// Transmit nothing
    Dropped,
}

impl Outcome {
    pub fn response(&self) -> Option<&ModbusResponse> {
        match self {
            Self::Respond(response) => Some(response),
            Self::Dropped => None,
        }
    }
}

/// Routes decoded requests to a [`RegisterStore`]
#[derive(Debug)]
pub struct RequestDispatcher<S> {
    store: S,
}

impl<S: RegisterStore> RequestDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Execute a decoded request (or answer its decode failure).
    pub fn dispatch(&mut self, slave_id: SlaveId, decoded: ModbusResult<Request>) -> Outcome {
        let response = match decoded {
            Ok(request) => {
                let fc = request.function().to_u8();
                match self.execute(&request) {
                    Ok(body) => Some(ModbusResponse::new(slave_id, body)),
                    Err(err) => failure_response(slave_id, fc, err),
                }
            }
            Err(ModbusError::Exception { function, code }) => {
                debug!("Request FC={:02X} rejected by decoder: {}", function, code);
                Some(ModbusResponse::exception(slave_id, function, code))
            }
            Err(err) => {
                warn!("Dropping undecodable request: {}", err);
                None
            }
        };

        if slave_id == BROADCAST_ADDRESS {
            debug!("Broadcast request processed, no response");
            return Outcome::Dropped;
        }

        match response {
            Some(response) => Outcome::Respond(response),
            None => Outcome::Dropped,
        }
    }

    fn execute(&mut self, request: &Request) -> ModbusResult<ResponseBody> {
        let (start, count) = request.range();
        check_range(self.store.size(), start, count)?;

        match request {
            Request::ReadHoldingRegisters { address, quantity }
            | Request::ReadInputRegisters { address, quantity } => {
                let values = self.store.read(*address, *quantity as usize)?;
                Ok(ResponseBody::ReadRegisters {
                    function: request.function(),
                    values,
                })
            }
            Request::WriteSingleRegister { address, value } => {
                self.store.write(*address, &[*value])?;
                Ok(ResponseBody::WriteSingleRegister {
                    address: *address,
                    value: *value,
                })
            }
            Request::WriteMultipleRegisters { address, values } => {
                self.store.write(*address, values)?;
                Ok(ResponseBody::WriteMultipleRegisters {
                    address: *address,
                    quantity: values.len() as u16,
                })
            }
        }
    }
}

/// Map a failed request to its exception response, if it has one
fn failure_response(slave_id: SlaveId, fc: u8, err: ModbusError) -> Option<ModbusResponse> {
    let code = match err.exception_code() {
        Some(code) => code,
        None => {
            warn!("Dropping request FC={:02X}: {}", fc, err);
            return None;
        }
    };

    if matches!(err, ModbusError::Internal { .. }) {
        error!("Request FC={:02X} failed: {}", fc, err);
    } else {
        debug!("Request FC={:02X} rejected: {}", fc, code);
    }
    Some(ModbusResponse::exception(slave_id, fc, code))
}
