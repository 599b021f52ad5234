//! Modbus protocol definitions for the slave side
//!
//! Typed views of what travels inside an RTU frame: the supported function
//! codes, exception codes, decoded requests and the responses built for them.

use std::fmt;

use crate::constants::{
    EXCEPTION_FLAG, EXCEPTION_ILLEGAL_DATA_ADDRESS, EXCEPTION_ILLEGAL_DATA_VALUE,
    EXCEPTION_ILLEGAL_FUNCTION, EXCEPTION_SLAVE_DEVICE_FAILURE, FC_READ_HOLDING_REGISTERS,
    FC_READ_INPUT_REGISTERS, FC_WRITE_MULTIPLE_REGISTERS, FC_WRITE_SINGLE_REGISTER,
};
use crate::error::{ModbusError, ModbusResult};

/// Modbus slave/unit address
pub type SlaveId = u8;

/// Function codes served by this slave
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModbusFunction {
    /// 0x03
    ReadHoldingRegisters,
    /// 0x04
    ReadInputRegisters,
    /// 0x06
    WriteSingleRegister,
    /// 0x10
    WriteMultipleRegisters,
}

impl ModbusFunction {
    /// Parse a raw function code.
    ///
    /// Anything outside the four register functions is an Illegal Function.
    pub fn from_u8(code: u8) -> ModbusResult<Self> {
        match code {
            FC_READ_HOLDING_REGISTERS => Ok(Self::ReadHoldingRegisters),
            FC_READ_INPUT_REGISTERS => Ok(Self::ReadInputRegisters),
            FC_WRITE_SINGLE_REGISTER => Ok(Self::WriteSingleRegister),
            FC_WRITE_MULTIPLE_REGISTERS => Ok(Self::WriteMultipleRegisters),
            _ => Err(ModbusError::exception(code, ExceptionCode::IllegalFunction)),
        }
    }

    /// Raw function code
    pub fn to_u8(self) -> u8 {
        match self {
            Self::ReadHoldingRegisters => FC_READ_HOLDING_REGISTERS,
            Self::ReadInputRegisters => FC_READ_INPUT_REGISTERS,
            Self::WriteSingleRegister => FC_WRITE_SINGLE_REGISTER,
            Self::WriteMultipleRegisters => FC_WRITE_MULTIPLE_REGISTERS,
        }
    }

    /// Whether the function mutates the register store
    pub fn is_write(self) -> bool {
        matches!(
            self,
            Self::WriteSingleRegister | Self::WriteMultipleRegisters
        )
    }
}

impl fmt::Display for ModbusFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::ReadHoldingRegisters => "Read Holding Registers",
            Self::ReadInputRegisters => "Read Input Registers",
            Self::WriteSingleRegister => "Write Single Register",
            Self::WriteMultipleRegisters => "Write Multiple Registers",
        };
        write!(f, "{} (0x{:02X})", name, self.to_u8())
    }
}

/// Exception codes a slave may answer with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionCode {
    /// 0x01
    IllegalFunction,
    /// 0x02
    IllegalDataAddress,
    /// 0x03
    IllegalDataValue,
    /// 0x04
    SlaveDeviceFailure,
}

impl ExceptionCode {
    /// Raw exception code
    pub fn to_u8(self) -> u8 {
        match self {
            Self::IllegalFunction => EXCEPTION_ILLEGAL_FUNCTION,
            Self::IllegalDataAddress => EXCEPTION_ILLEGAL_DATA_ADDRESS,
            Self::IllegalDataValue => EXCEPTION_ILLEGAL_DATA_VALUE,
            Self::SlaveDeviceFailure => EXCEPTION_SLAVE_DEVICE_FAILURE,
        }
    }

    /// Parse a raw exception code
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            EXCEPTION_ILLEGAL_FUNCTION => Some(Self::IllegalFunction),
            EXCEPTION_ILLEGAL_DATA_ADDRESS => Some(Self::IllegalDataAddress),
            EXCEPTION_ILLEGAL_DATA_VALUE => Some(Self::IllegalDataValue),
            EXCEPTION_SLAVE_DEVICE_FAILURE => Some(Self::SlaveDeviceFailure),
            _ => None,
        }
    }
}

impl fmt::Display for ExceptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IllegalFunction => "Illegal Function",
            Self::IllegalDataAddress => "Illegal Data Address",
            Self::IllegalDataValue => "Illegal Data Value",
            Self::SlaveDeviceFailure => "Slave Device Failure",
        };
        write!(f, "{} (0x{:02X})", name, self.to_u8())
    }
}

/// Decoded request body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    ReadHoldingRegisters { address: u16, quantity: u16 },
    ReadInputRegisters { address: u16, quantity: u16 },
    WriteSingleRegister { address: u16, value: u16 },
    WriteMultipleRegisters { address: u16, values: Vec<u16> },
}

impl Request {
    /// Function this request was decoded from
    pub fn function(&self) -> ModbusFunction {
        match self {
            Self::ReadHoldingRegisters { .. } => ModbusFunction::ReadHoldingRegisters,
            Self::ReadInputRegisters { .. } => ModbusFunction::ReadInputRegisters,
            Self::WriteSingleRegister { .. } => ModbusFunction::WriteSingleRegister,
            Self::WriteMultipleRegisters { .. } => ModbusFunction::WriteMultipleRegisters,
        }
    }

    /// Register range touched by this request as `(start, count)`
    pub fn range(&self) -> (u16, usize) {
        match self {
            Self::ReadHoldingRegisters { address, quantity }
            | Self::ReadInputRegisters { address, quantity } => (*address, *quantity as usize),
            Self::WriteSingleRegister { address, .. } => (*address, 1),
            Self::WriteMultipleRegisters { address, values } => (*address, values.len()),
        }
    }
}

/// A request together with the unit address it was sent to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusRequest {
    pub slave_id: SlaveId,
    pub request: Request,
}

impl ModbusRequest {
    pub fn new(slave_id: SlaveId, request: Request) -> Self {
        Self { slave_id, request }
    }

    /// Broadcast requests are executed but never answered
    pub fn is_broadcast(&self) -> bool {
        self.slave_id == crate::constants::BROADCAST_ADDRESS
    }
}

/// Response payload, one shape per request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    /// FC03/FC04 values read
    ReadRegisters {
        function: ModbusFunction,
        values: Vec<u16>,
    },
    /// FC06 echo
    WriteSingleRegister { address: u16, value: u16 },
    /// FC16 echo
    WriteMultipleRegisters { address: u16, quantity: u16 },
    /// Request function code (without the 0x80 flag) and the reason
    Exception { function: u8, code: ExceptionCode },
}

/// Response addressed back to the master
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusResponse {
    pub slave_id: SlaveId,
    pub body: ResponseBody,
}

impl ModbusResponse {
    pub fn new(slave_id: SlaveId, body: ResponseBody) -> Self {
        Self { slave_id, body }
    }

    /// Build an exception response
    pub fn exception(slave_id: SlaveId, function: u8, code: ExceptionCode) -> Self {
        Self::new(
            slave_id,
            ResponseBody::Exception {
                function: function & !EXCEPTION_FLAG,
                code,
            },
        )
    }

    /// Function code as it appears on the wire
    pub fn function_code(&self) -> u8 {
        match &self.body {
            ResponseBody::ReadRegisters { function, .. } => function.to_u8(),
            ResponseBody::WriteSingleRegister { .. } => ModbusFunction::WriteSingleRegister.to_u8(),
            ResponseBody::WriteMultipleRegisters { .. } => {
                ModbusFunction::WriteMultipleRegisters.to_u8()
            }
            ResponseBody::Exception { function, .. } => function | EXCEPTION_FLAG,
        }
    }

    pub fn is_exception(&self) -> bool {
        matches!(self.body, ResponseBody::Exception { .. })
    }

    pub fn exception_code(&self) -> Option<ExceptionCode> {
        match self.body {
            ResponseBody::Exception { code, .. } => Some(code),
            _ => None,
        }
    }
}
