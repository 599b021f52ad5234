//! Response encoding: `ModbusResponse` to RTU bytes

use crate::checksum::append_crc;
use crate::constants::{CRC_LEN, MAX_RTU_FRAME_SIZE};
use crate::error::{ModbusError, ModbusResult};
use crate::pdu::{ModbusPdu, PduBuilder};
use crate::protocol::{ModbusResponse, ResponseBody};

/// Build the PDU for a response body
pub fn encode_pdu(body: &ResponseBody) -> ModbusResult<ModbusPdu> {
    match body {
        ResponseBody::ReadRegisters { function, values } => {
            PduBuilder::build_read_response(function.to_u8(), values)
        }
        ResponseBody::WriteSingleRegister { address, value } => {
            PduBuilder::build_write_single_response(*address, *value)
        }
        ResponseBody::WriteMultipleRegisters { address, quantity } => {
            PduBuilder::build_write_multiple_response(*address, *quantity)
        }
        ResponseBody::Exception { function, code } => {
            PduBuilder::build_exception(*function, *code)
        }
    }
}

/// Serialize a response as address, PDU and CRC (low byte first)
pub fn encode_response(response: &ModbusResponse) -> ModbusResult<Vec<u8>> {
    let pdu = encode_pdu(&response.body)?;

    let mut frame = Vec::with_capacity(1 + pdu.len() + CRC_LEN);
    frame.push(response.slave_id);
    frame.extend_from_slice(pdu.as_slice());
    append_crc(&mut frame);

    if frame.len() > MAX_RTU_FRAME_SIZE {
        return Err(ModbusError::internal(format!(
            "response frame of {} bytes exceeds {}",
            frame.len(),
            MAX_RTU_FRAME_SIZE
        )));
    }
    Ok(frame)
}
