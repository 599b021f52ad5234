//! Request decoding
//!
//! Turns a CRC-validated frame into a typed [`ModbusRequest`]. Frames for
//! another unit are ignored. Malformed PDUs become protocol exceptions that
//! the dispatcher answers:
//!
//! | Problem | Exception |
//! |---------|-----------|
//! | function code not served | Illegal Function (0x01) |
//! | wrong PDU length, quantity out of limits, byte count mismatch | Illegal Data Value (0x03) |
//!
//! Address ranges are not checked here; they depend on the store size.

use bytes::Buf;
use tracing::debug;

use crate::constants::{BROADCAST_ADDRESS, MAX_READ_REGISTERS, MAX_WRITE_REGISTERS};
use crate::error::{ModbusError, ModbusResult};
use crate::frame::RtuFrame;
use crate::protocol::{ExceptionCode, ModbusFunction, ModbusRequest, Request, SlaveId};

/// Decodes frames addressed to one unit (plus broadcast)
#[derive(Debug, Clone, Copy)]
pub struct RequestDecoder {
    unit_id: SlaveId,
}

impl RequestDecoder {
    pub fn new(unit_id: SlaveId) -> Self {
        Self { unit_id }
    }

    pub fn unit_id(&self) -> SlaveId {
        self.unit_id
    }

    /// Whether a frame sent to `slave_id` is ours to execute
    pub fn accepts(&self, slave_id: SlaveId) -> bool {
        slave_id == self.unit_id || slave_id == BROADCAST_ADDRESS
    }

    /// Decode a frame.
    ///
    /// Returns `None` for frames addressed to another unit.
    pub fn decode(&self, frame: &RtuFrame) -> Option<ModbusResult<ModbusRequest>> {
        let slave_id = frame.slave_id();
        if !self.accepts(slave_id) {
            debug!(
                "Ignoring frame for unit {} (we are {})",
                slave_id, self.unit_id
            );
            return None;
        }

        Some(decode_pdu(frame.pdu()).map(|request| ModbusRequest::new(slave_id, request)))
    }
}

/// Decode a request PDU (function code followed by data)
pub fn decode_pdu(pdu: &[u8]) -> ModbusResult<Request> {
    let (&fc, mut data) = pdu
        .split_first()
        .ok_or_else(|| ModbusError::frame("empty PDU"))?;
    let function = ModbusFunction::from_u8(fc)?;
    let invalid = || ModbusError::exception(fc, ExceptionCode::IllegalDataValue);

    let request = match function {
        ModbusFunction::ReadHoldingRegisters | ModbusFunction::ReadInputRegisters => {
            if data.len() != 4 {
                return Err(invalid());
            }
            let address = data.get_u16();
            let quantity = data.get_u16();
            if quantity == 0 || quantity as usize > MAX_READ_REGISTERS {
                return Err(invalid());
            }
            if function == ModbusFunction::ReadHoldingRegisters {
                Request::ReadHoldingRegisters { address, quantity }
            } else {
                Request::ReadInputRegisters { address, quantity }
            }
        }
        ModbusFunction::WriteSingleRegister => {
            if data.len() != 4 {
                return Err(invalid());
            }
            Request::WriteSingleRegister {
                address: data.get_u16(),
                value: data.get_u16(),
            }
        }
        ModbusFunction::WriteMultipleRegisters => {
            if data.len() < 5 {
                return Err(invalid());
            }
            let address = data.get_u16();
            let quantity = data.get_u16() as usize;
            let byte_count = data.get_u8() as usize;
            if quantity == 0
                || quantity > MAX_WRITE_REGISTERS
                || byte_count != quantity * 2
                || data.remaining() != byte_count
            {
                return Err(invalid());
            }
            let values = (0..quantity).map(|_| data.get_u16()).collect();
            Request::WriteMultipleRegisters { address, values }
        }
    };

    debug!("Decoded {} request: {:?}", function, request);
    Ok(request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::append_crc;
    use bytes::Bytes;

    fn frame(body: &[u8]) -> RtuFrame {
        let mut raw = body.to_vec();
        append_crc(&mut raw);
        RtuFrame::parse(Bytes::from(raw)).unwrap()
    }

    fn exception_of(result: ModbusResult<Request>) -> (u8, ExceptionCode) {
        match result {
            Err(ModbusError::Exception { function, code }) => (function, code),
            other => panic!("expected exception, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_read_holding() {
        let decoder = RequestDecoder::new(1);
        let req = decoder
            .decode(&frame(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x02]))
            .unwrap()
            .unwrap();
        assert_eq!(req.slave_id, 1);
        assert_eq!(
            req.request,
            Request::ReadHoldingRegisters {
                address: 0,
                quantity: 2
            }
        );
    }

    #[test]
    fn test_decode_read_input() {
        let req = decode_pdu(&[0x04, 0x13, 0x87, 0x00, 0x7D]).unwrap();
        assert_eq!(
            req,
            Request::ReadInputRegisters {
                address: 4999,
                quantity: 125
            }
        );
    }

    #[test]
    fn test_decode_write_single() {
        let req = decode_pdu(&[0x06, 0x00, 0x01, 0xAB, 0xCD]).unwrap();
        assert_eq!(
            req,
            Request::WriteSingleRegister {
                address: 1,
                value: 0xABCD
            }
        );
    }

    #[test]
    fn test_decode_write_multiple() {
        let req =
            decode_pdu(&[0x10, 0x00, 0x00, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01, 0x02]).unwrap();
        assert_eq!(
            req,
            Request::WriteMultipleRegisters {
                address: 0,
                values: vec![0x000A, 0x0102]
            }
        );
    }

    #[test]
    fn test_foreign_unit_ignored() {
        let decoder = RequestDecoder::new(1);
        assert!(decoder
            .decode(&frame(&[0x02, 0x03, 0x00, 0x00, 0x00, 0x01]))
            .is_none());
        assert!(decoder.accepts(0));
        assert!(decoder.accepts(1));
        assert!(!decoder.accepts(247));
    }

    #[test]
    fn test_broadcast_accepted() {
        let decoder = RequestDecoder::new(1);
        let req = decoder
            .decode(&frame(&[0x00, 0x06, 0x00, 0x01, 0x00, 0x07]))
            .unwrap()
            .unwrap();
        assert!(req.is_broadcast());
    }

    #[test]
    fn test_unsupported_function() {
        assert_eq!(
            exception_of(decode_pdu(&[0x2B, 0x00, 0x00, 0x00, 0x01])),
            (0x2B, ExceptionCode::IllegalFunction)
        );
        assert_eq!(
            exception_of(decode_pdu(&[0x01, 0x00, 0x00, 0x00, 0x01])),
            (0x01, ExceptionCode::IllegalFunction)
        );
    }

    #[test]
    fn test_read_quantity_limits() {
        let (_, code) = exception_of(decode_pdu(&[0x03, 0x00, 0x00, 0x00, 0x00]));
        assert_eq!(code, ExceptionCode::IllegalDataValue);
        let (_, code) = exception_of(decode_pdu(&[0x03, 0x00, 0x00, 0x00, 0x7E]));
        assert_eq!(code, ExceptionCode::IllegalDataValue);
        assert!(decode_pdu(&[0x03, 0x00, 0x00, 0x00, 0x7D]).is_ok());
    }

    #[test]
    fn test_wrong_pdu_length() {
        let (fc, code) = exception_of(decode_pdu(&[0x03, 0x00, 0x00, 0x00]));
        assert_eq!((fc, code), (0x03, ExceptionCode::IllegalDataValue));
        let (_, code) = exception_of(decode_pdu(&[0x06, 0x00, 0x00, 0x00, 0x01, 0x00]));
        assert_eq!(code, ExceptionCode::IllegalDataValue);
        let (_, code) = exception_of(decode_pdu(&[0x10, 0x00, 0x00, 0x00]));
        assert_eq!(code, ExceptionCode::IllegalDataValue);
    }

    #[test]
    fn test_write_multiple_byte_count_mismatch() {
        // byte count 3 for 2 registers
        let (fc, code) = exception_of(decode_pdu(&[
            0x10, 0x00, 0x00, 0x00, 0x02, 0x03, 0x00, 0x0A, 0x01,
        ]));
        assert_eq!((fc, code), (0x10, ExceptionCode::IllegalDataValue));

        // byte count agrees with quantity but payload is short
        let (_, code) = exception_of(decode_pdu(&[
            0x10, 0x00, 0x00, 0x00, 0x02, 0x04, 0x00, 0x0A, 0x01,
        ]));
        assert_eq!(code, ExceptionCode::IllegalDataValue);
    }

    #[test]
    fn test_write_multiple_quantity_limits() {
        let mut pdu = vec![0x10, 0x00, 0x00, 0x00, 124, 248];
        pdu.extend(std::iter::repeat(0).take(248));
        let (_, code) = exception_of(decode_pdu(&pdu));
        assert_eq!(code, ExceptionCode::IllegalDataValue);

        let mut pdu = vec![0x10, 0x00, 0x00, 0x00, 123, 246];
        pdu.extend(std::iter::repeat(0).take(246));
        match decode_pdu(&pdu).unwrap() {
            Request::WriteMultipleRegisters { values, .. } => assert_eq!(values.len(), 123),
            other => panic!("unexpected request {:?}", other),
        }
    }
}
