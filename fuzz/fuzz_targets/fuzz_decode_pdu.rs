#![no_main]

use libfuzzer_sys::fuzz_target;
use voltage_rtu_slave::decoder::decode_pdu;
use voltage_rtu_slave::Request;

fuzz_target!(|data: &[u8]| {
    if let Ok(Request::WriteMultipleRegisters { values, .. }) = decode_pdu(data) {
        assert!(!values.is_empty() && values.len() <= 123);
        assert_eq!(data.len(), 6 + values.len() * 2);
    }
});
