#![no_main]

use std::time::Duration;

use libfuzzer_sys::fuzz_target;
use voltage_rtu_slave::checksum::append_crc;
use voltage_rtu_slave::transport::{ByteTransport, TransportStats};
use voltage_rtu_slave::{ManualClock, ModbusResult, ModbusRtuSlave, RegisterBank, SlaveConfig};

struct NullLine;

impl ByteTransport for NullLine {
    async fn read(&mut self, _buf: &mut [u8], _timeout: Duration) -> ModbusResult<usize> {
        Ok(0)
    }

    async fn write(&mut self, _frame: &[u8]) -> ModbusResult<()> {
        Ok(())
    }

    fn stats(&self) -> TransportStats {
        TransportStats::default()
    }
}

fuzz_target!(|data: &[u8]| {
    let Ok(mut slave) = ModbusRtuSlave::new(
        SlaveConfig::default(),
        NullLine,
        ManualClock::new(),
        RegisterBank::new(5000),
    ) else {
        return;
    };

    // Raw bytes almost never carry a valid CRC; also try them with one appended
    let mut framed = data.to_vec();
    append_crc(&mut framed);

    for candidate in [data, framed.as_slice()] {
        if let Some(response) = slave.process_frame(candidate) {
            assert!(response.len() <= 256);
            assert!(voltage_rtu_slave::checksum::verify(&response));
            assert_ne!(candidate[0], 0, "broadcast answered");
        }
    }
});
