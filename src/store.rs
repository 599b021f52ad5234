//! Register database served by the slave
//!
//! A fixed-size array of 16-bit registers addressed from 0. Every access is
//! bounds-checked against the whole requested range before anything is read
//! or written, so a rejected write leaves the store untouched.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::constants::DEFAULT_REGISTER_VALUE;
use crate::error::{ModbusError, ModbusResult};
use crate::protocol::ExceptionCode;

/// Register storage capability used by the dispatcher.
///
/// Out-of-range accesses fail with `Exception(IllegalDataAddress)`. The
/// `function` reported in that error is 0; the dispatcher rewrites it with the
/// request's function code.
pub trait RegisterStore: Send {
    /// Number of registers
    fn size(&self) -> usize;

    /// Read `count` registers starting at `start`
    fn read(&self, start: u16, count: usize) -> ModbusResult<Vec<u16>>;

    /// Write `values` starting at `start`, all or nothing
    fn write(&mut self, start: u16, values: &[u16]) -> ModbusResult<()>;
}

/// Check that `start..start + count` lies inside a store of `size` registers
pub fn check_range(size: usize, start: u16, count: usize) -> ModbusResult<()> {
    match (start as usize).checked_add(count) {
        Some(end) if end <= size => Ok(()),
        _ => Err(ModbusError::exception(0, ExceptionCode::IllegalDataAddress)),
    }
}

/// Owned register array
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterBank {
    registers: Vec<u16>,
}

impl RegisterBank {
    /// `size` registers, all zero
    pub fn new(size: usize) -> Self {
        Self::with_default(size, DEFAULT_REGISTER_VALUE)
    }

    /// `size` registers, all set to `value`
    pub fn with_default(size: usize, value: u16) -> Self {
        Self {
            registers: vec![value; size],
        }
    }

    pub fn get(&self, address: u16) -> Option<u16> {
        self.registers.get(address as usize).copied()
    }

    pub fn set(&mut self, address: u16, value: u16) -> ModbusResult<()> {
        check_range(self.registers.len(), address, 1)?;
        self.registers[address as usize] = value;
        Ok(())
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.registers
    }
}

impl RegisterStore for RegisterBank {
    fn size(&self) -> usize {
        self.registers.len()
    }

    fn read(&self, start: u16, count: usize) -> ModbusResult<Vec<u16>> {
        check_range(self.registers.len(), start, count)?;
        let start = start as usize;
        Ok(self.registers[start..start + count].to_vec())
    }

    fn write(&mut self, start: u16, values: &[u16]) -> ModbusResult<()> {
        check_range(self.registers.len(), start, values.len())?;
        let start = start as usize;
        self.registers[start..start + values.len()].copy_from_slice(values);
        Ok(())
    }
}

/// Register bank shared between the slave loop and a local operator.
///
/// Clones refer to the same registers. Every access takes the lock, so an
/// operator adjustment never interleaves with a multi-register write.
#[derive(Debug, Clone)]
pub struct SharedRegisterBank {
    inner: Arc<Mutex<RegisterBank>>,
}

impl SharedRegisterBank {
    pub fn new(size: usize) -> Self {
        Self::from_bank(RegisterBank::new(size))
    }

    pub fn from_bank(bank: RegisterBank) -> Self {
        Self {
            inner: Arc::new(Mutex::new(bank)),
        }
    }

    fn lock(&self) -> ModbusResult<MutexGuard<'_, RegisterBank>> {
        self.inner
            .lock()
            .map_err(|_| ModbusError::internal("register bank lock poisoned"))
    }

    /// Add one to a register, wrapping at 0xFFFF. Returns `(before, after)`.
    pub fn increment(&self, address: u16) -> ModbusResult<(u16, u16)> {
        self.adjust(address, |v| v.wrapping_add(1))
    }

    /// Subtract one from a register, wrapping at 0. Returns `(before, after)`.
    pub fn decrement(&self, address: u16) -> ModbusResult<(u16, u16)> {
        self.adjust(address, |v| v.wrapping_sub(1))
    }

    fn adjust(&self, address: u16, op: impl FnOnce(u16) -> u16) -> ModbusResult<(u16, u16)> {
        let mut bank = self.lock()?;
        let before = bank
            .get(address)
            .ok_or_else(|| ModbusError::exception(0, ExceptionCode::IllegalDataAddress))?;
        let after = op(before);
        bank.set(address, after)?;
        Ok((before, after))
    }

    /// Copy of `count` registers from `start`
    pub fn snapshot(&self, start: u16, count: usize) -> ModbusResult<Vec<u16>> {
        self.lock()?.read(start, count)
    }
}

impl RegisterStore for SharedRegisterBank {
    fn size(&self) -> usize {
        // A poisoned lock still reports the bank's size
        match self.inner.lock() {
            Ok(bank) => bank.size(),
            Err(poisoned) => poisoned.into_inner().size(),
        }
    }

    fn read(&self, start: u16, count: usize) -> ModbusResult<Vec<u16>> {
        self.lock()?.read(start, count)
    }

    fn write(&mut self, start: u16, values: &[u16]) -> ModbusResult<()> {
        self.lock()?.write(start, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SIZE: usize = 5000;

    #[test]
    fn test_new_bank_is_zeroed() {
        let bank = RegisterBank::new(SIZE);
        assert_eq!(bank.size(), SIZE);
        assert!(bank.as_slice().iter().all(|&v| v == 0));

        let bank = RegisterBank::with_default(4, 0xBEEF);
        assert_eq!(bank.read(0, 4).unwrap(), vec![0xBEEF; 4]);
    }

    #[test]
    fn test_inclusive_upper_bound() {
        let mut bank = RegisterBank::new(SIZE);
        // start + count == N is the last valid range
        assert_eq!(bank.read(4998, 2).unwrap(), vec![0, 0]);
        assert!(bank.write(4999, &[7]).is_ok());
        assert_eq!(bank.get(4999), Some(7));

        let err = bank.read(4999, 2).unwrap_err();
        assert_eq!(err.exception_code(), Some(ExceptionCode::IllegalDataAddress));
        let err = bank.read(5000, 1).unwrap_err();
        assert_eq!(err.exception_code(), Some(ExceptionCode::IllegalDataAddress));
    }

    #[test]
    fn test_range_overflow_is_rejected() {
        assert!(check_range(usize::MAX, u16::MAX, usize::MAX).is_err());
        assert!(check_range(65536, u16::MAX, 1).is_ok());
    }

    #[test]
    fn test_rejected_write_leaves_bank_unchanged() {
        let mut bank = RegisterBank::new(10);
        bank.write(0, &[1, 2, 3]).unwrap();
        let before = bank.clone();

        assert!(bank.write(8, &[9, 9, 9]).is_err());
        assert_eq!(bank, before);
    }

    #[test]
    fn test_shared_increment_decrement_wraps() {
        let bank = SharedRegisterBank::new(SIZE);
        assert_eq!(bank.decrement(0).unwrap(), (0, 0xFFFF));
        assert_eq!(bank.increment(0).unwrap(), (0xFFFF, 0));
        assert_eq!(bank.increment(0).unwrap(), (0, 1));
        assert_eq!(bank.snapshot(0, 2).unwrap(), vec![1, 0]);

        assert!(bank.increment(5000).is_err());
    }

    #[test]
    fn test_shared_clones_see_writes() {
        let bank = SharedRegisterBank::new(16);
        let mut writer = bank.clone();
        writer.write(3, &[0x1234, 0x5678]).unwrap();
        assert_eq!(bank.read(3, 2).unwrap(), vec![0x1234, 0x5678]);
    }

    #[test]
    fn test_poisoned_lock_is_internal_error() {
        let bank = SharedRegisterBank::new(8);
        let inner = bank.inner.clone();
        let _ = std::thread::spawn(move || {
            let _guard = inner.lock().unwrap();
            panic!("poison the register lock");
        })
        .join();

        let err = bank.read(0, 1).unwrap_err();
        assert!(matches!(err, ModbusError::Internal { .. }));
        assert_eq!(err.exception_code(), Some(ExceptionCode::SlaveDeviceFailure));
        assert_eq!(bank.size(), 8);
    }

    proptest! {
        #[test]
        fn prop_write_then_read(
            start in 0u16..5000,
            values in proptest::collection::vec(any::<u16>(), 1..=123),
        ) {
            let mut bank = RegisterBank::new(SIZE);
            let in_range = start as usize + values.len() <= SIZE;
            let result = bank.write(start, &values);
            if in_range {
                prop_assert!(result.is_ok());
                prop_assert_eq!(bank.read(start, values.len()).unwrap(), values);
            } else {
                prop_assert!(result.is_err());
                prop_assert!(bank.as_slice().iter().all(|&v| v == 0));
            }
        }

        #[test]
        fn prop_out_of_range_read_fails(start in 0u16..=u16::MAX, count in 1usize..=125) {
            let bank = RegisterBank::new(SIZE);
            let result = bank.read(start, count);
            prop_assert_eq!(result.is_ok(), start as usize + count <= SIZE);
        }
    }
}
