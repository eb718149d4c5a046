//! I/O port seam.
//!
//! WMP, WRR and RDR talk to the output port of the selected RAM chip and
//! the I/O ports of the selected ROM chip. No device model ships with the
//! core, so the default [`Unconnected`] port reports every access as
//! unimplemented and the executor surfaces that to its caller.

use thiserror::Error;

/// Devices on the RAM and ROM I/O ports.
///
/// `chip` is the register-control latch value that selected the device.
/// Every method defaults to [`IoError::Unimplemented`], so a device only
/// overrides the ports it models.
pub trait IoPort {
    /// WMP: write A to a RAM output port.
    fn write_ram_port(&mut self, chip: u8, value: u8) -> Result<(), IoError> {
        let _ = (chip, value);
        Err(IoError::Unimplemented("WMP"))
    }

    /// WRR: write A to a ROM I/O port.
    fn write_rom_port(&mut self, chip: u8, value: u8) -> Result<(), IoError> {
        let _ = (chip, value);
        Err(IoError::Unimplemented("WRR"))
    }

    /// RDR: read a ROM I/O port.
    fn read_rom_port(&mut self, chip: u8) -> Result<u8, IoError> {
        let _ = chip;
        Err(IoError::Unimplemented("RDR"))
    }
}

/// No devices attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unconnected;

impl IoPort for Unconnected {}

/// Errors raised by I/O devices.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IoError {
    /// The port operation is recognized but not modelled.
    #[error("{0} is not implemented")]
    Unimplemented(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconnected_reports_every_port() {
        let mut io = Unconnected;
        assert_eq!(io.write_ram_port(0, 1), Err(IoError::Unimplemented("WMP")));
        assert_eq!(io.write_rom_port(0, 1), Err(IoError::Unimplemented("WRR")));
        assert_eq!(io.read_rom_port(0), Err(IoError::Unimplemented("RDR")));
    }

    #[test]
    fn test_device_overrides_one_port() {
        #[derive(Default)]
        struct Latch(u8);

        impl IoPort for Latch {
            fn write_rom_port(&mut self, _chip: u8, value: u8) -> Result<(), IoError> {
                self.0 = value;
                Ok(())
            }
        }

        let mut latch = Latch::default();
        latch.write_rom_port(0x10, 0x7).unwrap();
        assert_eq!(latch.0, 0x7);
        assert!(latch.read_rom_port(0x10).is_err());
    }
}
