use crate::error::ImuError;
use i2cdev::core::I2CDevice;
use i2cdev::linux::{LinuxI2CDevice, LinuxI2CError};

/// # Explanation
/// The byte-sink/source capability the framer and the session manager are
/// written against. The sensor hub speaks a length-prefixed protocol, so
/// partial transfers are never acceptable: a transfer either moves exactly
/// the requested number of octets or it is an error. The two-wire bus on the
/// board is one implementation; the test suite drives the same code with
/// in-memory and file-backed implementations.
pub trait BusDevice {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ImuError>;
    fn write_exact(&mut self, buf: &[u8]) -> Result<(), ImuError>;
}

impl<B: BusDevice + ?Sized> BusDevice for &mut B {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ImuError> {
        (**self).read_exact(buf)
    }

    fn write_exact(&mut self, buf: &[u8]) -> Result<(), ImuError> {
        (**self).write_exact(buf)
    }
}

/// An exclusive handle to one slave on a Linux I2C bus. The handle is the
/// only owner of the device file; dropping it releases the bus on every exit
/// path.
pub struct I2cBus {
    device: LinuxI2CDevice,
}

impl I2cBus {
    /// # Explanation
    /// Opens /dev/i2c-{bus} and binds it to the given 7-bit slave address.
    pub fn open(bus: u8, addr: u16) -> Result<Self, ImuError> {
        let path = format!("/dev/i2c-{}", bus);
        let device = LinuxI2CDevice::new(&path, addr)?;
        log::debug!("Opened {} at address 0x{:02X}.", path, addr);
        Ok(I2cBus { device })
    }
}

impl BusDevice for I2cBus {
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), ImuError> {
        // An I2C transfer is all-or-nothing at the driver level.
        self.device.read(buf)?;
        Ok(())
    }

    fn write_exact(&mut self, buf: &[u8]) -> Result<(), ImuError> {
        self.device.write(buf)?;
        Ok(())
    }
}

impl From<LinuxI2CError> for ImuError {
    fn from(e: LinuxI2CError) -> Self {
        ImuError::Bus(e.to_string())
    }
}
