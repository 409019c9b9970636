//! # Serial transport
//!
//! Byte level access to the serial channel shared with the modem. Any type implementing the blocking
//! [embedded_io] traits [Read], [Write] and [ReadReady] (e.g. a HAL UART) is a [Transport].
//!
//! The transport never applies timeouts on its own. All deadlines are handled by the [Adapter](crate::adapter::Adapter).
use embedded_io::{Error as IoError, ErrorKind, Read, ReadReady, Write};

/// Capability set required from the serial channel
pub trait Transport {
    /// Writes all given bytes, blocking only as long as the hardware buffers are full
    fn write_all(&mut self, data: &[u8]) -> Result<(), ErrorKind>;

    /// Flushes pending output
    fn flush(&mut self) -> Result<(), ErrorKind>;

    /// Returns true if at least one byte can be read without blocking
    fn byte_available(&mut self) -> Result<bool, ErrorKind>;

    /// Reads a single byte. Should only be called if [Transport::byte_available] returned true.
    fn read_byte(&mut self) -> Result<u8, ErrorKind>;
}

impl<S: Read + Write + ReadReady> Transport for S {
    fn write_all(&mut self, data: &[u8]) -> Result<(), ErrorKind> {
        Write::write_all(self, data).map_err(|e| e.kind())
    }

    fn flush(&mut self) -> Result<(), ErrorKind> {
        Write::flush(self).map_err(|e| e.kind())
    }

    fn byte_available(&mut self) -> Result<bool, ErrorKind> {
        self.read_ready().map_err(|e| e.kind())
    }

    fn read_byte(&mut self) -> Result<u8, ErrorKind> {
        let mut byte = [0x0; 1];

        match self.read(&mut byte).map_err(|e| e.kind())? {
            // Reader signaled EOF although data was announced as ready
            0 => Err(ErrorKind::Other),
            _ => Ok(byte[0]),
        }
    }
}
