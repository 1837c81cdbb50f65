//! The seam between the framer and a USB host stack.

use std::time::Duration;

use siusb_common::SiUsbResult;

/// Blocking bulk-transfer primitives of an opened board.
///
/// Implementations map their stack's timeout to
/// [`SiUsbError::TransportTimeout`](siusb_common::SiUsbError::TransportTimeout)
/// and every other failure to
/// [`SiUsbError::TransportError`](siusb_common::SiUsbError::TransportError).
pub trait UsbBackend: Send {
    /// Writes `data` to `endpoint`, returning how many bytes were accepted.
    fn write_bulk(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> SiUsbResult<usize>;

    /// Reads up to `buf.len()` bytes from `endpoint`, returning how many arrived.
    fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> SiUsbResult<usize>;

    /// Releases the underlying handle. The next transfer may reopen it.
    fn release(&mut self) -> SiUsbResult<()> {
        Ok(())
    }

    /// Issues a USB port reset.
    fn reset(&mut self) -> SiUsbResult<()> {
        Ok(())
    }
}

impl<B: UsbBackend + ?Sized> UsbBackend for Box<B> {
    fn write_bulk(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> SiUsbResult<usize> {
        (**self).write_bulk(endpoint, data, timeout)
    }

    fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> SiUsbResult<usize> {
        (**self).read_bulk(endpoint, buf, timeout)
    }

    fn release(&mut self) -> SiUsbResult<()> {
        (**self).release()
    }

    fn reset(&mut self) -> SiUsbResult<()> {
        (**self).reset()
    }
}
