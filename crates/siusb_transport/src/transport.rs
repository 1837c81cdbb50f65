//! Serialized logical transfers over one board connection.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use siusb_common::SiUsbResult;

use crate::backend::UsbBackend;
use crate::framer::{read_chunked, write_chunked};
use crate::subsystem::Subsystem;

/// Bounds applied to individual bulk transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Bound for ordinary header and data packets.
    pub transfer: Duration,
    /// Bound for packets of a bitstream download, which the board may
    /// accept slowly.
    pub firmware: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            transfer: Duration::from_secs(1),
            firmware: Duration::from_secs(5),
        }
    }
}

/// Owns a board connection and serializes logical transfers on it.
///
/// The board has a single command-header slot, so a header and its data
/// must never be interleaved with another transfer's. Each [`read`] and
/// [`write`] holds the lock from the first header to the last packet. The
/// lock is a plain [`Mutex`]: the framer only ever sees the guarded
/// backend, so there is no path that could take it twice.
///
/// [`read`]: Transport::read
/// [`write`]: Transport::write
#[derive(Debug)]
pub struct Transport<B> {
    backend: Mutex<B>,
    timeouts: Timeouts,
}

impl<B: UsbBackend> Transport<B> {
    /// Wraps a backend with default timeouts.
    pub fn new(backend: B) -> Self {
        Self::with_timeouts(backend, Timeouts::default())
    }

    /// Wraps a backend with explicit timeouts.
    pub fn with_timeouts(backend: B, timeouts: Timeouts) -> Self {
        Self {
            backend: Mutex::new(backend),
            timeouts,
        }
    }

    /// Returns the configured timeouts.
    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    // A panic mid-transfer leaves the wire state as undefined as a timeout
    // does; the next transfer starts with a fresh header either way.
    fn lock(&self) -> MutexGuard<'_, B> {
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes `data` to `subsystem` starting at `address`.
    pub fn write(&self, subsystem: Subsystem, address: u32, data: &[u8]) -> SiUsbResult<()> {
        self.write_with_timeout(subsystem, address, data, self.timeouts.transfer)
    }

    /// Writes `data` using `timeout` for every packet.
    pub fn write_with_timeout(
        &self,
        subsystem: Subsystem,
        address: u32,
        data: &[u8],
        timeout: Duration,
    ) -> SiUsbResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        log::debug!(
            "write {} bytes to {} at 0x{:08x}",
            data.len(),
            subsystem,
            address
        );
        let mut backend = self.lock();
        write_chunked(&mut *backend, &subsystem.descriptor(), address, data, timeout)
    }

    /// Reads `size` bytes from `subsystem` starting at `address`.
    ///
    /// A zero-size read returns immediately without touching the wire.
    pub fn read(&self, subsystem: Subsystem, address: u32, size: usize) -> SiUsbResult<Vec<u8>> {
        if size == 0 {
            return Ok(Vec::new());
        }
        log::debug!("read {} bytes from {} at 0x{:08x}", size, subsystem, address);
        let mut backend = self.lock();
        read_chunked(
            &mut *backend,
            &subsystem.descriptor(),
            address,
            size,
            self.timeouts.transfer,
        )
    }

    /// Releases the backend's USB handle.
    pub fn release(&self) -> SiUsbResult<()> {
        self.lock().release()
    }

    /// Issues a USB reset through the backend.
    pub fn reset(&self) -> SiUsbResult<()> {
        self.lock().reset()
    }

    /// Consumes the transport and returns the backend.
    pub fn into_inner(self) -> B {
        self.backend
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
