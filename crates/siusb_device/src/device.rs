//! One SILAB USB board.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rusb::{Device, GlobalContext};
use serde::Serialize;
use siusb_bitstream::{load_bitstream, Bitstream};
use siusb_common::{SiUsbError, SiUsbResult};
use siusb_transport::{Subsystem, Timeouts, Transport, UsbBackend};

use crate::eeprom::{
    board_digits, decode_board_id, decode_name, decode_text, EEPROM_ID_ADDR, EEPROM_ID_SIZE,
    EEPROM_NAME_ADDR, EEPROM_NAME_SIZE,
};
use crate::usb::{check_ids, find_devices, RusbBackend, UsbIds};
use crate::xilinx::{
    ConfLine, ConfLines, ConfigPhase, ConfigStatus, Delay, ThreadDelay, XilinxConfigurator,
};

/// Identity of a board as read from its EEPROM and firmware.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardInfo {
    /// Board id (markers trimmed).
    pub board_id: String,
    /// Board name.
    pub board_name: String,
    /// Firmware version string.
    pub fw_version: String,
}

/// A connection to one board.
///
/// All transfers go through one [`Transport`], so a device can be shared
/// between threads (`Arc<SiUsbDevice>`) and logical transfers stay atomic on
/// the wire. Use one instance per physical board.
///
/// Call [`dispose`](Self::dispose) to hand the board to another process;
/// the device stays usable and reopens on its next transfer.
pub struct SiUsbDevice<B: UsbBackend = RusbBackend> {
    transport: Transport<B>,
    delay: Arc<dyn Delay>,
    disposed: AtomicBool,
}

impl<B: UsbBackend> std::fmt::Debug for SiUsbDevice<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SiUsbDevice")
            .field("timeouts", &self.transport.timeouts())
            .field("disposed", &self.disposed.load(Ordering::Relaxed))
            .finish()
    }
}

impl SiUsbDevice<RusbBackend> {
    /// Opens the first attached board.
    pub fn open() -> SiUsbResult<Self> {
        Self::open_with(UsbIds::default(), Timeouts::default())
    }

    /// Opens the first attached device with `ids`.
    pub fn open_with(ids: UsbIds, timeouts: Timeouts) -> SiUsbResult<Self> {
        let device = find_devices(ids)?.into_iter().next().ok_or_else(|| {
            SiUsbError::DeviceNotFound(format!(
                "no device with id {:04x}:{:04x}",
                ids.vendor_id, ids.product_id
            ))
        })?;
        Self::open_device(device, ids, timeouts)
    }

    /// Opens a specific libusb device, checking that it carries `ids`.
    pub fn open_device(
        device: Device<GlobalContext>,
        ids: UsbIds,
        timeouts: Timeouts,
    ) -> SiUsbResult<Self> {
        check_ids(&device, ids)?;
        let backend = RusbBackend::open(device)?;
        Ok(Self::with_timeouts(backend, timeouts))
    }

    /// Opens every attached board. Returns an empty list if there is none.
    pub fn list_boards(ids: UsbIds, timeouts: Timeouts) -> SiUsbResult<Vec<Self>> {
        find_devices(ids)?
            .into_iter()
            .map(|device| Self::open_device(device, ids, timeouts))
            .collect()
    }

    /// Opens the one attached board whose EEPROM board id has the digits `board_id`.
    ///
    /// Boards that cannot be opened or read are skipped.
    pub fn from_board_id(board_id: &str, ids: UsbIds, timeouts: Timeouts) -> SiUsbResult<Self> {
        let devices = find_devices(ids)?;
        if devices.is_empty() {
            return Err(SiUsbError::DeviceNotFound(format!(
                "no device with id {:04x}:{:04x}",
                ids.vendor_id, ids.product_id
            )));
        }
        let boards = devices
            .into_iter()
            .filter_map(|device| match Self::open_device(device, ids, timeouts) {
                Ok(board) => Some(board),
                Err(e) => {
                    log::warn!("skipping board: {e}");
                    None
                }
            });
        select_board(boards, board_id)
    }
}

/// Picks the single board whose id digits equal `board_id`.
///
/// Boards whose id cannot be read are skipped; non-matching boards are
/// disposed. Fails with [`SiUsbError::DeviceNotFound`] if nothing matches and
/// [`SiUsbError::AmbiguousDevice`] if more than one board does.
pub fn select_board<B: UsbBackend>(
    boards: impl IntoIterator<Item = SiUsbDevice<B>>,
    board_id: &str,
) -> SiUsbResult<SiUsbDevice<B>> {
    let wanted = board_id.trim();
    let mut matches = Vec::new();
    for board in boards {
        match board.board_id() {
            Ok(id) if board_digits(&id) == wanted => matches.push(board),
            Ok(id) => {
                log::debug!("board id {id} does not match {wanted}");
                board.dispose();
            }
            Err(e) => log::warn!("cannot read board id: {e}"),
        }
    }
    match matches.len() {
        0 => Err(SiUsbError::DeviceNotFound(format!(
            "no device with board ID {wanted}"
        ))),
        1 => Ok(matches.remove(0)),
        count => Err(SiUsbError::AmbiguousDevice {
            board_id: wanted.to_string(),
            count,
        }),
    }
}

impl<B: UsbBackend> SiUsbDevice<B> {
    /// Wraps an opened backend with default timeouts.
    pub fn with_backend(backend: B) -> Self {
        Self::with_timeouts(backend, Timeouts::default())
    }

    /// Wraps an opened backend.
    pub fn with_timeouts(backend: B, timeouts: Timeouts) -> Self {
        Self {
            transport: Transport::with_timeouts(backend, timeouts),
            delay: Arc::new(ThreadDelay),
            disposed: AtomicBool::new(false),
        }
    }

    /// Replaces the delay used between configuration phases.
    pub fn with_delay(mut self, delay: Arc<dyn Delay>) -> Self {
        self.delay = delay;
        self
    }

    /// The underlying transport.
    pub fn transport(&self) -> &Transport<B> {
        &self.transport
    }

    fn mark_in_use(&self) {
        self.disposed.store(false, Ordering::Relaxed);
    }

    /// Writes to the external bus.
    pub fn write_external(&self, address: u32, data: &[u8]) -> SiUsbResult<()> {
        self.mark_in_use();
        self.transport.write(Subsystem::External, address, data)
    }

    /// Reads from the external bus.
    pub fn read_external(&self, address: u32, size: usize) -> SiUsbResult<Vec<u8>> {
        self.mark_in_use();
        self.transport.read(Subsystem::External, address, size)
    }

    /// Streams a block through the GPIF fast path.
    pub fn fast_block_write(&self, data: &[u8]) -> SiUsbResult<()> {
        self.mark_in_use();
        self.transport.write(Subsystem::FastBlock, 0, data)
    }

    /// Reads a block through the GPIF fast path.
    pub fn fast_block_read(&self, size: usize) -> SiUsbResult<Vec<u8>> {
        self.mark_in_use();
        self.transport.read(Subsystem::FastBlock, 0, size)
    }

    /// Writes to the EEPROM.
    pub fn write_eeprom(&self, address: u32, data: &[u8]) -> SiUsbResult<()> {
        self.mark_in_use();
        self.transport.write(Subsystem::Eeprom, address, data)
    }

    /// Reads from the EEPROM.
    pub fn read_eeprom(&self, address: u32, size: usize) -> SiUsbResult<Vec<u8>> {
        self.mark_in_use();
        self.transport.read(Subsystem::Eeprom, address, size)
    }

    /// Writes to the I2C bus.
    pub fn write_i2c(&self, address: u32, data: &[u8]) -> SiUsbResult<()> {
        self.mark_in_use();
        self.transport.write(Subsystem::I2c, address, data)
    }

    /// Reads from the I2C bus.
    pub fn read_i2c(&self, address: u32, size: usize) -> SiUsbResult<Vec<u8>> {
        self.mark_in_use();
        self.transport.read(Subsystem::I2c, address, size)
    }

    /// Writes microcontroller memory.
    pub fn write_mcu(&self, address: u32, data: &[u8]) -> SiUsbResult<()> {
        self.mark_in_use();
        self.transport.write(Subsystem::Mcu, address, data)
    }

    /// Reads microcontroller memory.
    pub fn read_mcu(&self, address: u32, size: usize) -> SiUsbResult<Vec<u8>> {
        self.mark_in_use();
        self.transport.read(Subsystem::Mcu, address, size)
    }

    /// Writes to any subsystem.
    pub fn write(&self, subsystem: Subsystem, address: u32, data: &[u8]) -> SiUsbResult<()> {
        self.mark_in_use();
        self.transport.write(subsystem, address, data)
    }

    /// Reads from any subsystem.
    pub fn read(&self, subsystem: Subsystem, address: u32, size: usize) -> SiUsbResult<Vec<u8>> {
        self.mark_in_use();
        self.transport.read(subsystem, address, size)
    }

    /// Firmware version reported by the microcontroller.
    pub fn fw_version(&self) -> SiUsbResult<String> {
        let raw = self.read(Subsystem::FirmwareVersion, 0, 2)?;
        Ok(decode_text(&raw))
    }

    /// Board name from the EEPROM.
    pub fn board_name(&self) -> SiUsbResult<String> {
        let raw = self.read_eeprom(EEPROM_NAME_ADDR, EEPROM_NAME_SIZE)?;
        Ok(decode_name(&raw))
    }

    /// Board id from the EEPROM.
    pub fn board_id(&self) -> SiUsbResult<String> {
        let raw = self.read_eeprom(EEPROM_ID_ADDR, EEPROM_ID_SIZE)?;
        Ok(decode_board_id(&raw))
    }

    /// Decimal digits of the board id, as used for selection.
    pub fn board_number(&self) -> SiUsbResult<String> {
        Ok(board_digits(&self.board_id()?))
    }

    /// Reads id, name and firmware version.
    pub fn info(&self) -> SiUsbResult<BoardInfo> {
        Ok(BoardInfo {
            board_id: self.board_id()?,
            board_name: self.board_name()?,
            fw_version: self.fw_version()?,
        })
    }

    fn configurator(&self) -> XilinxConfigurator<'_, B> {
        self.mark_in_use();
        XilinxConfigurator::new(&self.transport, self.delay.as_ref())
    }

    /// Loads a `.bit` or `.bin` file into the FPGA.
    ///
    /// During bit generation the start-up clock must be set to CCLK. A low
    /// DONE pin afterwards is reported as
    /// [`ConfigStatus::DoneNotAsserted`], not as an error.
    pub fn download_xilinx(&self, path: &Path) -> SiUsbResult<ConfigStatus> {
        let bitstream = load_bitstream(path)?;
        self.download_xilinx_bitstream(&bitstream)
    }

    /// Loads an already parsed bitstream into the FPGA.
    pub fn download_xilinx_bitstream(&self, bitstream: &Bitstream) -> SiUsbResult<ConfigStatus> {
        self.download_xilinx_with_progress(bitstream, |_| {})
    }

    /// Like [`download_xilinx_bitstream`](Self::download_xilinx_bitstream),
    /// calling `on_phase` as each phase starts.
    pub fn download_xilinx_with_progress(
        &self,
        bitstream: &Bitstream,
        mut on_phase: impl FnMut(ConfigPhase),
    ) -> SiUsbResult<ConfigStatus> {
        self.configurator().download(&bitstream.data, &mut on_phase)
    }

    /// Routes port A to the configuration lines and sets their directions.
    pub fn init_xilinx_conf_port(&self) -> SiUsbResult<()> {
        self.configurator().init_port()
    }

    /// Checks whether the FPGA already holds a configuration.
    ///
    /// This re-runs port initialization before sampling DONE, so it rewrites
    /// the port A direction registers; calling it is not free of side effects.
    pub fn xilinx_already_loaded(&self) -> SiUsbResult<bool> {
        self.configurator().already_loaded()
    }

    /// Reads the configuration port byte.
    pub fn xilinx_conf_byte(&self) -> SiUsbResult<ConfLines> {
        self.configurator().conf_byte()
    }

    /// Writes the configuration port byte.
    pub fn set_xilinx_conf_byte(&self, lines: ConfLines) -> SiUsbResult<()> {
        self.configurator().set_conf_byte(lines)
    }

    /// Samples one configuration line.
    pub fn xilinx_conf_pin(&self, line: ConfLine) -> SiUsbResult<bool> {
        self.configurator().conf_pin(line)
    }

    /// Drives one configuration line.
    pub fn set_xilinx_conf_pin(&self, line: ConfLine, high: bool) -> SiUsbResult<()> {
        self.configurator().set_conf_pin(line, high)
    }

    /// Releases the USB handle so another process can open the board.
    ///
    /// Idempotent. The device remains usable; the next transfer reopens it.
    pub fn dispose(&self) {
        if self.disposed.swap(true, Ordering::Relaxed) {
            return;
        }
        if let Err(e) = self.transport.release() {
            log::warn!("releasing device failed: {e}");
        }
    }

    /// Whether [`dispose`](Self::dispose) was called since the last transfer.
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Relaxed)
    }
}

impl<B: UsbBackend> Drop for SiUsbDevice<B> {
    fn drop(&mut self) {
        // libusb on POSIX leaves the board wedged for the next opener
        // unless the port is reset.
        if cfg!(unix) && !self.is_disposed() {
            if let Err(e) = self.transport.reset() {
                log::warn!("reset on drop failed: {e}");
            }
        }
    }
}
