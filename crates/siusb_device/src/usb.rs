//! The rusb-backed transport and board enumeration.

use std::time::Duration;

use rusb::{Device, DeviceHandle, GlobalContext};
use siusb_common::{SiUsbError, SiUsbResult};
use siusb_transport::UsbBackend;

/// Vendor/product id pair identifying compatible boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbIds {
    /// USB vendor id.
    pub vendor_id: u16,
    /// USB product id.
    pub product_id: u16,
}

impl UsbIds {
    /// The ids every SILAB USB board enumerates with.
    pub const SILAB: UsbIds = UsbIds {
        vendor_id: 0x5312,
        product_id: 0x0200,
    };
}

impl Default for UsbIds {
    fn default() -> Self {
        Self::SILAB
    }
}

/// USB configuration activated on open.
const CONFIGURATION: u8 = 1;
/// Interface carrying all bulk endpoints.
const INTERFACE: u8 = 0;

pub(crate) fn usb_error(endpoint: u8, err: rusb::Error) -> SiUsbError {
    match err {
        rusb::Error::Timeout => SiUsbError::TransportTimeout { endpoint },
        other => SiUsbError::transport(endpoint, other.to_string()),
    }
}

/// Lists every attached device matching `ids`.
///
/// Devices whose descriptor cannot be read are skipped.
pub fn find_devices(ids: UsbIds) -> SiUsbResult<Vec<Device<GlobalContext>>> {
    let list = rusb::devices().map_err(|e| usb_error(0, e))?;
    let mut found = Vec::new();
    for device in list.iter() {
        let desc = match device.device_descriptor() {
            Ok(desc) => desc,
            Err(e) => {
                log::warn!(
                    "skipping device on bus {} address {}: {e}",
                    device.bus_number(),
                    device.address()
                );
                continue;
            }
        };
        if desc.vendor_id() == ids.vendor_id && desc.product_id() == ids.product_id {
            found.push(device);
        }
    }
    log::debug!(
        "found {} device(s) with id {:04x}:{:04x}",
        found.len(),
        ids.vendor_id,
        ids.product_id
    );
    Ok(found)
}

/// Checks that `device` reports the expected ids.
pub(crate) fn check_ids(device: &Device<GlobalContext>, ids: UsbIds) -> SiUsbResult<()> {
    let desc = device.device_descriptor().map_err(|e| usb_error(0, e))?;
    if desc.vendor_id() != ids.vendor_id || desc.product_id() != ids.product_id {
        return Err(SiUsbError::WrongDevice {
            vendor_id: desc.vendor_id(),
            product_id: desc.product_id(),
        });
    }
    Ok(())
}

fn open_handle(device: &Device<GlobalContext>) -> SiUsbResult<DeviceHandle<GlobalContext>> {
    let mut handle = device.open().map_err(|e| usb_error(0, e))?;
    handle
        .set_active_configuration(CONFIGURATION)
        .map_err(|e| usb_error(0, e))?;
    handle
        .claim_interface(INTERFACE)
        .map_err(|e| usb_error(0, e))?;
    Ok(handle)
}

/// A board opened through libusb.
///
/// The handle is dropped by [`release`](UsbBackend::release) and reopened
/// on the next transfer.
#[derive(Debug)]
pub struct RusbBackend {
    device: Device<GlobalContext>,
    handle: Option<DeviceHandle<GlobalContext>>,
}

impl RusbBackend {
    /// Opens `device`, activates its configuration and claims its interface.
    pub fn open(device: Device<GlobalContext>) -> SiUsbResult<Self> {
        let handle = open_handle(&device)?;
        Ok(Self {
            device,
            handle: Some(handle),
        })
    }

    /// The underlying libusb device.
    pub fn device(&self) -> &Device<GlobalContext> {
        &self.device
    }

    fn handle(&mut self) -> SiUsbResult<&mut DeviceHandle<GlobalContext>> {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => {
                log::debug!(
                    "reopening device on bus {} address {}",
                    self.device.bus_number(),
                    self.device.address()
                );
                open_handle(&self.device)?
            }
        };
        Ok(self.handle.insert(handle))
    }
}

impl UsbBackend for RusbBackend {
    fn write_bulk(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> SiUsbResult<usize> {
        self.handle()?
            .write_bulk(endpoint, data, timeout)
            .map_err(|e| usb_error(endpoint, e))
    }

    fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> SiUsbResult<usize> {
        self.handle()?
            .read_bulk(endpoint, buf, timeout)
            .map_err(|e| usb_error(endpoint, e))
    }

    fn release(&mut self) -> SiUsbResult<()> {
        match self.handle.take() {
            Some(mut handle) => handle
                .release_interface(INTERFACE)
                .map_err(|e| usb_error(0, e)),
            None => Ok(()),
        }
    }

    fn reset(&mut self) -> SiUsbResult<()> {
        self.handle()?.reset().map_err(|e| usb_error(0, e))
    }
}
