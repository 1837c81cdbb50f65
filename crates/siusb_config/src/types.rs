//! Configuration types deserialized from `siusb.toml`.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use siusb_device::UsbIds;
use siusb_transport::Timeouts;

/// The top-level configuration parsed from `siusb.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SiUsbConfig {
    /// Which board to open.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Bulk transfer timeouts.
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    /// FPGA download defaults.
    #[serde(default)]
    pub fpga: FpgaConfig,
}

/// Board selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// USB vendor id.
    pub vendor_id: u16,
    /// USB product id.
    pub product_id: u16,
    /// Board id stored in EEPROM; when unset the first board is used.
    pub board_id: Option<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vendor_id: UsbIds::SILAB.vendor_id,
            product_id: UsbIds::SILAB.product_id,
            board_id: None,
        }
    }
}

impl DeviceConfig {
    /// The vendor/product pair to enumerate.
    pub fn usb_ids(&self) -> UsbIds {
        UsbIds {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
        }
    }
}

/// Timeouts in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-packet bound for ordinary transfers.
    pub transfer_ms: u64,
    /// Per-packet bound while streaming a bitstream.
    pub firmware_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        let defaults = Timeouts::default();
        Self {
            transfer_ms: defaults.transfer.as_millis() as u64,
            firmware_ms: defaults.firmware.as_millis() as u64,
        }
    }
}

impl TimeoutConfig {
    /// Converts to transport timeouts.
    pub fn to_timeouts(self) -> Timeouts {
        Timeouts {
            transfer: Duration::from_millis(self.transfer_ms),
            firmware: Duration::from_millis(self.firmware_ms),
        }
    }
}

/// Defaults for `siusb download`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FpgaConfig {
    /// Bitstream loaded when none is given on the command line.
    ///
    /// Relative paths are resolved against the directory holding the
    /// configuration file.
    pub bitstream: Option<PathBuf>,
    /// Skip the download when DONE is already high.
    pub skip_if_loaded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_board() {
        let config = SiUsbConfig::default();
        assert_eq!(config.device.usb_ids(), UsbIds::SILAB);
        assert_eq!(config.timeouts.to_timeouts(), Timeouts::default());
        assert!(config.fpga.bitstream.is_none());
        assert!(!config.fpga.skip_if_loaded);
    }

    #[test]
    fn timeouts_convert_from_millis() {
        let t = TimeoutConfig {
            transfer_ms: 250,
            firmware_ms: 3000,
        }
        .to_timeouts();
        assert_eq!(t.transfer, Duration::from_millis(250));
        assert_eq!(t.firmware, Duration::from_secs(3));
    }
}
