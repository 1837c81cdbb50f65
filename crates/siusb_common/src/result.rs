//! Common result and error types for the siusb crates.

/// The standard result type for fallible board operations.
pub type SiUsbResult<T> = Result<T, SiUsbError>;

/// Everything that can go wrong while talking to a board or reading a bitstream.
///
/// Transport and format errors are surfaced to the caller as soon as they
/// happen. Nothing in the siusb crates retries on its own.
#[derive(Debug, thiserror::Error)]
pub enum SiUsbError {
    /// No USB device with the expected vendor/product id (or board id) is attached.
    #[error("no device found: {0}")]
    DeviceNotFound(String),

    /// A device was handed in whose vendor/product id does not belong to a SILAB board.
    #[error("device {vendor_id:04x}:{product_id:04x} is not a SILAB USB board")]
    WrongDevice {
        /// USB vendor id reported by the device.
        vendor_id: u16,
        /// USB product id reported by the device.
        product_id: u16,
    },

    /// More than one attached board reports the requested board id.
    #[error("found {count} devices with board ID {board_id}")]
    AmbiguousDevice {
        /// The board id that was searched for.
        board_id: String,
        /// How many boards matched.
        count: usize,
    },

    /// A bulk transfer did not complete within its bound.
    #[error("USB transfer on endpoint 0x{endpoint:02x} timed out")]
    TransportTimeout {
        /// Endpoint address of the transfer.
        endpoint: u8,
    },

    /// The USB stack reported a failure.
    #[error("USB transfer on endpoint 0x{endpoint:02x} failed: {message}")]
    TransportError {
        /// Endpoint address of the transfer (0 for device-level operations).
        endpoint: u8,
        /// Description from the USB stack.
        message: String,
    },

    /// A bitstream file is malformed.
    #[error("invalid bitstream: {0}")]
    InvalidFormat(String),

    /// A bitstream file has an extension other than `.bit` or `.bin`.
    #[error("unsupported bitstream file extension '{0}'")]
    UnsupportedExtension(String),

    /// A subsystem id that is not in the registry. Always a programming error.
    #[error("unknown subsystem id {0}")]
    UnknownSubsystem(u8),

    /// An address or size does not fit the 32-bit command header.
    #[error("address range 0x{address:08x} + {size} exceeds 32 bits")]
    AddressOverflow {
        /// Base address of the request.
        address: u32,
        /// Requested byte count.
        size: usize,
    },

    /// The FPGA did not raise its done line after a full configuration sequence.
    #[error("FPGA configuration failed: DONE pin not asserted")]
    ConfigurationFailed,

    /// Reading a bitstream file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SiUsbError {
    /// Creates a transport error for the given endpoint.
    pub fn transport(endpoint: u8, message: impl Into<String>) -> Self {
        Self::TransportError {
            endpoint,
            message: message.into(),
        }
    }

    /// Creates an invalid-format error.
    pub fn invalid_format(message: impl Into<String>) -> Self {
        Self::InvalidFormat(message.into())
    }

    /// Returns `true` for errors raised by the USB layer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::TransportTimeout { .. } | Self::TransportError { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_timeout() {
        let err = SiUsbError::TransportTimeout { endpoint: 0x81 };
        assert_eq!(
            format!("{err}"),
            "USB transfer on endpoint 0x81 timed out"
        );
    }

    #[test]
    fn display_ambiguous() {
        let err = SiUsbError::AmbiguousDevice {
            board_id: "42".into(),
            count: 2,
        };
        assert_eq!(format!("{err}"), "found 2 devices with board ID 42");
    }

    #[test]
    fn display_wrong_device() {
        let err = SiUsbError::WrongDevice {
            vendor_id: 0x1234,
            product_id: 0x0001,
        };
        assert_eq!(
            format!("{err}"),
            "device 1234:0001 is not a SILAB USB board"
        );
    }

    #[test]
    fn transport_classification() {
        assert!(SiUsbError::transport(0x01, "pipe").is_transport());
        assert!(SiUsbError::TransportTimeout { endpoint: 1 }.is_transport());
        assert!(!SiUsbError::UnknownSubsystem(4).is_transport());
        assert!(!SiUsbError::ConfigurationFailed.is_transport());
    }

    #[test]
    fn from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: SiUsbError = io_err.into();
        assert!(format!("{err}").starts_with("I/O error:"));
    }
}
