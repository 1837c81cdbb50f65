//! The 10-byte command header sent on the control pipe.
//!
//! Layout: `[subsystem:1][direction:1][address:4 BE][size:4 BE]`.

use siusb_common::{SiUsbError, SiUsbResult};

/// Endpoint every command header is written to.
pub const CONTROL_PIPE: u8 = 0x01;

/// Encoded header length in bytes.
pub const HEADER_LEN: usize = 10;

/// Data direction announced by a header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Host to device.
    Out = 0,
    /// Device to host.
    In = 1,
}

/// Announces one logical chunk of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandHeader {
    /// Target subsystem id.
    pub subsystem: u8,
    /// Transfer direction.
    pub direction: Direction,
    /// Start address within the subsystem.
    pub address: u32,
    /// Number of data bytes that follow (or are requested).
    pub size: u32,
}

impl CommandHeader {
    /// Encodes the header for the wire. Multi-byte fields are big-endian
    /// whatever the host byte order.
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0] = self.subsystem;
        out[1] = self.direction as u8;
        out[2..6].copy_from_slice(&self.address.to_be_bytes());
        out[6..10].copy_from_slice(&self.size.to_be_bytes());
        out
    }

    /// Decodes a header received on the control pipe.
    pub fn decode(bytes: &[u8]) -> SiUsbResult<Self> {
        if bytes.len() != HEADER_LEN {
            return Err(SiUsbError::transport(
                CONTROL_PIPE,
                format!("command header must be {HEADER_LEN} bytes, got {}", bytes.len()),
            ));
        }
        let direction = match bytes[1] {
            0 => Direction::Out,
            1 => Direction::In,
            other => {
                return Err(SiUsbError::transport(
                    CONTROL_PIPE,
                    format!("invalid direction byte {other}"),
                ))
            }
        };
        Ok(Self {
            subsystem: bytes[0],
            direction,
            address: u32::from_be_bytes([bytes[2], bytes[3], bytes[4], bytes[5]]),
            size: u32::from_be_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_is_big_endian() {
        let header = CommandHeader {
            subsystem: 3,
            direction: Direction::In,
            address: 0x0102_0304,
            size: 0x0000_0010,
        };
        assert_eq!(
            header.encode(),
            [0x03, 0x01, 0x01, 0x02, 0x03, 0x04, 0x00, 0x00, 0x00, 0x10]
        );
    }

    #[test]
    fn encode_out_direction() {
        let header = CommandHeader {
            subsystem: 10,
            direction: Direction::Out,
            address: 0x3000,
            size: 21,
        };
        let bytes = header.encode();
        assert_eq!(bytes[0], 10);
        assert_eq!(bytes[1], 0);
        assert_eq!(&bytes[2..6], &[0x00, 0x00, 0x30, 0x00]);
        assert_eq!(&bytes[6..], &[0x00, 0x00, 0x00, 0x15]);
    }

    #[test]
    fn decode_reverses_encode() {
        let header = CommandHeader {
            subsystem: 17,
            direction: Direction::Out,
            address: 0xDEAD_BEEF,
            size: 1 << 21,
        };
        assert_eq!(CommandHeader::decode(&header.encode()).unwrap(), header);
    }

    #[test]
    fn decode_rejects_bad_length() {
        assert!(CommandHeader::decode(&[0; 9]).unwrap_err().is_transport());
    }

    #[test]
    fn decode_rejects_bad_direction() {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[1] = 2;
        assert!(CommandHeader::decode(&bytes).is_err());
    }
}
