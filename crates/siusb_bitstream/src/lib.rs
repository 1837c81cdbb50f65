//! Bitstream loading for the FPGA on SILAB USB boards.
//!
//! Two input formats are accepted. Xilinx `.bit` containers carry a small
//! TLV header (design, part, date, time) followed by a length-prefixed
//! configuration payload; the payload is bit-reversed on load because the
//! board's parallel configuration port shifts bytes in LSB first. Raw `.bin`
//! files (e.g. from `promgen -u 0 design.bit -p bin -w`) are already in port
//! order and are streamed untouched.
//!
//! The main entry point is [`load_bitstream()`], which picks the format from
//! the file extension.

#![warn(missing_docs)]

pub mod bit;
pub mod reverse;

use std::path::Path;

use serde::Serialize;
use siusb_common::{SiUsbError, SiUsbResult};

pub use bit::{parse_bit, parse_bit_file, write_bit, BitFile, BitHeader, BitInfo};
pub use reverse::{reverse_bits, reverse_payload};

/// The on-disk format of a bitstream file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BitstreamFormat {
    /// Xilinx bitstream container (.bit) with header and bit-reversed payload.
    Bit,
    /// Raw configuration payload (.bin), already in port bit order.
    Bin,
}

impl BitstreamFormat {
    /// Returns the conventional file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            BitstreamFormat::Bit => "bit",
            BitstreamFormat::Bin => "bin",
        }
    }

    /// Determines the format from a file path's extension.
    ///
    /// The match is exact: `.BIT` is rejected just like `.rbf`.
    pub fn from_path(path: &Path) -> SiUsbResult<Self> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            "bit" => Ok(BitstreamFormat::Bit),
            "bin" => Ok(BitstreamFormat::Bin),
            other => Err(SiUsbError::UnsupportedExtension(other.to_string())),
        }
    }
}

impl std::fmt::Display for BitstreamFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BitstreamFormat::Bit => write!(f, "BIT"),
            BitstreamFormat::Bin => write!(f, "BIN"),
        }
    }
}

/// A configuration payload ready to be streamed into the FPGA.
#[derive(Debug, Clone)]
pub struct Bitstream {
    /// Payload bytes in configuration-port bit order.
    pub data: Vec<u8>,
    /// The format this payload was loaded from.
    pub format: BitstreamFormat,
    /// Header metadata, present only for `.bit` sources.
    pub header: Option<BitHeader>,
}

impl Bitstream {
    /// Wraps an already port-ordered payload, as if read from a `.bin` file.
    pub fn from_raw(data: Vec<u8>) -> Self {
        Self {
            data,
            format: BitstreamFormat::Bin,
            header: None,
        }
    }

    /// Returns the payload length in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<BitFile> for Bitstream {
    fn from(file: BitFile) -> Self {
        Self {
            data: file.payload,
            format: BitstreamFormat::Bit,
            header: Some(file.header),
        }
    }
}

/// Loads a bitstream from disk, dispatching on the file extension.
///
/// `.bit` files are parsed and their payload bit-reversed; `.bin` files are
/// returned verbatim. Any other extension fails with
/// [`SiUsbError::UnsupportedExtension`] before the file is opened.
pub fn load_bitstream(path: &Path) -> SiUsbResult<Bitstream> {
    let format = BitstreamFormat::from_path(path)?;
    let bitstream = match format {
        BitstreamFormat::Bit => Bitstream::from(parse_bit_file(path)?),
        BitstreamFormat::Bin => Bitstream::from_raw(std::fs::read(path)?),
    };
    log::debug!(
        "loaded {} bitstream {} ({} bytes)",
        format,
        path.display(),
        bitstream.len()
    );
    Ok(bitstream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn format_extension() {
        assert_eq!(BitstreamFormat::Bit.extension(), "bit");
        assert_eq!(BitstreamFormat::Bin.extension(), "bin");
    }

    #[test]
    fn format_display() {
        assert_eq!(format!("{}", BitstreamFormat::Bit), "BIT");
        assert_eq!(format!("{}", BitstreamFormat::Bin), "BIN");
    }

    #[test]
    fn format_from_path() {
        assert_eq!(
            BitstreamFormat::from_path(&PathBuf::from("fw/top.bit")).unwrap(),
            BitstreamFormat::Bit
        );
        assert_eq!(
            BitstreamFormat::from_path(&PathBuf::from("top.bin")).unwrap(),
            BitstreamFormat::Bin
        );
    }

    #[test]
    fn format_rejects_other_extensions() {
        for name in ["top.rbf", "top.BIT", "top"] {
            let err = BitstreamFormat::from_path(&PathBuf::from(name)).unwrap_err();
            assert!(matches!(err, SiUsbError::UnsupportedExtension(_)), "{name}");
        }
    }

    #[test]
    fn load_unsupported_extension_does_not_touch_disk() {
        let err = load_bitstream(&PathBuf::from("/nonexistent/design.sof")).unwrap_err();
        match err {
            SiUsbError::UnsupportedExtension(ext) => assert_eq!(ext, "sof"),
            other => panic!("expected UnsupportedExtension, got {other:?}"),
        }
    }

    #[test]
    fn load_bin_is_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("design.bin");
        std::fs::write(&path, [0x01, 0xAA, 0xF0]).unwrap();

        let bs = load_bitstream(&path).unwrap();
        assert_eq!(bs.format, BitstreamFormat::Bin);
        assert_eq!(bs.data, vec![0x01, 0xAA, 0xF0]);
        assert!(bs.header.is_none());
    }

    #[test]
    fn load_bit_reverses_payload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("design.bit");
        let header = BitHeader::new("design.ncd", "3s1000fg320", "2013/05/02", "12:00:00");
        let container = write_bit(&header, &[0x80, 0x55, 0x0F]);
        std::fs::write(&path, container).unwrap();

        let bs = load_bitstream(&path).unwrap();
        assert_eq!(bs.format, BitstreamFormat::Bit);
        assert_eq!(bs.data, vec![0x80, 0x55, 0x0F]);
        assert_eq!(bs.header.unwrap().part_name_str(), "3s1000fg320");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = load_bitstream(&PathBuf::from("/nonexistent/design.bin")).unwrap_err();
        assert!(matches!(err, SiUsbError::Io(_)));
    }

    #[test]
    fn format_serializes_as_name() {
        let json = serde_json::to_string(&BitstreamFormat::Bit).unwrap();
        assert_eq!(json, "\"Bit\"");
    }
}
