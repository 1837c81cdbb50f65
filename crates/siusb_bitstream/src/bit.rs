//! Xilinx BIT container reader and writer.
//!
//! A BIT file is laid out as:
//! 1. A fixed 13-byte preamble
//! 2. Four header fields, each a one-byte tag (`a`..`d`), a 2-byte
//!    big-endian length and that many bytes: design file name, part name,
//!    creation date, creation time
//! 3. Tag `e`, a 4-byte big-endian payload length, and the payload

use std::borrow::Cow;
use std::path::Path;

use serde::Serialize;
use siusb_common::{SiUsbError, SiUsbResult};

use crate::reverse::reverse_payload;

/// Preamble every BIT file starts with.
pub const BIT_MAGIC: [u8; 13] = [0, 9, 15, 240, 15, 240, 15, 240, 15, 240, 0, 0, 1];

/// Header field tag 'a' (design file name).
const FIELD_DESIGN: u8 = b'a';
/// Header field tag 'b' (part name).
const FIELD_PART: u8 = b'b';
/// Header field tag 'c' (date).
const FIELD_DATE: u8 = b'c';
/// Header field tag 'd' (time).
const FIELD_TIME: u8 = b'd';
/// Header field tag 'e' (payload length).
const FIELD_PAYLOAD: u8 = b'e';

/// Metadata sections of a BIT file, kept byte-for-byte as stored.
///
/// Vendor tools NUL-terminate each field; the `*_str` accessors strip that.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BitHeader {
    /// Design (source `.ncd`) file name.
    pub file_name: Vec<u8>,
    /// Target part name, e.g. `3s1000fg320`.
    pub part_name: Vec<u8>,
    /// Creation date.
    pub date: Vec<u8>,
    /// Creation time.
    pub time: Vec<u8>,
}

impl BitHeader {
    /// Builds a header from text fields, NUL-terminating each one the way
    /// vendor tools do.
    pub fn new(file_name: &str, part_name: &str, date: &str, time: &str) -> Self {
        let field = |s: &str| {
            let mut v = s.as_bytes().to_vec();
            v.push(0);
            v
        };
        Self {
            file_name: field(file_name),
            part_name: field(part_name),
            date: field(date),
            time: field(time),
        }
    }

    /// Design file name as text.
    pub fn file_name_str(&self) -> Cow<'_, str> {
        field_text(&self.file_name)
    }

    /// Part name as text.
    pub fn part_name_str(&self) -> Cow<'_, str> {
        field_text(&self.part_name)
    }

    /// Creation date as text.
    pub fn date_str(&self) -> Cow<'_, str> {
        field_text(&self.date)
    }

    /// Creation time as text.
    pub fn time_str(&self) -> Cow<'_, str> {
        field_text(&self.time)
    }
}

fn field_text(raw: &[u8]) -> Cow<'_, str> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end])
}

/// A parsed BIT file: header metadata and the bit-reversed payload.
#[derive(Debug, Clone)]
pub struct BitFile {
    /// Header metadata.
    pub header: BitHeader,
    /// Configuration payload in port bit order.
    pub payload: Vec<u8>,
}

impl BitFile {
    /// Returns a serializable summary of this file.
    pub fn info(&self) -> BitInfo {
        BitInfo {
            file_name: self.header.file_name_str().into_owned(),
            part_name: self.header.part_name_str().into_owned(),
            date: self.header.date_str().into_owned(),
            time: self.header.time_str().into_owned(),
            payload_len: self.payload.len(),
        }
    }
}

/// Human-readable summary of a BIT file, for reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BitInfo {
    /// Design file name.
    pub file_name: String,
    /// Target part name.
    pub part_name: String,
    /// Creation date.
    pub date: String,
    /// Creation time.
    pub time: String,
    /// Payload length in bytes.
    pub payload_len: usize,
}

/// Byte cursor over the raw container.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize, what: &str) -> SiUsbResult<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                SiUsbError::invalid_format(format!(
                    "truncated {what}: need {n} bytes at offset {}, file has {}",
                    self.pos,
                    self.data.len()
                ))
            })?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self, what: &str) -> SiUsbResult<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn be_u16(&mut self, what: &str) -> SiUsbResult<u16> {
        let b = self.take(2, what)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn be_u32(&mut self, what: &str) -> SiUsbResult<u32> {
        let b = self.take(4, what)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads one tag + 16-bit length + value field. The tag is not checked.
    fn section(&mut self, what: &str) -> SiUsbResult<Vec<u8>> {
        let _tag = self.u8(what)?;
        let len = self.be_u16(what)?;
        Ok(self.take(len as usize, what)?.to_vec())
    }
}

/// Parses a BIT container held in memory.
///
/// Fails with [`SiUsbError::InvalidFormat`] if the preamble does not match,
/// the payload section is not tagged `e`, or the data ends early.
pub fn parse_bit(data: &[u8]) -> SiUsbResult<BitFile> {
    let mut r = Reader::new(data);

    if r.take(BIT_MAGIC.len(), "header")? != BIT_MAGIC {
        return Err(SiUsbError::invalid_format("wrong bitstream file header"));
    }

    let header = BitHeader {
        file_name: r.section("file name section")?,
        part_name: r.section("part name section")?,
        date: r.section("date section")?,
        time: r.section("time section")?,
    };

    if r.u8("payload section")? != FIELD_PAYLOAD {
        return Err(SiUsbError::invalid_format("wrong bitstream section"));
    }

    let len = r.be_u32("payload length")? as usize;
    let mut payload = r.take(len, "payload")?.to_vec();
    reverse_payload(&mut payload);

    Ok(BitFile { header, payload })
}

/// Reads and parses a BIT file from disk.
pub fn parse_bit_file(path: &Path) -> SiUsbResult<BitFile> {
    let data = std::fs::read(path)?;
    parse_bit(&data)
}

/// Writes a BIT container for a port-ordered payload.
///
/// The payload is bit-reversed on the way out so that [`parse_bit`] returns
/// it unchanged.
pub fn write_bit(header: &BitHeader, payload: &[u8]) -> Vec<u8> {
    let mut data = Vec::with_capacity(BIT_MAGIC.len() + 64 + payload.len());
    data.extend_from_slice(&BIT_MAGIC);

    write_tlv_field(&mut data, FIELD_DESIGN, &header.file_name);
    write_tlv_field(&mut data, FIELD_PART, &header.part_name);
    write_tlv_field(&mut data, FIELD_DATE, &header.date);
    write_tlv_field(&mut data, FIELD_TIME, &header.time);

    data.push(FIELD_PAYLOAD);
    data.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    let start = data.len();
    data.extend_from_slice(payload);
    reverse_payload(&mut data[start..]);
    data
}

/// Writes a single TLV field (tag + 2-byte length + value).
fn write_tlv_field(data: &mut Vec<u8>, tag: u8, value: &[u8]) {
    data.push(tag);
    data.extend_from_slice(&(value.len() as u16).to_be_bytes());
    data.extend_from_slice(value);
}
