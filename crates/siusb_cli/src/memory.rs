//! `siusb read` and `siusb write`: raw subsystem access.

use std::fmt::Write as _;
use std::str::FromStr;

use siusb_common::SiUsbResult;
use siusb_device::SiUsbDevice;
use siusb_transport::UsbBackend;

use crate::board::open_board;
use crate::{GlobalArgs, ReadArgs, WriteArgs};

/// Parses a decimal or `0x`-prefixed hexadecimal number.
fn parse_number(s: &str) -> Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid number '{s}': {e}"))
}

/// Parses a 32-bit address.
pub fn parse_u32(s: &str) -> Result<u32, String> {
    let n = parse_number(s)?;
    u32::try_from(n).map_err(|_| format!("'{s}' does not fit in 32 bits"))
}

/// Parses a byte count.
pub fn parse_usize(s: &str) -> Result<usize, String> {
    let n = parse_number(s)?;
    usize::try_from(n).map_err(|_| format!("'{s}' is too large"))
}

/// Bytes given on the command line as hex digits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HexBytes(pub Vec<u8>);

impl FromStr for HexBytes {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s
            .strip_prefix("0x")
            .unwrap_or(s)
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_')
            .collect();
        if digits.is_empty() {
            return Err("no data given".to_string());
        }
        if digits.len() % 2 != 0 {
            return Err(format!("odd number of hex digits in '{s}'"));
        }
        if !digits.is_ascii() {
            return Err(format!("invalid hex data '{s}'"));
        }
        (0..digits.len())
            .step_by(2)
            .map(|i| {
                u8::from_str_radix(&digits[i..i + 2], 16)
                    .map_err(|_| format!("invalid hex byte '{}'", &digits[i..i + 2]))
            })
            .collect::<Result<Vec<u8>, String>>()
            .map(HexBytes)
    }
}

/// Formats `data` as hex, sixteen bytes per line, each line prefixed by its address.
pub fn hex_dump(address: u32, data: &[u8]) -> String {
    let mut out = String::new();
    for (i, line) in data.chunks(16).enumerate() {
        let line_addr = u64::from(address) + (i * 16) as u64;
        let _ = write!(out, "{line_addr:08x}:");
        for b in line {
            let _ = write!(out, " {b:02x}");
        }
        out.push('\n');
    }
    out
}

/// Reads the requested range, then releases the board.
fn read_and_release<B: UsbBackend>(
    board: &SiUsbDevice<B>,
    args: &ReadArgs,
) -> SiUsbResult<Vec<u8>> {
    let data = board.read(args.subsystem, args.address, args.size)?;
    board.dispose();
    Ok(data)
}

/// Writes the given bytes, then releases the board.
fn write_and_release<B: UsbBackend>(board: &SiUsbDevice<B>, args: &WriteArgs) -> SiUsbResult<()> {
    board.write(args.subsystem, args.address, &args.data.0)?;
    board.dispose();
    Ok(())
}

/// Runs `siusb read`.
pub fn read(args: &ReadArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let board = open_board(global)?;
    let data = read_and_release(&board, args)?;
    print!("{}", hex_dump(args.address, &data));
    Ok(0)
}

/// Runs `siusb write`.
pub fn write(args: &WriteArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let board = open_board(global)?;
    write_and_release(&board, args)?;
    if !global.quiet {
        eprintln!(
            "   Wrote {} byte(s) to {} at 0x{:08x}",
            args.data.0.len(),
            args.subsystem,
            args.address
        );
    }
    Ok(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use siusb_transport::sim::SimulatedDevice;
    use siusb_transport::{Subsystem, CONTROL_PIPE};

    #[test]
    fn numbers_decimal_and_hex() {
        assert_eq!(parse_u32("16"), Ok(16));
        assert_eq!(parse_u32("0x3015"), Ok(0x3015));
        assert_eq!(parse_u32("0XFF"), Ok(0xFF));
        assert_eq!(parse_usize("0x10000"), Ok(0x10000));
    }

    #[test]
    fn numbers_out_of_range() {
        assert!(parse_u32("0x1_0000_0000").is_err());
        assert!(parse_u32("4294967296").is_err());
        assert!(parse_u32("ten").is_err());
    }

    #[test]
    fn hex_bytes() {
        assert_eq!("0a0B0c".parse::<HexBytes>().unwrap().0, vec![0x0A, 0x0B, 0x0C]);
        assert_eq!("0x01_02".parse::<HexBytes>().unwrap().0, vec![1, 2]);
        assert!("".parse::<HexBytes>().is_err());
        assert!("123".parse::<HexBytes>().is_err());
        assert!("zz".parse::<HexBytes>().is_err());
        assert!("é0".parse::<HexBytes>().is_err());
    }

    #[test]
    fn dump_layout() {
        let data: Vec<u8> = (0..18).collect();
        let dump = hex_dump(0x10, &data);
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00000010: 00 01 02"));
        assert_eq!(lines[1], "00000020: 10 11");
        assert_eq!(hex_dump(0, &[]), "");
    }

    #[test]
    fn write_then_read_releases_the_board() {
        let sim = SimulatedDevice::new();
        let board = SiUsbDevice::with_backend(sim.clone());

        let write = WriteArgs {
            subsystem: Subsystem::External,
            address: 0x20,
            data: HexBytes(vec![0xDE, 0xAD, 0xBE, 0xEF]),
        };
        write_and_release(&board, &write).unwrap();
        assert!(board.is_disposed());
        assert_eq!(sim.release_count(), 1);

        let read = ReadArgs {
            subsystem: Subsystem::External,
            address: 0x20,
            size: 4,
        };
        assert_eq!(read_and_release(&board, &read).unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(sim.release_count(), 2);

        drop(board);
        assert_eq!(sim.reset_count(), 0);
    }

    #[test]
    fn failed_read_leaves_the_board_to_drop() {
        let sim = SimulatedDevice::new();
        let board = SiUsbDevice::with_backend(sim.clone());
        sim.fail_next_timeout(CONTROL_PIPE);

        let read = ReadArgs {
            subsystem: Subsystem::External,
            address: 0,
            size: 8,
        };
        assert!(read_and_release(&board, &read).is_err());
        assert_eq!(sim.release_count(), 0);

        drop(board);
        assert_eq!(sim.reset_count(), if cfg!(unix) { 1 } else { 0 });
    }
}
