//! `siusb download`: load a bitstream into the FPGA.
//!
//! The bitstream comes from the command line or from `fpga.bitstream` in the
//! configuration. The file is parsed before the board is opened, so a bad
//! file never touches the hardware.

use std::path::PathBuf;

use siusb_bitstream::load_bitstream;
use siusb_device::ConfigStatus;

use crate::board::open_board;
use crate::{DownloadArgs, GlobalArgs, EXIT_NOT_CONFIGURED};

fn bitstream_path(args: &DownloadArgs, global: &GlobalArgs) -> Result<PathBuf, String> {
    args.file
        .clone()
        .or_else(|| global.config.fpga.bitstream.clone())
        .ok_or_else(|| "no bitstream given and fpga.bitstream is not configured".to_string())
}

/// Runs `siusb download`.
pub fn run(args: &DownloadArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let path = bitstream_path(args, global)?;
    let bitstream = load_bitstream(&path)?;
    let board = open_board(global)?;

    let skip = args.skip_if_loaded || global.config.fpga.skip_if_loaded;
    if skip && board.xilinx_already_loaded()? {
        if !global.quiet {
            eprintln!("   FPGA already configured, skipping {}", path.display());
        }
        board.dispose();
        return Ok(0);
    }

    if !global.quiet {
        eprintln!(
            "   Loading {} ({} bytes, {})",
            path.display(),
            bitstream.len(),
            bitstream.format
        );
    }
    let quiet = global.quiet;
    let status = board.download_xilinx_with_progress(&bitstream, |phase| {
        if !quiet {
            eprintln!("     {phase}");
        }
    })?;
    board.dispose();

    match status {
        ConfigStatus::Configured => {
            if !global.quiet {
                eprintln!("   FPGA configured");
            }
            Ok(0)
        }
        ConfigStatus::DoneNotAsserted => {
            eprintln!("error: FPGA DONE pin not asserted after download");
            Ok(EXIT_NOT_CONFIGURED)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siusb_config::{load_config_from_str, SiUsbConfig};
    use std::path::Path;

    fn global(config: SiUsbConfig) -> GlobalArgs {
        GlobalArgs {
            quiet: true,
            config,
        }
    }

    #[test]
    fn file_argument_wins() {
        let g = global(load_config_from_str("[fpga]\nbitstream = \"/cfg.bit\"\n").unwrap());
        let args = DownloadArgs {
            file: Some(PathBuf::from("cli.bit")),
            skip_if_loaded: false,
        };
        assert_eq!(bitstream_path(&args, &g).unwrap(), Path::new("cli.bit"));
    }

    #[test]
    fn falls_back_to_configured_bitstream() {
        let g = global(load_config_from_str("[fpga]\nbitstream = \"/cfg.bit\"\n").unwrap());
        let args = DownloadArgs {
            file: None,
            skip_if_loaded: false,
        };
        assert_eq!(bitstream_path(&args, &g).unwrap(), Path::new("/cfg.bit"));
    }

    #[test]
    fn no_bitstream_anywhere_errors() {
        let args = DownloadArgs {
            file: None,
            skip_if_loaded: false,
        };
        assert!(bitstream_path(&args, &global(SiUsbConfig::default())).is_err());
    }

    #[test]
    fn bad_extension_fails_before_opening_board() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("top.hex");
        std::fs::write(&path, [0u8; 4]).unwrap();
        let args = DownloadArgs {
            file: Some(path),
            skip_if_loaded: false,
        };
        let err = run(&args, &global(SiUsbConfig::default())).unwrap_err();
        assert_eq!(err.to_string(), "unsupported bitstream file extension 'hex'");
    }
}
