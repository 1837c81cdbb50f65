//! `siusb list`, `siusb info` and `siusb status`.

use siusb_common::SiUsbResult;
use siusb_device::{BoardInfo, SiUsbDevice};

use crate::{FormatArgs, GlobalArgs, ReportFormat, EXIT_NOT_CONFIGURED};

/// Opens the board selected by the configuration.
///
/// With a board id the matching board is opened; otherwise the first one.
pub fn open_board(global: &GlobalArgs) -> SiUsbResult<SiUsbDevice> {
    let device = &global.config.device;
    let timeouts = global.config.timeouts.to_timeouts();
    match &device.board_id {
        Some(id) => SiUsbDevice::from_board_id(id, device.usb_ids(), timeouts),
        None => SiUsbDevice::open_with(device.usb_ids(), timeouts),
    }
}

fn print_info(info: &BoardInfo) {
    println!(
        "{:<8} {:<20} firmware {}",
        info.board_id, info.board_name, info.fw_version
    );
}

/// Runs `siusb list`.
pub fn list(args: &FormatArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let device = &global.config.device;
    let boards = SiUsbDevice::list_boards(device.usb_ids(), global.config.timeouts.to_timeouts())?;

    let mut infos = Vec::with_capacity(boards.len());
    for board in &boards {
        match board.info() {
            Ok(info) => infos.push(info),
            Err(e) => log::warn!("cannot identify board: {e}"),
        }
        board.dispose();
    }

    match args.format {
        ReportFormat::Text => {
            if infos.is_empty() && !global.quiet {
                eprintln!("no boards found");
            }
            infos.iter().for_each(print_info);
        }
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&infos)?),
    }
    Ok(0)
}

/// Runs `siusb info`.
pub fn info(args: &FormatArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let board = open_board(global)?;
    let info = board.info()?;
    match args.format {
        ReportFormat::Text => print_info(&info),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&info)?),
    }
    board.dispose();
    Ok(0)
}

/// Runs `siusb status`.
///
/// Exits with [`EXIT_NOT_CONFIGURED`] when DONE is low.
pub fn status(global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let board = open_board(global)?;
    let loaded = board.xilinx_already_loaded()?;
    board.dispose();
    if loaded {
        println!("FPGA configured");
        Ok(0)
    } else {
        println!("FPGA not configured");
        Ok(EXIT_NOT_CONFIGURED)
    }
}
