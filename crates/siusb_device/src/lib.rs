//! Access to SILAB USB data-acquisition boards.
//!
//! [`SiUsbDevice`] wraps one board: subsystem reads and writes through the
//! command-framed [`Transport`](siusb_transport::Transport), identity from the
//! on-board EEPROM, and loading the Xilinx FPGA through the microcontroller's
//! port A (see [`xilinx`]). Boards are found with [`rusb`] by their fixed
//! vendor/product id pair and can be picked by the board id stored in EEPROM.

#![warn(missing_docs)]

pub mod device;
pub mod eeprom;
pub mod usb;
pub mod xilinx;

pub use device::{select_board, BoardInfo, SiUsbDevice};
pub use usb::{find_devices, RusbBackend, UsbIds};
pub use xilinx::{ConfLine, ConfLines, ConfigPhase, ConfigStatus, Delay, ThreadDelay};
