//! The fixed subsystem table.
//!
//! Each subsystem is a logical source/sink inside the board with its own
//! endpoint pair. All but the GPIF block share endpoint 1 with small
//! packets; the GPIF block streams over endpoints 2 and 6 in 2 MiB units.

use std::fmt;
use std::str::FromStr;

use siusb_common::{SiUsbError, SiUsbResult};

/// One direction of a subsystem's data pipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointDescriptor {
    /// USB endpoint address (bit 7 set for IN endpoints).
    pub address: u8,
    /// Largest payload carried under a single command header.
    pub max_transfer_size: usize,
    /// Largest chunk handed to the USB stack per call.
    pub max_packet_size: usize,
}

/// Endpoint pair and wire id of a subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsystemDescriptor {
    /// Subsystem id sent in the command header.
    pub id: u8,
    /// Endpoint used for host-to-device data.
    pub write: EndpointDescriptor,
    /// Endpoint used for device-to-host data.
    pub read: EndpointDescriptor,
}

const EP1_WRITE: EndpointDescriptor = EndpointDescriptor {
    address: 0x01,
    max_transfer_size: 0x8FFF,
    max_packet_size: 64,
};

const EP1_READ: EndpointDescriptor = EndpointDescriptor {
    address: 0x81,
    max_transfer_size: 0xFFFF,
    max_packet_size: 64,
};

const EP2_WRITE: EndpointDescriptor = EndpointDescriptor {
    address: 0x02,
    max_transfer_size: 1 << 21,
    max_packet_size: 1 << 21,
};

const EP6_READ: EndpointDescriptor = EndpointDescriptor {
    address: 0x86,
    max_transfer_size: 1 << 21,
    max_packet_size: 1 << 21,
};

const fn control(id: u8) -> SubsystemDescriptor {
    SubsystemDescriptor {
        id,
        write: EP1_WRITE,
        read: EP1_READ,
    }
}

/// Logical subsystems of the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    /// Echo path for link tests.
    Loopback,
    /// FX2 (8051) internal RAM and SFRs.
    Mcu,
    /// Xilinx parallel configuration port.
    Xilinx,
    /// External bus into the FPGA.
    External,
    /// On-board I2C bus.
    I2c,
    /// Board EEPROM.
    Eeprom,
    /// Firmware version string.
    FirmwareVersion,
    /// High-throughput GPIF block transfer.
    FastBlock,
}

impl Subsystem {
    /// Every registered subsystem.
    pub const ALL: [Subsystem; 8] = [
        Subsystem::Loopback,
        Subsystem::Mcu,
        Subsystem::Xilinx,
        Subsystem::External,
        Subsystem::I2c,
        Subsystem::Eeprom,
        Subsystem::FirmwareVersion,
        Subsystem::FastBlock,
    ];

    /// Returns this subsystem's descriptor.
    pub const fn descriptor(self) -> SubsystemDescriptor {
        match self {
            Subsystem::Loopback => control(0),
            Subsystem::Mcu => control(1),
            Subsystem::Xilinx => control(2),
            Subsystem::External => control(3),
            Subsystem::I2c => control(5),
            Subsystem::Eeprom => control(10),
            Subsystem::FirmwareVersion => control(15),
            Subsystem::FastBlock => SubsystemDescriptor {
                id: 17,
                write: EP2_WRITE,
                read: EP6_READ,
            },
        }
    }

    /// Returns the wire id of this subsystem.
    pub const fn id(self) -> u8 {
        self.descriptor().id
    }

    /// Returns the canonical lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Subsystem::Loopback => "loopback",
            Subsystem::Mcu => "mcu",
            Subsystem::Xilinx => "xilinx",
            Subsystem::External => "external",
            Subsystem::I2c => "i2c",
            Subsystem::Eeprom => "eeprom",
            Subsystem::FirmwareVersion => "fwver",
            Subsystem::FastBlock => "fast-block",
        }
    }
}

impl TryFrom<u8> for Subsystem {
    type Error = SiUsbError;

    fn try_from(id: u8) -> SiUsbResult<Self> {
        Subsystem::ALL
            .into_iter()
            .find(|s| s.id() == id)
            .ok_or(SiUsbError::UnknownSubsystem(id))
    }
}

impl FromStr for Subsystem {
    type Err = String;

    /// Accepts the canonical name, a few aliases, or a numeric id.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        let by_name = match lower.as_str() {
            "loopback" | "loop" => Some(Subsystem::Loopback),
            "mcu" | "8051" => Some(Subsystem::Mcu),
            "xilinx" => Some(Subsystem::Xilinx),
            "external" | "ext" => Some(Subsystem::External),
            "i2c" => Some(Subsystem::I2c),
            "eeprom" => Some(Subsystem::Eeprom),
            "fwver" | "firmware-version" => Some(Subsystem::FirmwareVersion),
            "fast-block" | "gpif" | "gpif-block" => Some(Subsystem::FastBlock),
            _ => None,
        };
        if let Some(subsystem) = by_name {
            return Ok(subsystem);
        }
        let id: u8 = lower
            .parse()
            .map_err(|_| format!("unknown subsystem '{s}'"))?;
        Subsystem::try_from(id).map_err(|e| e.to_string())
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Looks up the descriptor for a raw subsystem id.
pub fn descriptor_for(id: u8) -> SiUsbResult<SubsystemDescriptor> {
    Subsystem::try_from(id).map(Subsystem::descriptor)
}
