//! Loading the FPGA through the microcontroller's port A.
//!
//! The Xilinx slave parallel configuration lines are wired to port A of the
//! FX2 microcontroller. Configuration pulses PROG_B, selects the chip, streams
//! the payload through the Xilinx subsystem and clocks eight extra bytes for
//! start-up, then checks the DONE pin. Every step is followed by a settling
//! delay; the values are empirical and hardware-validated.

use std::time::Duration;

use siusb_common::{SiUsbError, SiUsbResult};
use siusb_transport::{Subsystem, Transport, UsbBackend};

/// Port A alternate-function register.
pub const PORTACFG_FX: u32 = 0xE670;
/// Port A data register.
pub const IOA_FX: u32 = 0x80;
/// Port A output-enable register.
pub const OEA_FX: u32 = 0xB2;

/// A configuration line on port A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfLine {
    /// CS_B, active low chip select (bit 4).
    ChipSelect,
    /// RDWR_B, low for writing (bit 3).
    ReadWrite,
    /// BUSY input (bit 2).
    Busy,
    /// PROG_B, active low configuration reset (bit 1).
    Program,
    /// DONE input (bit 0).
    Done,
}

impl ConfLine {
    /// Every configuration line.
    pub const ALL: [ConfLine; 5] = [
        ConfLine::ChipSelect,
        ConfLine::ReadWrite,
        ConfLine::Busy,
        ConfLine::Program,
        ConfLine::Done,
    ];

    /// Bit mask of this line in the port byte.
    pub const fn mask(self) -> u8 {
        match self {
            ConfLine::ChipSelect => 0x10,
            ConfLine::ReadWrite => 0x08,
            ConfLine::Busy => 0x04,
            ConfLine::Program => 0x02,
            ConfLine::Done => 0x01,
        }
    }

    /// Whether the host drives this line (as opposed to reading it).
    pub const fn is_output(self) -> bool {
        !matches!(self, ConfLine::Busy | ConfLine::Done)
    }
}

/// States of the configuration lines packed into one port byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConfLines(u8);

impl ConfLines {
    /// Mask covering all five lines.
    pub const MASK: u8 = 0x1F;

    /// Wraps a raw port byte.
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Returns the raw port byte.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Whether `line` is high.
    pub const fn is_high(self, line: ConfLine) -> bool {
        self.0 & line.mask() != 0
    }

    /// Returns a copy with `line` driven to `high`.
    pub const fn with(self, line: ConfLine, high: bool) -> Self {
        if high {
            Self(self.0 | line.mask())
        } else {
            Self(self.0 & !line.mask())
        }
    }
}

/// Steps of the configuration sequence, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigPhase {
    /// Route port A to GPIO and set line directions.
    PortInit,
    /// CS_B high, RDWR_B low, PROG_B high.
    EnableWrite,
    /// PROG_B low clears the configuration memory.
    AssertProgramLow,
    /// PROG_B high starts initialization.
    ReleaseProgramHigh,
    /// CS_B low selects the part for data.
    AssertChipSelect,
    /// Payload through the Xilinx subsystem.
    StreamBitstream,
    /// Eight zero bytes for start-up clocks.
    FlushClocks,
    /// CS_B high.
    DeassertChipSelect,
    /// RDWR_B back high, the idle state.
    RestoreIdle,
    /// Read DONE.
    Done,
}

impl ConfigPhase {
    /// The full sequence.
    pub const SEQUENCE: [ConfigPhase; 10] = [
        ConfigPhase::PortInit,
        ConfigPhase::EnableWrite,
        ConfigPhase::AssertProgramLow,
        ConfigPhase::ReleaseProgramHigh,
        ConfigPhase::AssertChipSelect,
        ConfigPhase::StreamBitstream,
        ConfigPhase::FlushClocks,
        ConfigPhase::DeassertChipSelect,
        ConfigPhase::RestoreIdle,
        ConfigPhase::Done,
    ];

    /// Delay after this phase. Empirical; do not shorten.
    pub const fn settle_time(self) -> Duration {
        match self {
            ConfigPhase::AssertChipSelect | ConfigPhase::StreamBitstream => {
                Duration::from_millis(1500)
            }
            ConfigPhase::FlushClocks => Duration::from_millis(1000),
            ConfigPhase::Done => Duration::ZERO,
            _ => Duration::from_millis(500),
        }
    }

    /// Port A byte written in this phase, for the handshake phases.
    pub const fn control_lines(self) -> Option<ConfLines> {
        let idle = ConfLines(0)
            .with(ConfLine::ChipSelect, true)
            .with(ConfLine::Program, true);
        match self {
            ConfigPhase::EnableWrite
            | ConfigPhase::ReleaseProgramHigh
            | ConfigPhase::DeassertChipSelect => Some(idle),
            ConfigPhase::AssertProgramLow => Some(idle.with(ConfLine::Program, false)),
            ConfigPhase::AssertChipSelect => Some(idle.with(ConfLine::ChipSelect, false)),
            ConfigPhase::RestoreIdle => Some(idle.with(ConfLine::ReadWrite, true)),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConfigPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConfigPhase::PortInit => "port init",
            ConfigPhase::EnableWrite => "enable write",
            ConfigPhase::AssertProgramLow => "PROG_B low",
            ConfigPhase::ReleaseProgramHigh => "PROG_B high",
            ConfigPhase::AssertChipSelect => "CS_B low",
            ConfigPhase::StreamBitstream => "stream bitstream",
            ConfigPhase::FlushClocks => "start-up clocks",
            ConfigPhase::DeassertChipSelect => "CS_B high",
            ConfigPhase::RestoreIdle => "restore idle",
            ConfigPhase::Done => "check DONE",
        };
        f.write_str(name)
    }
}

/// Outcome of a configuration sequence.
///
/// A part that did not come up is an expected, retryable result rather than
/// an error; [`into_result`](Self::into_result) converts for callers that
/// want one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigStatus {
    /// DONE went high.
    Configured,
    /// DONE stayed low after the full sequence.
    DoneNotAsserted,
}

impl ConfigStatus {
    /// Maps the sampled DONE pin to a status.
    pub fn from_done(done: bool) -> Self {
        if done {
            ConfigStatus::Configured
        } else {
            ConfigStatus::DoneNotAsserted
        }
    }

    /// Returns `true` if the FPGA is configured.
    pub fn is_configured(self) -> bool {
        self == ConfigStatus::Configured
    }

    /// Converts [`DoneNotAsserted`](Self::DoneNotAsserted) into
    /// [`SiUsbError::ConfigurationFailed`].
    pub fn into_result(self) -> SiUsbResult<()> {
        match self {
            ConfigStatus::Configured => Ok(()),
            ConfigStatus::DoneNotAsserted => Err(SiUsbError::ConfigurationFailed),
        }
    }
}

/// Blocking wait between configuration phases.
pub trait Delay: Send + Sync {
    /// Blocks for `duration`.
    fn sleep(&self, duration: Duration);
}

/// [`Delay`] backed by [`std::thread::sleep`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadDelay;

impl Delay for ThreadDelay {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Drives the configuration port of one board.
pub struct XilinxConfigurator<'a, B> {
    transport: &'a Transport<B>,
    delay: &'a dyn Delay,
}

impl<'a, B: UsbBackend> XilinxConfigurator<'a, B> {
    /// Creates a configurator over `transport`, pausing with `delay`.
    pub fn new(transport: &'a Transport<B>, delay: &'a dyn Delay) -> Self {
        Self { transport, delay }
    }

    fn read_register(&self, address: u32) -> SiUsbResult<u8> {
        let data = self.transport.read(Subsystem::Mcu, address, 1)?;
        data.first().copied().ok_or_else(|| {
            SiUsbError::transport(0, format!("empty read of register 0x{address:04x}"))
        })
    }

    fn write_register(&self, address: u32, value: u8) -> SiUsbResult<()> {
        self.transport.write(Subsystem::Mcu, address, &[value])
    }

    /// Switches the port A pins to GPIO and sets their directions.
    pub fn init_port(&self) -> SiUsbResult<()> {
        let cfg = self.read_register(PORTACFG_FX)? & !ConfLines::MASK;
        self.write_register(PORTACFG_FX, cfg)?;

        let mut oe = self.read_register(OEA_FX)?;
        for line in ConfLine::ALL {
            if line.is_output() {
                oe |= line.mask();
            } else {
                oe &= !line.mask();
            }
        }
        self.write_register(OEA_FX, oe)
    }

    /// Reads the port A data byte.
    pub fn conf_byte(&self) -> SiUsbResult<ConfLines> {
        self.read_register(IOA_FX).map(ConfLines::from_bits)
    }

    /// Writes the port A data byte.
    pub fn set_conf_byte(&self, lines: ConfLines) -> SiUsbResult<()> {
        self.write_register(IOA_FX, lines.bits())
    }

    /// Samples one line.
    pub fn conf_pin(&self, line: ConfLine) -> SiUsbResult<bool> {
        Ok(self.conf_byte()?.is_high(line))
    }

    /// Drives one line, leaving the others as read back.
    pub fn set_conf_pin(&self, line: ConfLine, high: bool) -> SiUsbResult<()> {
        let lines = self.conf_byte()?;
        self.set_conf_byte(lines.with(line, high))
    }

    /// Re-initializes the port and samples DONE.
    ///
    /// Not a pure query: the port direction registers are rewritten.
    pub fn already_loaded(&self) -> SiUsbResult<bool> {
        self.init_port()?;
        self.conf_pin(ConfLine::Done)
    }

    /// Runs the full configuration sequence with `payload`.
    ///
    /// `on_phase` is called as each phase starts. Transport errors abort the
    /// sequence; a low DONE pin at the end does not.
    pub fn download(
        &self,
        payload: &[u8],
        on_phase: &mut dyn FnMut(ConfigPhase),
    ) -> SiUsbResult<ConfigStatus> {
        let mut status = ConfigStatus::DoneNotAsserted;
        for phase in ConfigPhase::SEQUENCE {
            on_phase(phase);
            log::debug!("xilinx configuration: {phase}");
            match phase {
                ConfigPhase::PortInit => self.init_port()?,
                ConfigPhase::StreamBitstream => self.transport.write_with_timeout(
                    Subsystem::Xilinx,
                    0,
                    payload,
                    self.transport.timeouts().firmware,
                )?,
                ConfigPhase::FlushClocks => self.transport.write(Subsystem::Xilinx, 0, &[0; 8])?,
                ConfigPhase::Done => {
                    status = ConfigStatus::from_done(self.conf_pin(ConfLine::Done)?);
                }
                handshake => {
                    if let Some(lines) = handshake.control_lines() {
                        self.set_conf_byte(lines)?;
                    }
                }
            }
            let settle = phase.settle_time();
            if !settle.is_zero() {
                self.delay.sleep(settle);
            }
        }
        match status {
            ConfigStatus::Configured => log::info!("FPGA configured ({} bytes)", payload.len()),
            ConfigStatus::DoneNotAsserted => {
                log::warn!("FPGA DONE pin low after {} bytes", payload.len())
            }
        }
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siusb_transport::sim::{DoneBehavior, FpgaModel, SimulatedDevice};
    use std::sync::Mutex;

    fn fpga_model(behavior: DoneBehavior) -> FpgaModel {
        FpgaModel {
            port_address: IOA_FX,
            program_mask: ConfLine::Program.mask(),
            done_mask: ConfLine::Done.mask(),
            behavior,
        }
    }

    #[derive(Default)]
    struct RecordingDelay(Mutex<Vec<Duration>>);

    impl Delay for RecordingDelay {
        fn sleep(&self, duration: Duration) {
            self.0.lock().unwrap().push(duration);
        }
    }

    #[test]
    fn line_masks() {
        let all = ConfLine::ALL.iter().fold(0u8, |acc, l| acc | l.mask());
        assert_eq!(all, ConfLines::MASK);
        assert!(ConfLine::Program.is_output());
        assert!(!ConfLine::Done.is_output());
    }

    #[test]
    fn handshake_bytes() {
        let byte = |p: ConfigPhase| p.control_lines().map(ConfLines::bits);
        assert_eq!(byte(ConfigPhase::EnableWrite), Some(0x12));
        assert_eq!(byte(ConfigPhase::AssertProgramLow), Some(0x10));
        assert_eq!(byte(ConfigPhase::ReleaseProgramHigh), Some(0x12));
        assert_eq!(byte(ConfigPhase::AssertChipSelect), Some(0x02));
        assert_eq!(byte(ConfigPhase::DeassertChipSelect), Some(0x12));
        assert_eq!(byte(ConfigPhase::RestoreIdle), Some(0x1A));
        assert_eq!(byte(ConfigPhase::StreamBitstream), None);
        assert_eq!(byte(ConfigPhase::PortInit), None);
    }

    #[test]
    fn settle_times_are_verbatim() {
        let ms: Vec<u128> = ConfigPhase::SEQUENCE
            .iter()
            .map(|p| p.settle_time().as_millis())
            .collect();
        assert_eq!(ms, vec![500, 500, 500, 500, 1500, 1500, 1000, 500, 500, 0]);
    }

    #[test]
    fn lines_with_and_is_high() {
        let lines = ConfLines::default()
            .with(ConfLine::Done, true)
            .with(ConfLine::Busy, true)
            .with(ConfLine::Busy, false);
        assert!(lines.is_high(ConfLine::Done));
        assert!(!lines.is_high(ConfLine::Busy));
        assert_eq!(lines.bits(), 0x01);
    }

    #[test]
    fn init_port_sets_directions() {
        let sim = SimulatedDevice::new();
        sim.preload(Subsystem::Mcu, PORTACFG_FX, &[0xFF]);
        sim.preload(Subsystem::Mcu, OEA_FX, &[0xE5]);
        let transport = Transport::new(sim.clone());
        let delay = RecordingDelay::default();
        XilinxConfigurator::new(&transport, &delay).init_port().unwrap();

        assert_eq!(sim.memory(Subsystem::Mcu, PORTACFG_FX, 1), vec![0xE0]);
        // keep 0xE0, outputs 0x1A set, inputs 0x05 cleared
        assert_eq!(sim.memory(Subsystem::Mcu, OEA_FX, 1), vec![0xFA]);
    }

    #[test]
    fn set_pin_preserves_others() {
        let sim = SimulatedDevice::new();
        sim.preload(Subsystem::Mcu, IOA_FX, &[0x12]);
        let transport = Transport::new(sim.clone());
        let delay = RecordingDelay::default();
        let cfg = XilinxConfigurator::new(&transport, &delay);
        cfg.set_conf_pin(ConfLine::ReadWrite, true).unwrap();
        assert_eq!(sim.memory(Subsystem::Mcu, IOA_FX, 1), vec![0x1A]);
        assert!(cfg.conf_pin(ConfLine::Program).unwrap());
    }

    #[test]
    fn download_sleeps_after_every_phase() {
        let sim = SimulatedDevice::new().with_fpga(fpga_model(DoneBehavior::AfterFlush));
        let transport = Transport::new(sim.clone());
        let delay = RecordingDelay::default();
        let mut phases = Vec::new();
        let status = XilinxConfigurator::new(&transport, &delay)
            .download(&[0xAB; 100], &mut |p| phases.push(p))
            .unwrap();

        assert_eq!(status, ConfigStatus::Configured);
        assert_eq!(phases, ConfigPhase::SEQUENCE.to_vec());
        let slept = delay.0.lock().unwrap().clone();
        assert_eq!(slept.len(), 9);
        assert_eq!(slept.iter().sum::<Duration>(), Duration::from_millis(7000));
    }

    #[test]
    fn status_conversion() {
        assert!(ConfigStatus::from_done(true).is_configured());
        assert!(ConfigStatus::Configured.into_result().is_ok());
        assert!(matches!(
            ConfigStatus::DoneNotAsserted.into_result(),
            Err(SiUsbError::ConfigurationFailed)
        ));
    }
}
