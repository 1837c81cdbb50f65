//! An in-memory stand-in for a SILAB USB board.
//!
//! [`SimulatedDevice`] implements [`UsbBackend`] by decoding command headers
//! the way the board firmware does, storing written bytes per subsystem and
//! address, and serving reads from that memory. Every header and packet is
//! recorded as a [`WireEvent`] so tests can check what went over the wire.
//!
//! Clones share state: keep one clone as a probe while another is owned by
//! a [`Transport`](crate::Transport).
//!
//! An optional [`FpgaModel`] emulates the configuration port: the done pin
//! reads high once a payload and the trailing eight zero clock bytes have
//! been streamed, and pulling the program line low resets it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use siusb_common::{SiUsbError, SiUsbResult};

use crate::backend::UsbBackend;
use crate::header::{CommandHeader, Direction, CONTROL_PIPE};
use crate::subsystem::{Subsystem, SubsystemDescriptor};

/// Something observed on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    /// A command header on the control pipe.
    Header(CommandHeader),
    /// A host-to-device data packet.
    DataOut {
        /// Endpoint written.
        endpoint: u8,
        /// Packet length.
        len: usize,
    },
    /// A device-to-host data packet.
    DataIn {
        /// Endpoint read.
        endpoint: u8,
        /// Packet length.
        len: usize,
    },
}

/// When the simulated FPGA raises its done pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneBehavior {
    /// After a payload followed by eight zero clock bytes.
    AfterFlush,
    /// Never; models a corrupt bitstream or a dead part.
    Never,
}

/// Location of the configuration lines in microcontroller memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpgaModel {
    /// Address of the data port register in the microcontroller subsystem.
    pub port_address: u32,
    /// Mask of the active-low program line.
    pub program_mask: u8,
    /// Mask of the done input line.
    pub done_mask: u8,
    /// Done pin behaviour.
    pub behavior: DoneBehavior,
}

/// Failure to inject on the next transfer touching an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fault {
    Timeout,
    Stall,
}

#[derive(Debug)]
struct Pending {
    header: CommandHeader,
    desc: SubsystemDescriptor,
    done: u32,
}

#[derive(Debug, Default)]
struct SimState {
    memory: HashMap<(u8, u32), u8>,
    pending: Option<Pending>,
    events: Vec<WireEvent>,
    faults: HashMap<u8, Fault>,
    latency: Option<Duration>,
    fpga: Option<FpgaModel>,
    stream: Vec<u8>,
    flushed: bool,
    open: bool,
    opens: usize,
    releases: usize,
    resets: usize,
}

impl SimState {
    fn ensure_open(&mut self) {
        if !self.open {
            self.open = true;
            self.opens += 1;
        }
    }

    fn take_fault(&mut self, endpoint: u8) -> SiUsbResult<()> {
        match self.faults.remove(&endpoint) {
            Some(Fault::Timeout) => Err(SiUsbError::TransportTimeout { endpoint }),
            Some(Fault::Stall) => Err(SiUsbError::transport(endpoint, "pipe stalled")),
            None => Ok(()),
        }
    }

    fn fpga_done(&self) -> bool {
        match self.fpga {
            Some(model) => model.behavior == DoneBehavior::AfterFlush && self.flushed,
            None => false,
        }
    }

    fn accept_header(&mut self, bytes: &[u8]) -> SiUsbResult<()> {
        let header = CommandHeader::decode(bytes)?;
        let subsystem = Subsystem::try_from(header.subsystem)?;
        self.events.push(WireEvent::Header(header));
        self.pending = (header.size > 0).then(|| Pending {
            header,
            desc: subsystem.descriptor(),
            done: 0,
        });
        Ok(())
    }

    fn accept_data(&mut self, endpoint: u8, data: &[u8]) -> SiUsbResult<()> {
        let Some(pending) = self.pending.as_mut() else {
            return Err(SiUsbError::transport(endpoint, "data without command header"));
        };
        let remaining = (pending.header.size - pending.done) as usize;
        if data.len() > remaining {
            return Err(SiUsbError::transport(
                endpoint,
                format!("{} bytes sent, header announced {remaining} more", data.len()),
            ));
        }
        if data.len() > pending.desc.write.max_packet_size {
            return Err(SiUsbError::transport(endpoint, "packet exceeds max packet size"));
        }
        let id = pending.header.subsystem;
        let base = pending.header.address.wrapping_add(pending.done);
        pending.done += data.len() as u32;
        let complete = pending.done == pending.header.size;
        let total = pending.header.size;

        for (i, &b) in data.iter().enumerate() {
            self.memory.insert((id, base.wrapping_add(i as u32)), b);
        }
        self.events.push(WireEvent::DataOut {
            endpoint,
            len: data.len(),
        });
        self.observe_fpga(id, base, data);
        if complete {
            self.pending = None;
            if id == Subsystem::Xilinx.id() && total == 8 && self.stream.len() > 8 {
                let tail = &self.stream[self.stream.len() - 8..];
                if tail.iter().all(|&b| b == 0) {
                    self.flushed = true;
                }
            }
        }
        Ok(())
    }

    fn observe_fpga(&mut self, id: u8, base: u32, data: &[u8]) {
        let Some(model) = self.fpga else { return };
        if id == Subsystem::Xilinx.id() {
            self.stream.extend_from_slice(data);
        } else if id == Subsystem::Mcu.id() && base == model.port_address {
            if data.first().is_some_and(|&b| b & model.program_mask == 0) {
                self.stream.clear();
                self.flushed = false;
            }
        }
    }

    fn serve_read(&mut self, endpoint: u8, buf: &mut [u8]) -> SiUsbResult<usize> {
        let fpga_done = self.fpga_done();
        let fpga = self.fpga;
        let Some(pending) = self.pending.as_mut() else {
            return Err(SiUsbError::transport(endpoint, "read without command header"));
        };
        if pending.header.direction != Direction::In || pending.desc.read.address != endpoint {
            return Err(SiUsbError::transport(endpoint, "no read pending on this endpoint"));
        }
        let remaining = (pending.header.size - pending.done) as usize;
        let n = buf.len().min(remaining).min(pending.desc.read.max_packet_size);
        let id = pending.header.subsystem;
        let base = pending.header.address.wrapping_add(pending.done);
        for (i, slot) in buf[..n].iter_mut().enumerate() {
            let addr = base.wrapping_add(i as u32);
            let mut value = self.memory.get(&(id, addr)).copied().unwrap_or(0);
            if let Some(model) = fpga {
                if id == Subsystem::Mcu.id() && addr == model.port_address {
                    value &= !model.done_mask;
                    if fpga_done {
                        value |= model.done_mask;
                    }
                }
            }
            *slot = value;
        }
        pending.done += n as u32;
        if pending.done == pending.header.size {
            self.pending = None;
        }
        self.events.push(WireEvent::DataIn { endpoint, len: n });
        Ok(n)
    }
}

/// In-memory board. See the module docs.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDevice {
    state: Arc<Mutex<SimState>>,
}

impl SimulatedDevice {
    /// Creates an empty board with no FPGA model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches an FPGA configuration-port model.
    pub fn with_fpga(self, model: FpgaModel) -> Self {
        self.state().fpga = Some(model);
        self
    }

    /// Adds a fixed delay to every bulk transfer, widening race windows.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.state().latency = Some(latency);
        self
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores bytes in a subsystem's memory without touching the wire log.
    pub fn preload(&self, subsystem: Subsystem, address: u32, data: &[u8]) {
        let mut st = self.state();
        for (i, &b) in data.iter().enumerate() {
            st.memory
                .insert((subsystem.id(), address.wrapping_add(i as u32)), b);
        }
    }

    /// Returns `len` bytes of a subsystem's memory (unwritten bytes read 0).
    pub fn memory(&self, subsystem: Subsystem, address: u32, len: usize) -> Vec<u8> {
        let st = self.state();
        (0..len)
            .map(|i| {
                st.memory
                    .get(&(subsystem.id(), address.wrapping_add(i as u32)))
                    .copied()
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Returns every recorded wire event in order.
    pub fn events(&self) -> Vec<WireEvent> {
        self.state().events.clone()
    }

    /// Returns the recorded command headers in order.
    pub fn headers(&self) -> Vec<CommandHeader> {
        self.state()
            .events
            .iter()
            .filter_map(|e| match e {
                WireEvent::Header(h) => Some(*h),
                _ => None,
            })
            .collect()
    }

    /// Forgets recorded events.
    pub fn clear_events(&self) {
        self.state().events.clear();
    }

    /// Bytes streamed into the configuration port since the last program pulse.
    pub fn config_stream(&self) -> Vec<u8> {
        self.state().stream.clone()
    }

    /// Whether the modelled FPGA is currently driving done high.
    pub fn fpga_done(&self) -> bool {
        self.state().fpga_done()
    }

    /// Makes the next transfer on `endpoint` time out.
    pub fn fail_next_timeout(&self, endpoint: u8) {
        self.state().faults.insert(endpoint, Fault::Timeout);
    }

    /// Makes the next transfer on `endpoint` fail with a stall.
    pub fn fail_next_stall(&self, endpoint: u8) {
        self.state().faults.insert(endpoint, Fault::Stall);
    }

    /// Number of times the handle was (re)opened.
    pub fn open_count(&self) -> usize {
        self.state().opens
    }

    /// Number of times the handle was released.
    pub fn release_count(&self) -> usize {
        self.state().releases
    }

    /// Number of USB resets issued.
    pub fn reset_count(&self) -> usize {
        self.state().resets
    }
}

/// Checks that every header is followed by exactly its announced data
/// before the next header. Returns a description of the first violation.
pub fn verify_framing(events: &[WireEvent]) -> Result<(), String> {
    let mut expect: Option<(CommandHeader, u32)> = None;
    for (i, event) in events.iter().enumerate() {
        match event {
            WireEvent::Header(h) => {
                if let Some((open, left)) = expect {
                    if left > 0 {
                        return Err(format!(
                            "event {i}: header {h:?} while {left} bytes of {open:?} outstanding"
                        ));
                    }
                }
                expect = Some((*h, h.size));
            }
            WireEvent::DataOut { len, .. } | WireEvent::DataIn { len, .. } => {
                let dir = if matches!(event, WireEvent::DataOut { .. }) {
                    Direction::Out
                } else {
                    Direction::In
                };
                match expect.as_mut() {
                    Some((h, left)) if h.direction == dir && *len as u32 <= *left => {
                        *left -= *len as u32;
                    }
                    _ => return Err(format!("event {i}: unexpected {event:?}")),
                }
            }
        }
    }
    match expect {
        Some((h, left)) if left > 0 => Err(format!("{left} bytes of {h:?} never transferred")),
        _ => Ok(()),
    }
}

impl UsbBackend for SimulatedDevice {
    fn write_bulk(&mut self, endpoint: u8, data: &[u8], _timeout: Duration) -> SiUsbResult<usize> {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            std::thread::sleep(latency);
        }
        let mut st = self.state();
        st.ensure_open();
        st.take_fault(endpoint)?;

        let data_phase = st.pending.as_ref().is_some_and(|p| {
            p.header.direction == Direction::Out && p.desc.write.address == endpoint
        });
        if data_phase {
            st.accept_data(endpoint, data)?;
        } else if endpoint == CONTROL_PIPE {
            st.accept_header(data)?;
        } else {
            return Err(SiUsbError::transport(endpoint, "write without command header"));
        }
        Ok(data.len())
    }

    fn read_bulk(
        &mut self,
        endpoint: u8,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> SiUsbResult<usize> {
        let latency = self.state().latency;
        if let Some(latency) = latency {
            std::thread::sleep(latency);
        }
        let mut st = self.state();
        st.ensure_open();
        st.take_fault(endpoint)?;
        st.serve_read(endpoint, buf)
    }

    fn release(&mut self) -> SiUsbResult<()> {
        let mut st = self.state();
        if st.open {
            st.open = false;
            st.releases += 1;
        }
        Ok(())
    }

    fn reset(&mut self) -> SiUsbResult<()> {
        self.state().resets += 1;
        Ok(())
    }
}
