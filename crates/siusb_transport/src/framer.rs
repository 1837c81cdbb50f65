//! Splitting logical transfers into headers and bulk packets.
//!
//! A logical transfer is cut into chunks of at most the endpoint's maximum
//! transfer size. Each chunk gets its own command header carrying the
//! chunk's own start address, then travels in packets of at most the
//! endpoint's maximum packet size.
//!
//! The functions here take the backend by `&mut` and are only reachable
//! through [`Transport`](crate::Transport), which holds the device lock for
//! the whole logical transfer.

use std::ops::Range;
use std::time::Duration;

use siusb_common::{SiUsbError, SiUsbResult};

use crate::backend::UsbBackend;
use crate::header::{CommandHeader, Direction, CONTROL_PIPE};
use crate::subsystem::SubsystemDescriptor;

/// One header's worth of a logical transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Address sent in this chunk's header.
    pub address: u32,
    /// Byte range of the chunk within the logical transfer.
    pub range: Range<usize>,
}

impl Chunk {
    /// Number of bytes in this chunk.
    pub fn len(&self) -> usize {
        self.range.len()
    }

    /// Returns `true` for an empty chunk (never produced by [`plan_chunks`]).
    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Cuts `len` bytes starting at `address` into chunks of at most `max_transfer`.
///
/// The whole range must fit the 32-bit address space; otherwise
/// [`SiUsbError::AddressOverflow`] is returned and nothing is planned.
pub fn plan_chunks(address: u32, len: usize, max_transfer: usize) -> SiUsbResult<Vec<Chunk>> {
    let end = u64::from(address) + len as u64;
    if end > u64::from(u32::MAX) + 1 {
        return Err(SiUsbError::AddressOverflow { address, size: len });
    }
    let max_transfer = max_transfer.max(1);
    let chunks = (0..len)
        .step_by(max_transfer)
        .map(|offset| Chunk {
            // in range: address + len <= 2^32 was checked above
            address: address.wrapping_add(offset as u32),
            range: offset..(offset + max_transfer).min(len),
        })
        .collect();
    Ok(chunks)
}

/// Writes `data` to a subsystem, one header per chunk.
pub fn write_chunked<B: UsbBackend + ?Sized>(
    backend: &mut B,
    desc: &SubsystemDescriptor,
    address: u32,
    data: &[u8],
    timeout: Duration,
) -> SiUsbResult<()> {
    let ep = desc.write;
    for chunk in plan_chunks(address, data.len(), ep.max_transfer_size)? {
        let payload = &data[chunk.range.clone()];
        send_header(
            backend,
            CommandHeader {
                subsystem: desc.id,
                direction: Direction::Out,
                address: chunk.address,
                size: payload.len() as u32,
            },
            timeout,
        )?;
        for packet in payload.chunks(ep.max_packet_size) {
            write_all(backend, ep.address, packet, timeout)?;
        }
    }
    Ok(())
}

/// Reads `size` bytes from a subsystem, one header per chunk.
pub fn read_chunked<B: UsbBackend + ?Sized>(
    backend: &mut B,
    desc: &SubsystemDescriptor,
    address: u32,
    size: usize,
    timeout: Duration,
) -> SiUsbResult<Vec<u8>> {
    let ep = desc.read;
    let chunks = plan_chunks(address, size, ep.max_transfer_size)?;
    let mut out = vec![0u8; size];
    for chunk in chunks {
        send_header(
            backend,
            CommandHeader {
                subsystem: desc.id,
                direction: Direction::In,
                address: chunk.address,
                size: chunk.len() as u32,
            },
            timeout,
        )?;
        for packet in out[chunk.range].chunks_mut(ep.max_packet_size) {
            read_exact(backend, ep.address, packet, timeout)?;
        }
    }
    Ok(out)
}

fn send_header<B: UsbBackend + ?Sized>(
    backend: &mut B,
    header: CommandHeader,
    timeout: Duration,
) -> SiUsbResult<()> {
    log::trace!(
        "header: subsystem {} {:?} addr 0x{:08x} size {}",
        header.subsystem,
        header.direction,
        header.address,
        header.size
    );
    write_all(backend, CONTROL_PIPE, &header.encode(), timeout)
}

/// Submits `data` until the stack has accepted all of it.
fn write_all<B: UsbBackend + ?Sized>(
    backend: &mut B,
    endpoint: u8,
    mut data: &[u8],
    timeout: Duration,
) -> SiUsbResult<()> {
    while !data.is_empty() {
        let n = backend.write_bulk(endpoint, data, timeout)?;
        if n == 0 {
            return Err(SiUsbError::transport(endpoint, "device accepted no data"));
        }
        data = &data[n.min(data.len())..];
    }
    Ok(())
}

/// Fills `buf` completely from `endpoint`.
fn read_exact<B: UsbBackend + ?Sized>(
    backend: &mut B,
    endpoint: u8,
    buf: &mut [u8],
    timeout: Duration,
) -> SiUsbResult<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = backend.read_bulk(endpoint, &mut buf[filled..], timeout)?;
        if n == 0 {
            return Err(SiUsbError::transport(
                endpoint,
                format!("short read: got {filled} of {} bytes", buf.len()),
            ));
        }
        filled += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimulatedDevice, WireEvent};
    use crate::subsystem::Subsystem;

    const T: Duration = Duration::from_millis(10);

    #[test]
    fn plan_empty() {
        assert!(plan_chunks(0x100, 0, 64).unwrap().is_empty());
    }

    #[test]
    fn plan_exact_multiple() {
        let chunks = plan_chunks(0x1000, 128, 64).unwrap();
        assert_eq!(
            chunks,
            vec![
                Chunk { address: 0x1000, range: 0..64 },
                Chunk { address: 0x1040, range: 64..128 },
            ]
        );
    }

    #[test]
    fn plan_one_past_boundary() {
        let chunks = plan_chunks(0, 0x8FFF + 1, 0x8FFF).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].address, 0x8FFF);
        assert_eq!(chunks[1].len(), 1);
    }

    #[test]
    fn plan_addresses_follow_offsets() {
        let chunks = plan_chunks(7, 1000, 300).unwrap();
        let addrs: Vec<u32> = chunks.iter().map(|c| c.address).collect();
        assert_eq!(addrs, vec![7, 307, 607, 907]);
        assert_eq!(chunks.last().unwrap().len(), 100);
    }

    #[test]
    fn plan_top_of_address_space() {
        assert!(plan_chunks(u32::MAX, 1, 64).is_ok());
        assert!(matches!(
            plan_chunks(u32::MAX, 2, 64),
            Err(SiUsbError::AddressOverflow { .. })
        ));
    }

    #[test]
    fn write_emits_one_header_per_chunk_with_incrementing_address() {
        let mut sim = SimulatedDevice::new();
        let desc = Subsystem::External.descriptor();
        let data = vec![0x5A; 0x8FFF * 2 + 10];
        write_chunked(&mut sim, &desc, 0x100, &data, T).unwrap();

        let headers = sim.headers();
        assert_eq!(headers.len(), 3);
        assert_eq!(headers[0].address, 0x100);
        assert_eq!(headers[1].address, 0x100 + 0x8FFF);
        assert_eq!(headers[2].address, 0x100 + 2 * 0x8FFF);
        assert_eq!(headers[2].size, 10);
        assert!(headers.iter().all(|h| h.direction == Direction::Out));
    }

    #[test]
    fn packets_respect_max_packet_size() {
        let mut sim = SimulatedDevice::new();
        let desc = Subsystem::External.descriptor();
        write_chunked(&mut sim, &desc, 0, &[1u8; 200], T).unwrap();

        let sizes: Vec<usize> = sim
            .events()
            .into_iter()
            .filter_map(|e| match e {
                WireEvent::DataOut { len, .. } => Some(len),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![64, 64, 64, 8]);
    }

    #[test]
    fn read_pulls_in_packets() {
        let mut sim = SimulatedDevice::new();
        sim.preload(Subsystem::Eeprom, 0x3000, &(0..150u8).collect::<Vec<_>>());
        let desc = Subsystem::Eeprom.descriptor();
        let out = read_chunked(&mut sim, &desc, 0x3000, 150, T).unwrap();
        assert_eq!(out, (0..150u8).collect::<Vec<_>>());

        let sizes: Vec<usize> = sim
            .events()
            .into_iter()
            .filter_map(|e| match e {
                WireEvent::DataIn { endpoint, len } => {
                    assert_eq!(endpoint, 0x81);
                    Some(len)
                }
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![64, 64, 22]);
    }

    #[test]
    fn timeout_propagates() {
        let mut sim = SimulatedDevice::new();
        sim.fail_next_timeout(0x81);
        let desc = Subsystem::External.descriptor();
        let err = read_chunked(&mut sim, &desc, 0, 4, T).unwrap_err();
        assert!(matches!(err, SiUsbError::TransportTimeout { endpoint: 0x81 }));
    }
}
