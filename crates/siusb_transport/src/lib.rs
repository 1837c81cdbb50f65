//! Command framing for the SILAB USB board protocol.
//!
//! Every logical transfer is announced on the control pipe by a 10-byte
//! [`CommandHeader`] naming a subsystem, a direction, an address and a size.
//! The payload then follows on the subsystem's data endpoint, split to fit
//! the endpoint's transfer and packet limits. This crate provides:
//!
//! - the fixed [`subsystem`] registry of endpoint profiles,
//! - the [`header`] codec,
//! - the [`UsbBackend`] seam to the USB host stack,
//! - the chunking [`framer`],
//! - [`Transport`], which serializes logical transfers behind one lock,
//! - `sim::SimulatedDevice`, an in-memory board for tests, behind the `sim`
//!   feature.

#![warn(missing_docs)]

pub mod backend;
pub mod framer;
pub mod header;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod subsystem;
pub mod transport;

pub use backend::UsbBackend;
pub use header::{CommandHeader, Direction, CONTROL_PIPE, HEADER_LEN};
pub use subsystem::{descriptor_for, EndpointDescriptor, Subsystem, SubsystemDescriptor};
pub use transport::{Timeouts, Transport};
