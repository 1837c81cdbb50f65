//! Shared foundational types used across the siusb crates.
//!
//! This crate provides the error taxonomy for talking to SILAB USB boards and
//! the common result alias every fallible operation returns.

#![warn(missing_docs)]

pub mod result;

pub use result::{SiUsbError, SiUsbResult};
