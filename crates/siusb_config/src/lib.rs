//! Parsing and validation of `siusb.toml` host configuration files.
//!
//! The file selects which board to open, how long transfers may take and
//! which bitstream `siusb download` loads by default. Every section is
//! optional; an empty file yields [`SiUsbConfig::default`].

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{find_config, load_config, load_config_from_str, CONFIG_FILE_NAME};
pub use types::*;
