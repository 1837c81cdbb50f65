//! Configuration file discovery, loading and validation.

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::types::SiUsbConfig;

/// Name of the configuration file searched for by [`find_config`].
pub const CONFIG_FILE_NAME: &str = "siusb.toml";

/// Walks up from `start` looking for a `siusb.toml`.
///
/// Returns the path of the first one found, or `None` at the filesystem root.
pub fn find_config(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(CONFIG_FILE_NAME))
        .find(|candidate| candidate.is_file())
}

/// Loads and validates a configuration file.
///
/// A relative `fpga.bitstream` is resolved against the file's directory.
pub fn load_config(path: &Path) -> Result<SiUsbConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config = load_config_from_str(&content)?;
    if let (Some(bitstream), Some(dir)) = (config.fpga.bitstream.as_mut(), path.parent()) {
        if bitstream.is_relative() {
            *bitstream = dir.join(&*bitstream);
        }
    }
    Ok(config)
}

/// Parses and validates a configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<SiUsbConfig, ConfigError> {
    let config: SiUsbConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &SiUsbConfig) -> Result<(), ConfigError> {
    let t = &config.timeouts;
    if t.transfer_ms == 0 {
        return Err(ConfigError::ValidationError(
            "timeouts.transfer_ms must be non-zero".to_string(),
        ));
    }
    if t.firmware_ms == 0 {
        return Err(ConfigError::ValidationError(
            "timeouts.firmware_ms must be non-zero".to_string(),
        ));
    }
    if t.firmware_ms < t.transfer_ms {
        return Err(ConfigError::ValidationError(format!(
            "timeouts.firmware_ms ({}) is shorter than timeouts.transfer_ms ({})",
            t.firmware_ms, t.transfer_ms
        )));
    }
    if let Some(id) = &config.device.board_id {
        if id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "device.board_id must not be empty".to_string(),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn empty_config_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config, SiUsbConfig::default());
    }

    #[test]
    fn parse_full_config() {
        let toml = r#"
[device]
vendor_id = 0x5312
product_id = 0x0201
board_id = "42"

[timeouts]
transfer_ms = 500
firmware_ms = 8000

[fpga]
bitstream = "/opt/fw/mio.bit"
skip_if_loaded = true
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.device.vendor_id, 0x5312);
        assert_eq!(config.device.product_id, 0x0201);
        assert_eq!(config.device.board_id.as_deref(), Some("42"));
        assert_eq!(config.timeouts.transfer_ms, 500);
        assert_eq!(config.timeouts.firmware_ms, 8000);
        assert_eq!(
            config.fpga.bitstream.as_deref(),
            Some(Path::new("/opt/fw/mio.bit"))
        );
        assert!(config.fpga.skip_if_loaded);
    }

    #[test]
    fn partial_section_keeps_other_defaults() {
        let config = load_config_from_str("[timeouts]\nfirmware_ms = 10000\n").unwrap();
        assert_eq!(config.timeouts.transfer_ms, 1000);
        assert_eq!(config.timeouts.firmware_ms, 10000);
        assert_eq!(config.device.vendor_id, 0x5312);
    }

    #[test]
    fn zero_timeout_errors() {
        let err = load_config_from_str("[timeouts]\ntransfer_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn firmware_shorter_than_transfer_errors() {
        let toml = "[timeouts]\ntransfer_ms = 2000\nfirmware_ms = 1000\n";
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn blank_board_id_errors() {
        let err = load_config_from_str("[device]\nboard_id = \"  \"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn invalid_toml_errors() {
        let err = load_config_from_str("this is not valid toml {{{}}}").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn wrong_type_errors() {
        let err = load_config_from_str("[device]\nvendor_id = \"abc\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn relative_bitstream_resolved_against_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[fpga]\nbitstream = \"fw/top.bit\"\n").unwrap();
        let config = load_config(&path).unwrap();
        assert_eq!(
            config.fpga.bitstream,
            Some(tmp.path().join("fw").join("top.bit"))
        );
    }

    #[test]
    fn missing_file_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let err = load_config(&tmp.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }

    #[test]
    fn find_config_in_current_dir() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE_NAME), "").unwrap();
        assert_eq!(
            find_config(tmp.path()),
            Some(tmp.path().join(CONFIG_FILE_NAME))
        );
    }

    #[test]
    fn find_config_in_parent() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(CONFIG_FILE_NAME), "").unwrap();
        let sub = tmp.path().join("a").join("b");
        fs::create_dir_all(&sub).unwrap();
        assert_eq!(find_config(&sub), Some(tmp.path().join(CONFIG_FILE_NAME)));
    }
}
