//! Board identity fields stored in the EEPROM.
//!
//! Fields sit back to back from [`EEPROM_OFFSET_ADDR`]: the manufacturer
//! string, the board name (first byte is its length) and the board id
//! (a marker byte on each side).

/// Start of the identity block.
pub const EEPROM_OFFSET_ADDR: u32 = 0x3000;
/// Manufacturer string address.
pub const EEPROM_MFG_ADDR: u32 = EEPROM_OFFSET_ADDR;
/// Manufacturer string length.
pub const EEPROM_MFG_SIZE: usize = 21;
/// Board name address.
pub const EEPROM_NAME_ADDR: u32 = EEPROM_MFG_ADDR + EEPROM_MFG_SIZE as u32;
/// Board name field length, including the length byte.
pub const EEPROM_NAME_SIZE: usize = 21;
/// Board id address.
pub const EEPROM_ID_ADDR: u32 = EEPROM_NAME_ADDR + EEPROM_NAME_SIZE as u32;
/// Board id field length, including both markers.
pub const EEPROM_ID_SIZE: usize = 5;

/// Decodes bytes as UTF-8, dropping anything invalid.
pub fn decode_text(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .chars()
        .filter(|&c| c != char::REPLACEMENT_CHARACTER)
        .collect()
}

/// Decodes the length-prefixed board name field.
pub fn decode_name(raw: &[u8]) -> String {
    let Some((&len, rest)) = raw.split_first() else {
        return String::new();
    };
    let len = (len as usize).min(rest.len());
    decode_text(&rest[..len])
}

/// Decodes the board id field, trimming the leading and trailing marker.
pub fn decode_board_id(raw: &[u8]) -> String {
    if raw.len() < 2 {
        return String::new();
    }
    decode_text(&raw[1..raw.len() - 1])
}

/// Keeps only the decimal digits of a board id.
pub fn board_digits(board_id: &str) -> String {
    board_id.chars().filter(char::is_ascii_digit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_addresses() {
        assert_eq!(EEPROM_NAME_ADDR, 0x3015);
        assert_eq!(EEPROM_ID_ADDR, 0x302A);
    }

    #[test]
    fn name_uses_length_prefix() {
        let mut raw = vec![0u8; EEPROM_NAME_SIZE];
        raw[0] = 6;
        raw[1..7].copy_from_slice(b"USBpix");
        raw[7..10].copy_from_slice(b"xyz");
        assert_eq!(decode_name(&raw), "USBpix");
    }

    #[test]
    fn name_length_is_clamped() {
        let raw = [0xFF, b'a', b'b'];
        assert_eq!(decode_name(&raw), "ab");
        assert_eq!(decode_name(&[]), "");
    }

    #[test]
    fn board_id_markers_trimmed() {
        assert_eq!(decode_board_id(b"#123$"), "123");
        assert_eq!(decode_board_id(b"x"), "");
    }

    #[test]
    fn invalid_utf8_dropped() {
        assert_eq!(decode_text(&[b'1', 0xFF, b'2']), "12");
    }

    #[test]
    fn digits_only() {
        assert_eq!(board_digits("B-042"), "042");
        assert_eq!(board_digits("abc"), "");
    }
}
