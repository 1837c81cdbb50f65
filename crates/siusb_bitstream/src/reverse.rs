//! Bit-order reversal for configuration payloads.
//!
//! Bytes in a `.bit` file are stored MSB first, while the board's parallel
//! configuration port clocks them in LSB first. Reversing the eight bits of
//! every byte converts between the two orders. The operation is its own
//! inverse.

/// Reverses the order of the eight bits in `byte` (`0x01` becomes `0x80`).
pub const fn reverse_bits(byte: u8) -> u8 {
    byte.reverse_bits()
}

/// Reverses the bit order of every byte in `payload` in place.
pub fn reverse_payload(payload: &mut [u8]) {
    for byte in payload.iter_mut() {
        *byte = reverse_bits(*byte);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_values() {
        assert_eq!(reverse_bits(0x01), 0x80);
        assert_eq!(reverse_bits(0xAA), 0x55);
        assert_eq!(reverse_bits(0x0F), 0xF0);
        assert_eq!(reverse_bits(0x00), 0x00);
        assert_eq!(reverse_bits(0xFF), 0xFF);
        assert_eq!(reverse_bits(0x12), 0x48);
    }

    #[test]
    fn self_inverse_for_every_byte() {
        for b in 0..=u8::MAX {
            assert_eq!(reverse_bits(reverse_bits(b)), b);
        }
    }

    #[test]
    fn payload_in_place() {
        let mut data = vec![0x01, 0x02, 0xAA, 0xC0];
        reverse_payload(&mut data);
        assert_eq!(data, vec![0x80, 0x40, 0x55, 0x03]);
    }

    #[test]
    fn empty_payload() {
        let mut data: Vec<u8> = Vec::new();
        reverse_payload(&mut data);
        assert!(data.is_empty());
    }
}
