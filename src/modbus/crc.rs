//! Modbus RTU frame check sequence.
//!
//! CRC-16 with the reflected polynomial 0xA001 and initial value 0xFFFF,
//! transmitted low byte first — the CRC-16/MODBUS of the catalogues.

/// Incremental CRC-16/MODBUS.
#[derive(Debug, Clone, Copy)]
pub struct Crc16 {
    value: u16,
}

impl Crc16 {
    pub fn new() -> Self {
        Self { value: 0xFFFF }
    }

    pub fn update(&mut self, byte: u8) {
        self.value ^= u16::from(byte);
        for _ in 0..8 {
            if self.value & 0x0001 != 0 {
                self.value = (self.value >> 1) ^ 0xA001;
            } else {
                self.value >>= 1;
            }
        }
    }

    pub fn finish(self) -> u16 {
        self.value
    }
}

impl Default for Crc16 {
    fn default() -> Self {
        Self::new()
    }
}

/// CRC of a whole buffer.
pub fn compute(data: &[u8]) -> u16 {
    let mut crc = Crc16::new();
    for &b in data {
        crc.update(b);
    }
    crc.finish()
}

/// Split a CRC into wire order (low byte first).
pub fn to_wire(crc: u16) -> [u8; 2] {
    crc.to_le_bytes()
}

/// Check the trailing two CRC bytes of a complete frame.
pub fn verify(frame: &[u8]) -> bool {
    if frame.len() < 3 {
        return false;
    }
    let (payload, fcs) = frame.split_at(frame.len() - 2);
    to_wire(compute(payload)) == [fcs[0], fcs[1]]
}

#[cfg(test)]
mod tests {
    use super::*;

    // Two independently published vectors pin the algorithm down.

    #[test]
    fn known_vector_read_request() {
        // Request "read 1 holding register at 0 from slave 1".
        let frame = [0x01, 0x03, 0x00, 0x00, 0x00, 0x01];
        assert_eq!(to_wire(compute(&frame)), [0x84, 0x0A]);
    }

    #[test]
    fn known_vector_check_string() {
        // The catalogue check value for CRC-16/MODBUS.
        assert_eq!(compute(b"123456789"), 0x4B37);
    }

    #[test]
    fn verify_accepts_and_rejects() {
        let frame = [0x01, 0x03, 0x00, 0x00, 0x00, 0x01, 0x84, 0x0A];
        assert!(verify(&frame));

        let mut bad = frame;
        bad[7] ^= 0x01;
        assert!(!verify(&bad));

        assert!(!verify(&[0x84, 0x0A]));
    }

    #[test]
    fn incremental_matches_buffer() {
        let data = [0x01, 0x10, 0x00, 0x20, 0x00, 0x02, 0x04, 0xDE, 0xAD, 0xBE, 0xEF];
        let mut crc = Crc16::new();
        for &b in &data {
            crc.update(b);
        }
        assert_eq!(crc.finish(), compute(&data));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Any single-bit corruption must be caught.
            #[test]
            fn single_bit_flip_is_detected(
                mut frame in proptest::collection::vec(any::<u8>(), 3..40),
                flip_bit in 0usize..8,
                flip_at_frac in 0.0f64..1.0,
            ) {
                let crc = to_wire(compute(&frame));
                frame.extend_from_slice(&crc);
                prop_assert!(verify(&frame));

                let idx = ((frame.len() as f64 - 1.0) * flip_at_frac) as usize;
                frame[idx] ^= 1 << flip_bit;
                prop_assert!(!verify(&frame));
            }

            /// Appending the computed CRC always verifies.
            #[test]
            fn appended_crc_verifies(frame in proptest::collection::vec(any::<u8>(), 1..64)) {
                let mut framed = frame.clone();
                framed.extend_from_slice(&to_wire(compute(&frame)));
                prop_assert!(verify(&framed));
            }
        }
    }
}
