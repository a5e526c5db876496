//! Decoding of the smartctl exit status.
//!
//! smartctl reports its result as an 8-bit mask. Bits 0 and 1 describe the
//! invocation itself and steer control flow; bits 2-7 describe the disk and
//! are passed through as metrics.

/// Meaning of each bit of the smartctl exit status, indexed by bit position.
pub const STATUS_BIT_MEANINGS: [&str; 8] = [
    "Command line did not parse",
    "Device open failed",
    "command to the disk failed, or checksum error",
    "SMART status DISK FAILING",
    "prefail Attributes <= threshold",
    "Attributes <= threshold in the past",
    "error log contains errors",
    "self-test log contains errors",
];

/// Bit 0: the command line did not parse.
pub const FATAL_BIT: u8 = 0;

/// Bit 1: the device could not be opened (asleep, or no privilege).
pub const OPEN_FAILED_BIT: u8 = 1;

/// Bit 2: a command to the disk failed.
pub const COMMAND_FAILED_BIT: u8 = 2;

/// Every bit position, in order.
pub const ALL_BITS: [u8; 8] = [0, 1, 2, 3, 4, 5, 6, 7];

/// An smartctl exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExitStatus(pub u8);

impl ExitStatus {
    /// Status with no bits set.
    pub const OK: ExitStatus = ExitStatus(0);

    /// Status with only the given bit set.
    pub const fn from_bit(bit: u8) -> Self {
        ExitStatus(1 << bit)
    }

    /// Raw status value.
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Value (0 or 1) of the given bit. Bits outside 0-7 read as 0.
    pub const fn bit(self, bit: u8) -> u8 {
        if bit > 7 {
            0
        } else {
            (self.0 >> bit) & 1
        }
    }

    /// Bit 0 is set: smartctl did not understand its arguments and produced
    /// nothing worth parsing.
    pub const fn is_fatal(self) -> bool {
        self.bit(FATAL_BIT) == 1
    }

    /// Bit 1 is set: the device could not be opened, so no attributes exist.
    pub const fn is_open_failure(self) -> bool {
        self.bit(OPEN_FAILED_BIT) == 1
    }

    /// Decode the given bit positions into `(bit, value)` pairs, in order.
    pub fn decode(self, bits: &[u8]) -> Vec<(u8, u8)> {
        bits.iter().map(|&b| (b, self.bit(b))).collect()
    }

    /// Status restricted to the bits set in `mask`.
    pub const fn masked(self, mask: u8) -> u8 {
        self.0 & mask
    }
}

impl From<u8> for ExitStatus {
    fn from(raw: u8) -> Self {
        ExitStatus(raw)
    }
}

/// Human-readable meaning of a status bit.
pub fn bit_meaning(bit: u8) -> &'static str {
    STATUS_BIT_MEANINGS
        .get(usize::from(bit))
        .copied()
        .unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fatal_and_open_failure() {
        assert!(ExitStatus(1).is_fatal());
        assert!(!ExitStatus(1).is_open_failure());
        assert!(ExitStatus(2).is_open_failure());
        assert!(!ExitStatus(2).is_fatal());
        assert!(!ExitStatus(0xFC).is_fatal());
        assert!(!ExitStatus(0xFC).is_open_failure());
    }

    #[test]
    fn test_decode_selected_bits() {
        let status = ExitStatus(0b0100_0100);
        assert_eq!(status.decode(&[2, 3, 6]), vec![(2, 1), (3, 0), (6, 1)]);
    }

    #[test]
    fn test_masked() {
        assert_eq!(ExitStatus(0xFF).masked(0xFC), 0xFC);
        assert_eq!(ExitStatus(0x42).masked(0xFF), 0x42);
    }

    #[test]
    fn test_bit_meaning() {
        assert_eq!(bit_meaning(1), "Device open failed");
        assert_eq!(bit_meaning(9), "unknown");
    }

    proptest! {
        #[test]
        fn prop_bit_matches_shift(status in any::<u8>(), bit in 0u8..8) {
            prop_assert_eq!(ExitStatus(status).bit(bit), (status >> bit) & 1);
        }

        #[test]
        fn prop_decode_all_bits_rebuilds_status(status in any::<u8>()) {
            let rebuilt = ExitStatus(status)
                .decode(&ALL_BITS)
                .into_iter()
                .fold(0u8, |acc, (bit, value)| acc | (value << bit));
            prop_assert_eq!(rebuilt, status);
        }
    }
}
