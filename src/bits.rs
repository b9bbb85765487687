//! MSB-first bit accumulators.
//!
//! The encoder and decoder state machines may be suspended between any two
//! calls, so both accumulators keep all of their progress in plain fields and
//! report how far they got instead of assuming the whole field fits.

use super::OutputCursor;

/// Source of compressed bytes for a [`BitReader`]
pub(crate) trait ByteSource {
    /// Next unread byte, or `None` once everything sunk so far is consumed
    fn next_byte(&mut self) -> Option<u8>;
}

/// Packs bits into output bytes, most significant bit first.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) struct BitWriter {
    current_byte: u8,
    bit_index: u8,
}

impl Default for BitWriter {
    fn default() -> Self {
        BitWriter::new()
    }
}

impl BitWriter {
    /// An empty accumulator
    pub(crate) const fn new() -> Self {
        BitWriter {
            current_byte: 0,
            bit_index: 0x80,
        }
    }

    /// Number of bits waiting for their byte to complete
    #[cfg(test)]
    fn pending_bits(&self) -> u8 {
        self.bit_index.leading_zeros() as u8
    }

    /// True when no partial byte is held
    fn is_empty(&self) -> bool {
        self.bit_index == 0x80
    }

    /// Push the low `count` bits of `bits` (at most 8), high bit first.
    ///
    /// Returns the number of bits transferred. This is less than `count`
    /// only when a completed byte would not fit in `out`.
    pub(crate) fn push_bits(&mut self, count: u8, bits: u8, out: &mut OutputCursor) -> u8 {
        debug_assert!(count <= 8);

        if count == 8 && self.bit_index == 0x80 {
            if !out.can_take_byte() {
                return 0;
            }
            out.push_byte(bits);
            return 8;
        }

        let mut pushed = 0;
        for i in (0..count).rev() {
            if self.bit_index == 0x01 && !out.can_take_byte() {
                break;
            }
            if bits & (1 << i) != 0 {
                self.current_byte |= self.bit_index;
            }
            self.bit_index >>= 1;
            pushed += 1;
            if self.bit_index == 0 {
                out.push_byte(self.current_byte);
                self.current_byte = 0;
                self.bit_index = 0x80;
            }
        }
        pushed
    }

    /// Emit the partial byte, zero padded. Returns false if `out` is full
    /// and a byte is still pending.
    pub(crate) fn flush(&mut self, out: &mut OutputCursor) -> bool {
        if self.is_empty() {
            return true;
        }
        if !out.can_take_byte() {
            return false;
        }
        out.push_byte(self.current_byte);
        *self = BitWriter::new();
        true
    }
}

/// Unpacks fields of up to 15 bits from a byte stream, most significant bit
/// first.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub(crate) struct BitReader {
    current_byte: u8,
    /// mask of the next bit to read in `current_byte`, 0 when exhausted
    bit_index: u8,
    field: u16,
    field_bits: u8,
}

impl BitReader {
    /// A reader with nothing buffered
    pub(crate) const fn new() -> Self {
        BitReader {
            current_byte: 0,
            bit_index: 0,
            field: 0,
            field_bits: 0,
        }
    }

    /// Bits left in the byte currently being read
    #[cfg(test)]
    fn bits_available(&self) -> u8 {
        if self.bit_index == 0 {
            0
        } else {
            self.bit_index.trailing_zeros() as u8 + 1
        }
    }

    /// True when no partially read field is pending
    #[cfg(test)]
    fn is_aligned(&self) -> bool {
        self.field_bits == 0
    }

    /// Read a `count` bit field.
    ///
    /// Returns `None` when `src` runs dry first. The bits read so far are
    /// kept, and the next call with the same `count` picks up after them.
    pub(crate) fn pull_bits<S: ByteSource>(&mut self, count: u8, src: &mut S) -> Option<u16> {
        debug_assert!(count <= 15);

        while self.field_bits < count {
            if self.bit_index == 0 {
                self.current_byte = src.next_byte()?;
                self.bit_index = 0x80;
            }
            self.field <<= 1;
            if self.current_byte & self.bit_index != 0 {
                self.field |= 0x1;
            }
            self.bit_index >>= 1;
            self.field_bits += 1;
        }

        let value = self.field;
        self.field = 0;
        self.field_bits = 0;
        Some(value)
    }
}
