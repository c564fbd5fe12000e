//! Exp-Golomb coding of bytes.
//!
//! A byte `v` is coded from its magnitude `m = |v|`: zero is the single bit
//! `1`; otherwise, with `e = m + 1` and `L = floor(log2 e)`, the code is `L`
//! zero bits followed by the `L + 1` significant bits of `e`. In signed mode
//! the byte is read as `i8` and a sign bit (1 = negative) follows every
//! non-zero code.
//!
//! ```text
//!   unsigned  0 -> 1        1 -> 010      2 -> 011      3 -> 00100
//!   signed    1 -> 0100    -1 -> 0101    -128 -> 0000000 10000001 1
//! ```
//!
//! The coder is stateless: no header, no adaptation, nothing to flush beyond
//! the bit stream itself.

use crate::bitstream::{InputBitStream, OutputBitStream};
use crate::codec::{EntropyDecoder, EntropyEncoder};
use crate::error::{Error, Result};

/// Longest zero prefix a byte can produce (`255 + 1 = 2^8`).
const MAX_PREFIX_ZEROS: u32 = 8;

/// Exp-Golomb encoder.
#[derive(Debug)]
pub struct ExpGolombEncoder<W: OutputBitStream> {
    bitstream: W,
    signed: bool,
}

impl<W: OutputBitStream> ExpGolombEncoder<W> {
    /// Create an encoder; `signed` selects the `i8` interpretation of bytes.
    pub fn new(bitstream: W, signed: bool) -> Self {
        Self { bitstream, signed }
    }

    /// Whether bytes are coded as signed values.
    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// Release the underlying bit stream.
    pub fn into_inner(self) -> W {
        self.bitstream
    }
}

impl<W: OutputBitStream> EntropyEncoder for ExpGolombEncoder<W> {
    fn encode_byte(&mut self, symbol: u8) -> bool {
        if symbol == 0 {
            return self.bitstream.write_bit(1);
        }

        let (magnitude, negative) = if self.signed {
            let v = symbol as i8;
            (u64::from(v.unsigned_abs()), v < 0)
        } else {
            (u64::from(symbol), false)
        };

        let emit = magnitude + 1;
        let log2 = 63 - emit.leading_zeros();

        // The top L bits of a (2L+1)-bit field holding `emit` are the zero prefix.
        let (code, length) = if self.signed {
            ((emit << 1) | u64::from(negative), 2 * log2 + 2)
        } else {
            (emit, 2 * log2 + 1)
        };

        self.bitstream.write_bits(code, length) == length
    }

    fn bit_stream(&mut self) -> &mut dyn OutputBitStream {
        &mut self.bitstream
    }
}

/// Exp-Golomb decoder.
#[derive(Debug)]
pub struct ExpGolombDecoder<R: InputBitStream> {
    bitstream: R,
    signed: bool,
}

impl<R: InputBitStream> ExpGolombDecoder<R> {
    /// Create a decoder; `signed` must match the encoder.
    pub fn new(bitstream: R, signed: bool) -> Self {
        Self { bitstream, signed }
    }

    /// Whether bytes are decoded as signed values.
    pub fn is_signed(&self) -> bool {
        self.signed
    }

    /// Release the underlying bit stream.
    pub fn into_inner(self) -> R {
        self.bitstream
    }
}

impl<R: InputBitStream> EntropyDecoder for ExpGolombDecoder<R> {
    fn decode_byte(&mut self) -> Result<u8> {
        let mut log2 = 0u32;
        while self.bitstream.read_bit()? == 0 {
            log2 += 1;
            if log2 > MAX_PREFIX_ZEROS {
                return Err(Error::InvalidStream(format!(
                    "exp-golomb prefix longer than {MAX_PREFIX_ZEROS} zero bits"
                )));
            }
        }

        if log2 == 0 {
            return Ok(0);
        }

        let info = self.bitstream.read_bits(log2)?;
        let magnitude = (1u64 << log2) - 1 + info;

        if !self.signed {
            return u8::try_from(magnitude).map_err(|_| {
                Error::InvalidStream(format!("exp-golomb value {magnitude} exceeds a byte"))
            });
        }

        let negative = self.bitstream.read_bit()? == 1;
        let value = if negative {
            -(magnitude as i64)
        } else {
            magnitude as i64
        };
        i8::try_from(value)
            .map(|v| v as u8)
            .map_err(|_| Error::InvalidStream(format!("exp-golomb value {value} exceeds an i8")))
    }

    fn bit_stream(&mut self) -> &mut dyn InputBitStream {
        &mut self.bitstream
    }
}
