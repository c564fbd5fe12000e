//! The contract shared by every entropy coder, and codec selection.
//!
//! Each family implements [`EntropyEncoder`] / [`EntropyDecoder`]. The bulk
//! `encode`/`decode` methods default to a plain loop over the single-symbol
//! methods ([`encode_bytes`] / [`decode_bytes`]); coders that need per-block
//! work (Huffman) override them and call the same loops afterwards.
//!
//! Coders are single-owner state machines: every operation takes `&mut self`
//! and a decoder must see exactly the bit sequence its encoder produced.

use std::fmt;
use std::str::FromStr;

use crate::bitstream::{InputBitStream, OutputBitStream};
use crate::error::{Error, Result};
use crate::expgolomb::{ExpGolombDecoder, ExpGolombEncoder};
use crate::huffman::{HuffmanDecoder, HuffmanEncoder};
use crate::paq::{PaqDecoder, PaqEncoder};
use crate::range::{RangeDecoder, RangeEncoder};

/// Symbol-at-a-time entropy encoder bound to an output bit stream.
pub trait EntropyEncoder {
    /// Encode one symbol.
    ///
    /// Returns `false` if the bit stream did not accept the full code.
    fn encode_byte(&mut self, symbol: u8) -> bool;

    /// Encode a whole block and return the number of symbols encoded.
    ///
    /// A count below `block.len()` means the bit stream refused a write.
    fn encode(&mut self, block: &[u8]) -> Result<usize> {
        Ok(encode_bytes(self, block))
    }

    /// Flush any trailing coder state to the bit stream.
    fn dispose(&mut self) -> Result<()> {
        self.bit_stream().flush()
    }

    /// The bit stream this encoder writes to.
    fn bit_stream(&mut self) -> &mut dyn OutputBitStream;
}

/// Symbol-at-a-time entropy decoder bound to an input bit stream.
pub trait EntropyDecoder {
    /// Decode one symbol.
    ///
    /// # Errors
    /// `EndOfStream` if the bits run out mid-symbol, `InvalidStream` if the
    /// bits cannot have been produced by the matching encoder.
    fn decode_byte(&mut self) -> Result<u8>;

    /// Fill `block` with decoded symbols and return how many were decoded.
    fn decode(&mut self, block: &mut [u8]) -> Result<usize> {
        decode_bytes(self, block)
    }

    /// Release trailing decoder state.
    fn dispose(&mut self) -> Result<()> {
        Ok(())
    }

    /// The bit stream this decoder reads from.
    fn bit_stream(&mut self) -> &mut dyn InputBitStream;
}

/// Encode every symbol of `block`, stopping at the first refused write.
pub fn encode_bytes<E: EntropyEncoder + ?Sized>(encoder: &mut E, block: &[u8]) -> usize {
    for (i, &symbol) in block.iter().enumerate() {
        if !encoder.encode_byte(symbol) {
            return i;
        }
    }
    block.len()
}

/// Decode `block.len()` symbols into `block`.
pub fn decode_bytes<D: EntropyDecoder + ?Sized>(decoder: &mut D, block: &mut [u8]) -> Result<usize> {
    for slot in block.iter_mut() {
        *slot = decoder.decode_byte()?;
    }
    Ok(block.len())
}

/// Entropy codec family, with a stable numeric id for serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntropyCodecType {
    /// Canonical Huffman with per-block code length header.
    Huffman,
    /// Adaptive order-0 range coder.
    Range,
    /// PAQ-style context-mixing binary arithmetic coder.
    Paq,
    /// Unsigned Exp-Golomb.
    ExpGolomb,
    /// Signed Exp-Golomb (bytes read as `i8`).
    SignedExpGolomb,
}

impl EntropyCodecType {
    /// All codec types, in id order.
    pub const ALL: [EntropyCodecType; 5] = [
        EntropyCodecType::Huffman,
        EntropyCodecType::Range,
        EntropyCodecType::Paq,
        EntropyCodecType::ExpGolomb,
        EntropyCodecType::SignedExpGolomb,
    ];

    /// Stable numeric id of this codec type.
    pub const fn id(self) -> u8 {
        match self {
            EntropyCodecType::Huffman => 1,
            EntropyCodecType::Range => 2,
            EntropyCodecType::Paq => 3,
            EntropyCodecType::ExpGolomb => 4,
            EntropyCodecType::SignedExpGolomb => 5,
        }
    }

    /// Canonical upper-case name.
    pub const fn name(self) -> &'static str {
        match self {
            EntropyCodecType::Huffman => "HUFFMAN",
            EntropyCodecType::Range => "RANGE",
            EntropyCodecType::Paq => "PAQ",
            EntropyCodecType::ExpGolomb => "EXPGOLOMB",
            EntropyCodecType::SignedExpGolomb => "SIGNED_EXPGOLOMB",
        }
    }
}

impl TryFrom<u8> for EntropyCodecType {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self> {
        EntropyCodecType::ALL
            .into_iter()
            .find(|codec| codec.id() == id)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown entropy codec id: {id}")))
    }
}

impl FromStr for EntropyCodecType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        EntropyCodecType::ALL
            .into_iter()
            .find(|codec| codec.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidArgument(format!("unknown entropy codec: {s:?}")))
    }
}

impl fmt::Display for EntropyCodecType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Build an encoder of the given family writing to `stream`.
pub fn new_encoder<'a, W>(codec: EntropyCodecType, stream: W) -> Box<dyn EntropyEncoder + 'a>
where
    W: OutputBitStream + 'a,
{
    match codec {
        EntropyCodecType::Huffman => Box::new(HuffmanEncoder::new(stream)),
        EntropyCodecType::Range => Box::new(RangeEncoder::new(stream)),
        EntropyCodecType::Paq => Box::new(PaqEncoder::new(stream)),
        EntropyCodecType::ExpGolomb => Box::new(ExpGolombEncoder::new(stream, false)),
        EntropyCodecType::SignedExpGolomb => Box::new(ExpGolombEncoder::new(stream, true)),
    }
}

/// Build a decoder of the given family reading from `stream`.
pub fn new_decoder<'a, R>(codec: EntropyCodecType, stream: R) -> Box<dyn EntropyDecoder + 'a>
where
    R: InputBitStream + 'a,
{
    match codec {
        EntropyCodecType::Huffman => Box::new(HuffmanDecoder::new(stream)),
        EntropyCodecType::Range => Box::new(RangeDecoder::new(stream)),
        EntropyCodecType::Paq => Box::new(PaqDecoder::new(stream)),
        EntropyCodecType::ExpGolomb => Box::new(ExpGolombDecoder::new(stream, false)),
        EntropyCodecType::SignedExpGolomb => Box::new(ExpGolombDecoder::new(stream, true)),
    }
}
