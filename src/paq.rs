//! Context-mixing binary arithmetic coder.
//!
//! Bytes are coded one bit at a time, most significant bit first. For every
//! bit the [`Predictor`] supplies `p = P(bit = 1)` in 12 bits, and the 32-bit
//! interval `[low, high]` is split at
//!
//! ```text
//! xmid = low + (high - low) * p / 4096
//! ```
//!
//! A 1 keeps `[low, xmid]`, a 0 keeps `[xmid + 1, high]`. Once `low` and
//! `high` share their top byte it is final and gets shifted out.
//!
//! The coder has no header and no error signaling of its own: a decoder fed
//! bytes from anything but the matching encoder produces garbage rather than
//! an error. Model state is never reset, so the coder spans a whole stream.

use tracing::debug;

use crate::bitstream::{InputBitStream, OutputBitStream};
use crate::codec::{EntropyDecoder, EntropyEncoder};
use crate::error::{Error, Result};
use crate::predictor::Predictor;

const TOP_BYTE: u64 = 0xFF00_0000;
const WINDOW: u64 = 0xFFFF_FFFF;

/// Split point of `[low, high]` for probability `pred` (12 bits).
#[inline]
fn split(low: u64, high: u64, pred: u32) -> u64 {
    let range = high - low;
    let pred = u64::from(pred);
    low + (range >> 12) * pred + (((range & 0xFFF) * pred) >> 12)
}

/// Context-mixing encoder.
#[derive(Debug)]
pub struct PaqEncoder<W: OutputBitStream> {
    bitstream: W,
    predictor: Predictor,
    low: u64,
    high: u64,
    symbols: u64,
    disposed: bool,
}

impl<W: OutputBitStream> PaqEncoder<W> {
    /// Create an encoder with a fresh predictor.
    pub fn new(bitstream: W) -> Self {
        Self {
            bitstream,
            predictor: Predictor::new(),
            low: 0,
            high: WINDOW,
            symbols: 0,
            disposed: false,
        }
    }

    /// The model driving this encoder.
    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    /// Borrow the underlying bit stream.
    pub fn get_ref(&self) -> &W {
        &self.bitstream
    }

    /// Release the underlying bit stream.
    pub fn into_inner(self) -> W {
        self.bitstream
    }

    fn encode_bit(&mut self, bit: u32) -> bool {
        let xmid = split(self.low, self.high, self.predictor.get());
        if bit == 1 {
            self.high = xmid;
        } else {
            self.low = xmid + 1;
        }
        self.predictor.update(bit);

        let mut ok = true;
        while (self.low ^ self.high) & TOP_BYTE == 0 {
            ok &= self.bitstream.write_bits(self.high >> 24, 8) == 8;
            self.low = (self.low << 8) & WINDOW;
            self.high = ((self.high << 8) | 255) & WINDOW;
        }
        ok
    }
}

impl<W: OutputBitStream> EntropyEncoder for PaqEncoder<W> {
    fn encode_byte(&mut self, symbol: u8) -> bool {
        let mut ok = true;
        for shift in (0..8).rev() {
            ok &= self.encode_bit(u32::from(symbol >> shift) & 1);
        }
        self.symbols += 1;
        ok
    }

    /// Write the 4 bytes of `low`. Only the first call writes.
    fn dispose(&mut self) -> Result<()> {
        if self.disposed || self.symbols == 0 {
            return Ok(());
        }
        self.disposed = true;

        if self.bitstream.write_bits(self.low, 32) != 32 {
            return Err(Error::StreamClosed);
        }
        debug!(symbols = self.symbols, bytes = 4, "context-mixing coder flushed");
        self.bitstream.flush()
    }

    fn bit_stream(&mut self) -> &mut dyn OutputBitStream {
        &mut self.bitstream
    }
}

/// Context-mixing decoder.
#[derive(Debug)]
pub struct PaqDecoder<R: InputBitStream> {
    bitstream: R,
    predictor: Predictor,
    low: u64,
    high: u64,
    current: Option<u64>,
}

impl<R: InputBitStream> PaqDecoder<R> {
    /// Create a decoder with a fresh predictor. The first 4 bytes are read
    /// with the first symbol.
    pub fn new(bitstream: R) -> Self {
        Self {
            bitstream,
            predictor: Predictor::new(),
            low: 0,
            high: WINDOW,
            current: None,
        }
    }

    /// The model driving this decoder.
    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    /// Release the underlying bit stream.
    pub fn into_inner(self) -> R {
        self.bitstream
    }

    fn decode_bit(&mut self, mut current: u64) -> Result<(u32, u64)> {
        let xmid = split(self.low, self.high, self.predictor.get());
        let bit = if current <= xmid {
            self.high = xmid;
            1
        } else {
            self.low = xmid + 1;
            0
        };
        self.predictor.update(bit);

        while (self.low ^ self.high) & TOP_BYTE == 0 {
            self.low = (self.low << 8) & WINDOW;
            self.high = ((self.high << 8) | 255) & WINDOW;
            current = ((current << 8) | self.bitstream.read_bits(8)?) & WINDOW;
        }
        Ok((bit, current))
    }
}

impl<R: InputBitStream> EntropyDecoder for PaqDecoder<R> {
    fn decode_byte(&mut self) -> Result<u8> {
        let mut current = match self.current {
            Some(current) => current,
            None => self.bitstream.read_bits(32)?,
        };

        let mut symbol = 0u32;
        for _ in 0..8 {
            let (bit, next) = self.decode_bit(current)?;
            current = next;
            symbol = (symbol << 1) | bit;
        }

        self.current = Some(current);
        Ok(symbol as u8)
    }

    fn bit_stream(&mut self) -> &mut dyn InputBitStream {
        &mut self.bitstream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::{DefaultInputBitStream, DefaultOutputBitStream};
    use proptest::prelude::*;

    fn encode(data: &[u8]) -> Vec<u8> {
        let mut obs = DefaultOutputBitStream::new(Vec::new());
        {
            let mut encoder = PaqEncoder::new(&mut obs);
            assert_eq!(encoder.encode(data).unwrap(), data.len());
            encoder.dispose().unwrap();
        }
        obs.close().unwrap();
        obs.into_inner()
    }

    fn decode(bytes: &[u8], len: usize) -> Result<Vec<u8>> {
        let mut decoder = PaqDecoder::new(DefaultInputBitStream::new(bytes));
        let mut out = vec![0u8; len];
        decoder.decode(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_split_stays_inside_interval() {
        for pred in [1u32, 2048, 4095] {
            for (low, high) in [(0u64, WINDOW), (0x00FF_FFFF, 0x0100_0000), (10, 11)] {
                let xmid = split(low, high, pred);
                assert!(low <= xmid && xmid < high, "{low:#x} {xmid:#x} {high:#x}");
            }
        }
    }

    #[test]
    fn test_text_roundtrip_compresses() {
        let data: Vec<u8> = b"It was the best of times, it was the worst of times, "
            .iter()
            .copied()
            .cycle()
            .take(8000)
            .collect();
        let bytes = encode(&data);
        assert!(bytes.len() < data.len() / 2, "compressed to {} bytes", bytes.len());
        assert_eq!(decode(&bytes, data.len()).unwrap(), data);
    }

    #[test]
    fn test_edge_inputs() {
        for data in [vec![], vec![0u8; 4000], vec![0xFF; 4000], vec![0x80u8]] {
            let bytes = encode(&data);
            assert_eq!(decode(&bytes, data.len()).unwrap(), data);
        }
    }

    #[test]
    fn test_models_stay_in_lockstep() {
        let data: Vec<u8> = (0..3000u32).map(|i| (i % 251 ^ i / 7) as u8).collect();
        let mut obs = DefaultOutputBitStream::new(Vec::new());
        let mut encoder = PaqEncoder::new(&mut obs);
        encoder.encode(&data).unwrap();
        encoder.dispose().unwrap();
        let encoder_model = encoder.predictor().clone();
        drop(encoder);
        obs.close().unwrap();
        let bytes = obs.into_inner();

        let mut decoder = PaqDecoder::new(DefaultInputBitStream::new(&bytes[..]));
        let mut out = vec![0u8; data.len()];
        decoder.decode(&mut out).unwrap();
        assert_eq!(out, data);
        assert_eq!(decoder.predictor(), &encoder_model);
    }

    #[test]
    fn test_flush_is_four_bytes_and_idempotent() {
        let mut obs = DefaultOutputBitStream::new(Vec::new());
        let mut encoder = PaqEncoder::new(&mut obs);
        assert!(encoder.encode_byte(b'x'));
        let before = encoder.bit_stream().written();
        encoder.dispose().unwrap();
        encoder.dispose().unwrap();
        assert_eq!(encoder.bit_stream().written(), before + 32);
    }

    #[test]
    fn test_empty_stream_reports_end_of_stream() {
        let mut decoder = PaqDecoder::new(DefaultInputBitStream::new(std::io::empty()));
        assert!(matches!(decoder.decode_byte(), Err(Error::EndOfStream)));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_roundtrip(data in prop::collection::vec(any::<u8>(), 0..2048)) {
            let bytes = encode(&data);
            prop_assert_eq!(decode(&bytes, data.len()).unwrap(), data);
        }
    }
}
