//! Adaptive order-0 range coder.
//!
//! A carryless range coder (Subbotin style) over a 56-bit window. Symbol
//! probabilities come from a [`FrequencyTable`] that starts flat and gains one
//! count per coded symbol; it is never rescaled.
//!
//! # Interval arithmetic
//!
//! Encoding `v` narrows `[low, low + range)` to the slice
//! `[cum(v), cum(v + 1))` of `total`. Whenever the top byte of `low` and
//! `low + range` agree it is final and gets shifted out. When they disagree but
//! the range has shrunk below 2^40, the range is cut back to end at the next
//! byte boundary so that byte can be shifted out anyway. No carry ever
//! propagates into bytes already written.
//!
//! The alphabet has 257 slots: the 256 byte values plus a sentinel that no
//! encoder ever emits. Decoding the sentinel means the input was not produced
//! by this encoder, or has run past its end.

use tracing::{debug, trace};

use crate::bitstream::{InputBitStream, OutputBitStream};
use crate::codec::{encode_bytes, EntropyDecoder, EntropyEncoder};
use crate::error::{Error, Result};

const TOP: u64 = 1 << 48;
const MAX_RANGE: u64 = 1 << 40;
const BOTTOM: u64 = MAX_RANGE - 1;
const MASK: u64 = 0x00FF_FFFF_FFFF_FFFF;
const INITIAL_RANGE: u64 = (TOP << 8) - 1;
const WINDOW_BITS: u32 = 56;
const SHIFT: u32 = WINDOW_BITS - 8;

/// Largest frequency total the coders can split without rounding a symbol's
/// slice down to zero.
pub const MAX_TOTAL: u64 = MAX_RANGE - 1;

/// Symbol slots: 256 byte values and the sentinel.
const NB_SYMBOLS: usize = 257;
const SENTINEL: usize = 256;
const BASE_LEN: usize = (NB_SYMBOLS >> 4) + 1;

/// Adaptive cumulative frequencies, split into per-16-symbol bases and
/// offsets within each group of 16.
///
/// `cumulative(v) = base[v >> 4] + delta[v]`. Every symbol starts with a
/// count of one.
///
/// Counts are never halved, so the coders stop once [`total`](Self::total)
/// reaches [`MAX_TOTAL`]: the encoder refuses the symbol and the decoder
/// returns `InvalidStream`. That takes about 2^40 symbols on one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrequencyTable {
    base: [u64; BASE_LEN],
    delta: [u64; NB_SYMBOLS + 1],
}

impl FrequencyTable {
    /// Flat table: `cumulative(v) = v`.
    pub fn new() -> Self {
        let mut base = [0u64; BASE_LEN];
        let mut delta = [0u64; NB_SYMBOLS + 1];
        for (i, b) in base.iter_mut().enumerate() {
            *b = (i as u64) << 4;
        }
        for (i, d) in delta.iter_mut().enumerate() {
            *d = (i & 15) as u64;
        }
        Self { base, delta }
    }

    /// Total count of all symbols strictly below `value` (`value <= 257`).
    #[inline]
    pub fn cumulative(&self, value: usize) -> u64 {
        self.base[value >> 4] + self.delta[value]
    }

    /// Total count over the whole alphabet.
    #[inline]
    pub fn total(&self) -> u64 {
        self.cumulative(NB_SYMBOLS)
    }

    /// Add one count to `symbol`.
    #[inline]
    fn update(&mut self, symbol: usize) {
        let value = symbol + 1;
        let start = (value + 15) >> 4;

        for b in &mut self.base[start..] {
            *b += 1;
        }
        for d in &mut self.delta[value..start << 4] {
            *d += 1;
        }
    }

    /// Symbol whose slice `[cumulative(v), cumulative(v + 1))` holds `count`.
    /// Requires `count < total()`.
    fn find(&self, count: u64) -> usize {
        let mut group = BASE_LEN - 1;
        while group > 0 && count < self.base[group] {
            group -= 1;
        }

        let rest = count - self.base[group];
        let first = group << 4;
        let mut value = (first + 15).min(NB_SYMBOLS);
        while value > first && rest < self.delta[value] {
            value -= 1;
        }
        value
    }
}

impl Default for FrequencyTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Adaptive range encoder.
#[derive(Debug)]
pub struct RangeEncoder<W: OutputBitStream> {
    bitstream: W,
    freq: FrequencyTable,
    low: u64,
    range: u64,
    symbols: u64,
    disposed: bool,
}

impl<W: OutputBitStream> RangeEncoder<W> {
    /// Create an encoder with a flat frequency table.
    pub fn new(bitstream: W) -> Self {
        Self {
            bitstream,
            freq: FrequencyTable::new(),
            low: 0,
            range: INITIAL_RANGE,
            symbols: 0,
            disposed: false,
        }
    }

    /// The live frequency table.
    pub fn frequencies(&self) -> &FrequencyTable {
        &self.freq
    }

    /// Borrow the underlying bit stream.
    pub fn get_ref(&self) -> &W {
        &self.bitstream
    }

    /// Release the underlying bit stream.
    pub fn into_inner(self) -> W {
        self.bitstream
    }
}

impl<W: OutputBitStream> EntropyEncoder for RangeEncoder<W> {
    fn encode_byte(&mut self, symbol: u8) -> bool {
        let total = self.freq.total();
        if total > MAX_TOTAL {
            return false;
        }
        let value = symbol as usize;
        let sym_low = self.freq.cumulative(value);
        let sym_high = self.freq.cumulative(value + 1);

        self.range /= total;
        self.low = self.low.wrapping_add(sym_low * self.range);
        self.range *= sym_high - sym_low;

        let mut ok = true;
        loop {
            let check = (self.low ^ self.low.wrapping_add(self.range)) & MASK;
            if check >= TOP && self.range >= MAX_RANGE {
                break;
            }
            if check >= TOP {
                self.range = self.low.wrapping_neg() & BOTTOM;
            }
            ok &= self.bitstream.write_bits((self.low >> SHIFT) & 0xFF, 8) == 8;
            self.range <<= 8;
            self.low <<= 8;
        }

        self.freq.update(value);
        self.symbols += 1;
        ok
    }

    fn encode(&mut self, block: &[u8]) -> Result<usize> {
        trace!(len = block.len(), total = self.freq.total(), "range block");
        Ok(encode_bytes(self, block))
    }

    /// Write the remaining 7 bytes of `low`. Only the first call writes.
    fn dispose(&mut self) -> Result<()> {
        if self.disposed || self.symbols == 0 {
            return Ok(());
        }
        self.disposed = true;

        for _ in 0..WINDOW_BITS / 8 {
            if self.bitstream.write_bits((self.low >> SHIFT) & 0xFF, 8) != 8 {
                return Err(Error::StreamClosed);
            }
            self.low <<= 8;
        }
        debug!(symbols = self.symbols, bytes = WINDOW_BITS / 8, "range coder flushed");
        self.bitstream.flush()
    }

    fn bit_stream(&mut self) -> &mut dyn OutputBitStream {
        &mut self.bitstream
    }
}

/// Adaptive range decoder.
#[derive(Debug)]
pub struct RangeDecoder<R: InputBitStream> {
    bitstream: R,
    freq: FrequencyTable,
    low: u64,
    range: u64,
    code: u64,
    started: bool,
}

impl<R: InputBitStream> RangeDecoder<R> {
    /// Create a decoder with a flat frequency table. Nothing is read until
    /// the first symbol is decoded.
    pub fn new(bitstream: R) -> Self {
        Self {
            bitstream,
            freq: FrequencyTable::new(),
            low: 0,
            range: INITIAL_RANGE,
            code: 0,
            started: false,
        }
    }

    /// The live frequency table.
    pub fn frequencies(&self) -> &FrequencyTable {
        &self.freq
    }

    /// Release the underlying bit stream.
    pub fn into_inner(self) -> R {
        self.bitstream
    }
}

impl<R: InputBitStream> EntropyDecoder for RangeDecoder<R> {
    fn decode_byte(&mut self) -> Result<u8> {
        if !self.started {
            self.code = self.bitstream.read_bits(WINDOW_BITS)?;
            self.started = true;
        }

        let total = self.freq.total();
        if total > MAX_TOTAL {
            return Err(Error::InvalidStream(format!(
                "range frequency total {total} past {MAX_TOTAL}"
            )));
        }
        self.range /= total;
        let count = (self.code.wrapping_sub(self.low) & MASK) / self.range;
        if count >= total {
            return Err(Error::InvalidStream(format!(
                "range count {count} outside total {total}"
            )));
        }

        let value = self.freq.find(count);
        if value == SENTINEL {
            if self.bitstream.has_more_to_read() {
                return Err(Error::InvalidStream(
                    "decoded the reserved range symbol".to_string(),
                ));
            }
            // Surfaces a read error or a closed stream before reporting the end.
            self.bitstream.read_bit()?;
            return Err(Error::EndOfStream);
        }

        let sym_low = self.freq.cumulative(value);
        let sym_high = self.freq.cumulative(value + 1);
        self.low = self.low.wrapping_add(sym_low * self.range);
        self.range *= sym_high - sym_low;

        loop {
            let check = (self.low ^ self.low.wrapping_add(self.range)) & MASK;
            if check >= TOP && self.range >= MAX_RANGE {
                break;
            }
            if check >= TOP {
                self.range = self.low.wrapping_neg() & BOTTOM;
            }
            self.code = (self.code << 8) | self.bitstream.read_bits(8)?;
            self.range <<= 8;
            self.low <<= 8;
        }

        self.freq.update(value);
        Ok(value as u8)
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
            let mut encoder = RangeEncoder::new(&mut obs);
            assert_eq!(encoder.encode(data).unwrap(), data.len());
            encoder.dispose().unwrap();
        }
        obs.close().unwrap();
        obs.into_inner()
    }

    fn decode(bytes: &[u8], len: usize) -> Result<Vec<u8>> {
        let mut decoder = RangeDecoder::new(DefaultInputBitStream::new(bytes));
        let mut out = vec![0u8; len];
        decoder.decode(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_flat_table() {
        let table = FrequencyTable::new();
        for v in 0..=NB_SYMBOLS {
            assert_eq!(table.cumulative(v), v as u64);
        }
        assert_eq!(table.total(), 257);
    }

    #[test]
    fn test_update_adds_one_count() {
        let mut table = FrequencyTable::new();
        for symbol in [0usize, 15, 16, 17, 200, 255] {
            let before: Vec<u64> = (0..=NB_SYMBOLS).map(|v| table.cumulative(v)).collect();
            table.update(symbol);
            for v in 0..=NB_SYMBOLS {
                let expected = before[v] + u64::from(v > symbol);
                assert_eq!(table.cumulative(v), expected, "symbol {symbol}, v {v}");
            }
        }
    }

    #[test]
    fn test_find_inverts_cumulative() {
        let mut table = FrequencyTable::new();
        for s in [3usize, 3, 3, 40, 255, 255, 128] {
            table.update(s);
        }
        for count in 0..table.total() {
            let v = table.find(count);
            assert!(table.cumulative(v) <= count && count < table.cumulative(v + 1));
        }
    }

    #[test]
    fn test_cumulative_stays_strictly_increasing() {
        let data: Vec<u8> = (0..5000u32).map(|i| (i * 31 % 97) as u8).collect();
        let mut obs = DefaultOutputBitStream::new(Vec::new());
        let mut encoder = RangeEncoder::new(&mut obs);
        encoder.encode(&data).unwrap();

        let table = encoder.frequencies();
        for v in 0..NB_SYMBOLS {
            assert!(table.cumulative(v + 1) > table.cumulative(v), "v {v}");
        }
        assert_eq!(table.total(), 257 + data.len() as u64);
    }

    #[test]
    fn test_adapts_to_skewed_input() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i & 63) as u8).collect();
        let bytes = encode(&data);
        assert!(bytes.len() < data.len(), "compressed to {} bytes", bytes.len());
        assert_eq!(decode(&bytes, data.len()).unwrap(), data);
    }

    #[test]
    fn test_edge_inputs() {
        for data in [vec![], vec![0u8; 3000], vec![0xFF; 3000], vec![7u8]] {
            let bytes = encode(&data);
            assert_eq!(decode(&bytes, data.len()).unwrap(), data);
        }
    }

    #[test]
    fn test_empty_encoder_writes_nothing() {
        let mut obs = DefaultOutputBitStream::new(Vec::new());
        let mut encoder = RangeEncoder::new(&mut obs);
        encoder.dispose().unwrap();
        encoder.dispose().unwrap();
        drop(encoder);
        assert_eq!(obs.written(), 0);
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut obs = DefaultOutputBitStream::new(Vec::new());
        let mut encoder = RangeEncoder::new(&mut obs);
        assert!(encoder.encode_byte(1));
        encoder.dispose().unwrap();
        let after_first = encoder.bit_stream().written();
        encoder.dispose().unwrap();
        assert_eq!(encoder.bit_stream().written(), after_first);
    }

    #[test]
    fn test_empty_stream_reports_end_of_stream() {
        let mut decoder = RangeDecoder::new(DefaultInputBitStream::new(std::io::empty()));
        assert!(matches!(decoder.decode_byte(), Err(Error::EndOfStream)));
    }

    #[test]
    fn test_sentinel_at_end_is_end_of_stream() {
        // code = 256 * (range / 257) selects the sentinel slot
        let bytes = [0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0x00];
        let mut decoder = RangeDecoder::new(DefaultInputBitStream::new(&bytes[..]));
        assert!(matches!(decoder.decode_byte(), Err(Error::EndOfStream)));
    }

    #[test]
    fn test_sentinel_mid_stream_is_invalid() {
        let bytes = [0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0x00, 0x12];
        let mut decoder = RangeDecoder::new(DefaultInputBitStream::new(&bytes[..]));
        assert!(matches!(decoder.decode_byte(), Err(Error::InvalidStream(_))));
    }

    struct FailingSource;

    impl std::io::Read for FailingSource {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::ConnectionReset.into())
        }
    }

    #[test]
    fn test_sentinel_before_read_error_reports_the_error() {
        let bytes = [0xFF, 0x00, 0xFF, 0x00, 0xFF, 0x00, 0x00];
        let source = std::io::Read::chain(&bytes[..], FailingSource);
        let ibs = DefaultInputBitStream::with_capacity(source, 7).unwrap();
        let mut decoder = RangeDecoder::new(ibs);
        assert!(matches!(
            decoder.decode_byte(),
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionReset
        ));
    }

    #[test]
    fn test_saturated_table_is_refused() {
        let mut obs = DefaultOutputBitStream::new(Vec::new());
        let mut encoder = RangeEncoder::new(&mut obs);
        encoder.freq.base[BASE_LEN - 1] = MAX_TOTAL;
        assert!(encoder.freq.total() > MAX_TOTAL);
        assert!(!encoder.encode_byte(0));
        assert_eq!(encoder.symbols, 0);

        let bytes = [0u8; 8];
        let mut decoder = RangeDecoder::new(DefaultInputBitStream::new(&bytes[..]));
        decoder.freq.base[BASE_LEN - 1] = MAX_TOTAL;
        assert!(matches!(decoder.decode_byte(), Err(Error::InvalidStream(_))));
    }

    #[test]
    fn test_count_past_total_is_invalid() {
        let bytes = [0xFF; 7];
        let mut decoder = RangeDecoder::new(DefaultInputBitStream::new(&bytes[..]));
        assert!(matches!(decoder.decode_byte(), Err(Error::InvalidStream(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_roundtrip(data in prop::collection::vec(any::<u8>(), 0..4096)) {
            let bytes = encode(&data);
            prop_assert_eq!(decode(&bytes, data.len()).unwrap(), data);
        }
    }
}
