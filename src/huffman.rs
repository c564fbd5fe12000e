//! Canonical Huffman coding.
//!
//! A block is coded in two parts: a header carrying one code length per byte
//! value, then the symbols. Codes are never transmitted; both sides derive them
//! canonically from the lengths, so the header is just
//!
//! ```text
//! size[0]:5  delta(size[1] - size[0])  ...  delta(size[255] - size[254])
//! ```
//!
//! with every delta a signed Exp-Golomb code. Unchanged lengths cost one bit.
//!
//! # Tree construction
//!
//! Leaves are sorted by ascending frequency and merged with the classic
//! two-queue method: one FIFO of leaves, one FIFO of merged nodes, always
//! taking the two lightest fronts (the leaf queue wins ties). The result is
//! reproducible bit for bit. Trees deeper than [`MAX_CODE_LENGTH`] are
//! flattened by halving the frequencies and merging again.
//!
//! # Decoding
//!
//! The decoder rebuilds a tree (an arena of nodes addressed by index) from the
//! `(length, code)` pairs, then precomputes, for every 10-bit window, the chain
//! of nodes those bits reach. While enough symbols remain in a block, decoding
//! jumps through that cache instead of walking the tree bit by bit.
//!
//! # Historical Context
//!
//! David Huffman (1952) developed this algorithm as a term paper at MIT.
//! Canonical codes (Schwartz and Kallick, 1964) made it practical to ship a
//! code as nothing more than its length table, which is how DEFLATE and most
//! of its descendants transmit Huffman trees today.

use std::cmp::Reverse;
use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, trace};

use crate::bitstream::{InputBitStream, OutputBitStream};
use crate::codec::{decode_bytes, encode_bytes, EntropyDecoder, EntropyEncoder};
use crate::error::{Error, Result};
use crate::expgolomb::{ExpGolombDecoder, ExpGolombEncoder};

/// Longest code length the 5-bit header field can carry.
pub const MAX_CODE_LENGTH: u32 = 31;

/// Bits consumed per lookup in the decode cache.
pub const DECODING_BATCH_SIZE: u32 = 10;

const ALPHABET: usize = 256;
const CACHE_HEADS: usize = 1 << DECODING_BATCH_SIZE;

/// Per-symbol code lengths and the canonical codes derived from them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTable {
    sizes: [u8; ALPHABET],
    codes: [u32; ALPHABET],
}

impl CodeTable {
    /// Flat table: every symbol gets an 8-bit code equal to its value.
    pub fn uniform() -> Self {
        let mut codes = [0u32; ALPHABET];
        for (s, code) in codes.iter_mut().enumerate() {
            *code = s as u32;
        }
        Self {
            sizes: [8; ALPHABET],
            codes,
        }
    }

    /// Build the minimum-redundancy code for a 256-entry frequency table.
    ///
    /// Symbols with zero frequency get no code. A lone present symbol gets a
    /// 1-bit code.
    pub fn from_frequencies(frequencies: &[u32]) -> Result<Self> {
        if frequencies.len() != ALPHABET {
            return Err(Error::InvalidArgument(format!(
                "expected {ALPHABET} frequencies, got {}",
                frequencies.len()
            )));
        }

        let mut weights: Vec<u64> = frequencies.iter().map(|&f| u64::from(f)).collect();
        loop {
            let sizes = merge_lengths(&weights);
            let max_length = sizes.iter().copied().max().unwrap_or(0);
            if u32::from(max_length) <= MAX_CODE_LENGTH {
                return Ok(Self::with_sizes(sizes));
            }

            debug!(max_length, "huffman tree too deep, halving frequencies");
            for w in weights.iter_mut().filter(|w| **w > 0) {
                *w = (*w + 1) / 2;
            }
        }
    }

    /// Rebuild a table from code lengths alone.
    ///
    /// # Errors
    /// `InvalidStream` if a length exceeds [`MAX_CODE_LENGTH`].
    pub fn from_lengths(sizes: &[u8; ALPHABET]) -> Result<Self> {
        if let Some(s) = sizes.iter().position(|&n| u32::from(n) > MAX_CODE_LENGTH) {
            return Err(Error::InvalidStream(format!(
                "code length {} for symbol {s} exceeds {MAX_CODE_LENGTH}",
                sizes[s]
            )));
        }
        Ok(Self::with_sizes(*sizes))
    }

    fn with_sizes(sizes: [u8; ALPHABET]) -> Self {
        let mut symbols: Vec<usize> = (0..ALPHABET).filter(|&s| sizes[s] > 0).collect();
        symbols.sort_by_key(|&s| (Reverse(sizes[s]), s));

        let mut codes = [0u32; ALPHABET];
        let mut code = 0u32;
        let mut len = symbols.first().map_or(0, |&s| sizes[s]);
        for s in symbols {
            while len > sizes[s] {
                code >>= 1;
                len -= 1;
            }
            codes[s] = code;
            code += 1;
        }

        Self { sizes, codes }
    }

    /// Code length of `symbol` in bits (0 when the symbol has no code).
    pub fn size(&self, symbol: u8) -> u32 {
        u32::from(self.sizes[symbol as usize])
    }

    /// Canonical code of `symbol`, right-aligned.
    pub fn code(&self, symbol: u8) -> u32 {
        self.codes[symbol as usize]
    }

    /// All code lengths, indexed by symbol.
    pub fn sizes(&self) -> &[u8; ALPHABET] {
        &self.sizes
    }

    /// Number of symbols that have a code.
    pub fn present_symbols(&self) -> usize {
        self.sizes.iter().filter(|&&n| n > 0).count()
    }

    /// Longest code length in the table.
    pub fn max_length(&self) -> u32 {
        u32::from(self.sizes.iter().copied().max().unwrap_or(0))
    }
}

impl Default for CodeTable {
    fn default() -> Self {
        Self::uniform()
    }
}

/// Node of the merge tree used to derive code lengths.
#[derive(Debug)]
enum MergeNode {
    Leaf {
        symbol: usize,
        weight: u64,
    },
    Internal {
        left: Box<MergeNode>,
        right: Box<MergeNode>,
        weight: u64,
    },
}

impl MergeNode {
    fn weight(&self) -> u64 {
        match self {
            MergeNode::Leaf { weight, .. } => *weight,
            MergeNode::Internal { weight, .. } => *weight,
        }
    }

    fn assign_depths(&self, depth: u8, sizes: &mut [u8; ALPHABET]) {
        match self {
            MergeNode::Leaf { symbol, .. } => sizes[*symbol] = depth,
            MergeNode::Internal { left, right, .. } => {
                left.assign_depths(depth.saturating_add(1), sizes);
                right.assign_depths(depth.saturating_add(1), sizes);
            }
        }
    }
}

fn pop_lightest(leaves: &mut VecDeque<MergeNode>, merged: &mut VecDeque<MergeNode>) -> Option<MergeNode> {
    match (leaves.front(), merged.front()) {
        (Some(leaf), Some(node)) if leaf.weight() <= node.weight() => leaves.pop_front(),
        (Some(_), Some(_)) => merged.pop_front(),
        (Some(_), None) => leaves.pop_front(),
        (None, _) => merged.pop_front(),
    }
}

/// Code lengths from the two-queue merge of the non-zero weights.
fn merge_lengths(weights: &[u64]) -> [u8; ALPHABET] {
    let mut present: Vec<(u64, usize)> = weights
        .iter()
        .enumerate()
        .filter(|(_, &w)| w > 0)
        .map(|(s, &w)| (w, s))
        .collect();
    present.sort_unstable();

    let mut leaves: VecDeque<MergeNode> = present
        .into_iter()
        .map(|(weight, symbol)| MergeNode::Leaf { symbol, weight })
        .collect();
    let mut merged: VecDeque<MergeNode> = VecDeque::with_capacity(leaves.len());

    while leaves.len() + merged.len() > 1 {
        let (Some(left), Some(right)) = (
            pop_lightest(&mut leaves, &mut merged),
            pop_lightest(&mut leaves, &mut merged),
        ) else {
            break;
        };
        let weight = left.weight() + right.weight();
        merged.push_back(MergeNode::Internal {
            left: Box::new(left),
            right: Box::new(right),
            weight,
        });
    }

    let mut sizes = [0u8; ALPHABET];
    match pop_lightest(&mut leaves, &mut merged) {
        // A lone leaf hangs under a synthesized root.
        Some(MergeNode::Leaf { symbol, .. }) => sizes[symbol] = 1,
        Some(root) => root.assign_depths(0, &mut sizes),
        None => {}
    }
    sizes
}

/// Canonical Huffman encoder.
#[derive(Debug)]
pub struct HuffmanEncoder<W: OutputBitStream> {
    bitstream: W,
    table: CodeTable,
}

impl<W: OutputBitStream> HuffmanEncoder<W> {
    /// Create an encoder with the flat 8-bit code.
    pub fn new(bitstream: W) -> Self {
        Self {
            bitstream,
            table: CodeTable::uniform(),
        }
    }

    /// Rebuild the code from `frequencies` and write the length header.
    ///
    /// Returns `Ok(false)` if the bit stream refused part of the header.
    ///
    /// # Errors
    /// `InvalidArgument` unless `frequencies` has 256 entries.
    pub fn update_frequencies(&mut self, frequencies: &[u32]) -> Result<bool> {
        self.table = CodeTable::from_frequencies(frequencies)?;
        let start = self.bitstream.written();
        let sizes = self.table.sizes;

        let mut ok = self.bitstream.write_bits(u64::from(sizes[0]), 5) == 5;
        let mut egenc = ExpGolombEncoder::new(&mut self.bitstream, true);
        for pair in sizes.windows(2) {
            let delta = pair[1] as i8 - pair[0] as i8;
            ok &= egenc.encode_byte(delta as u8);
        }

        debug!(
            present = self.table.present_symbols(),
            max_length = self.table.max_length(),
            header_bits = self.bitstream.written() - start,
            "huffman header written"
        );
        Ok(ok)
    }

    /// The code currently in use.
    pub fn code_table(&self) -> &CodeTable {
        &self.table
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

impl<W: OutputBitStream> EntropyEncoder for HuffmanEncoder<W> {
    fn encode_byte(&mut self, symbol: u8) -> bool {
        let size = self.table.size(symbol);
        if size == 0 {
            return false;
        }
        self.bitstream
            .write_bits(u64::from(self.table.code(symbol)), size)
            == size
    }

    fn encode(&mut self, block: &[u8]) -> Result<usize> {
        if block.is_empty() {
            return Ok(0);
        }

        let mut frequencies = [0u32; ALPHABET];
        for &b in block {
            frequencies[b as usize] += 1;
        }
        trace!(len = block.len(), "huffman block");

        if !self.update_frequencies(&frequencies)? {
            return Ok(0);
        }
        Ok(encode_bytes(self, block))
    }

    fn bit_stream(&mut self) -> &mut dyn OutputBitStream {
        &mut self.bitstream
    }
}

/// Decode tree node; children are arena indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Node {
    Leaf(u8),
    Internal([Option<u32>; 2]),
}

const ROOT: u32 = 0;

/// Decoding tree stored as an arena; `nodes[ROOT]` is the root.
#[derive(Debug, Clone)]
struct DecodeTree {
    nodes: Vec<Node>,
}

impl DecodeTree {
    /// Complete depth-8 tree matching [`CodeTable::uniform`].
    fn complete() -> Self {
        let internal = (ALPHABET - 1) as u32;
        let mut nodes = Vec::with_capacity(2 * ALPHABET - 1);
        for i in 0..internal {
            nodes.push(Node::Internal([Some(2 * i + 1), Some(2 * i + 2)]));
        }
        for s in 0..ALPHABET {
            nodes.push(Node::Leaf(s as u8));
        }
        Self { nodes }
    }

    fn from_table(table: &CodeTable) -> Result<Self> {
        let mut nodes = vec![Node::Internal([None, None])];
        let mut pending: BTreeMap<(u32, u32), u32> = BTreeMap::new();

        for s in 0..=u8::MAX {
            let len = table.size(s);
            if len == 0 {
                continue;
            }
            let code = table.code(s);
            if u64::from(code) >= 1u64 << len {
                return Err(Error::InvalidStream(format!(
                    "code space over-subscribed at length {len}"
                )));
            }
            let index = nodes.len() as u32;
            nodes.push(Node::Leaf(s));
            if pending.insert((len, code), index).is_some() {
                return Err(Error::InvalidStream(format!(
                    "duplicate code {code:#b} of length {len}"
                )));
            }
        }

        // Longest codes first, so every parent is still pending when its
        // children are attached.
        while let Some(((len, code), index)) = pending.pop_last() {
            let parent = if len == 1 {
                ROOT
            } else {
                *pending.entry((len - 1, code >> 1)).or_insert_with(|| {
                    nodes.push(Node::Internal([None, None]));
                    (nodes.len() - 1) as u32
                })
            };

            match &mut nodes[parent as usize] {
                Node::Leaf(s) => {
                    return Err(Error::InvalidStream(format!(
                        "code of symbol {s} is a prefix of another code"
                    )));
                }
                Node::Internal(children) => {
                    let slot = &mut children[(code & 1) as usize];
                    if slot.is_some() {
                        return Err(Error::InvalidStream(format!(
                            "two codes share position {code:#b} at length {len}"
                        )));
                    }
                    *slot = Some(index);
                }
            }
        }

        Ok(Self { nodes })
    }

    #[inline]
    fn node(&self, index: u32) -> Node {
        self.nodes[index as usize]
    }

    #[inline]
    fn child(&self, index: u32, bit: u32) -> Option<u32> {
        match self.node(index) {
            Node::Internal(children) => children[(bit & 1) as usize],
            Node::Leaf(_) => None,
        }
    }
}

const INVALID_NODE: u32 = u32::MAX;

/// One step of a cached 10-bit window: the node reached and the next entry
/// of the chain (0 ends the chain).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CacheEntry {
    node: u32,
    next: u32,
}

/// Canonical Huffman decoder.
#[derive(Debug)]
pub struct HuffmanDecoder<R: InputBitStream> {
    bitstream: R,
    table: CodeTable,
    tree: DecodeTree,
    heads: Vec<u32>,
    cache: Vec<CacheEntry>,
    current: u32,
}

impl<R: InputBitStream> HuffmanDecoder<R> {
    /// Create a decoder with the flat 8-bit code.
    pub fn new(bitstream: R) -> Self {
        let mut decoder = Self {
            bitstream,
            table: CodeTable::uniform(),
            tree: DecodeTree::complete(),
            heads: vec![0; CACHE_HEADS],
            cache: Vec::new(),
            current: 0,
        };
        decoder.build_cache();
        decoder
    }

    /// Read a length header and rebuild the tree and cache.
    ///
    /// # Errors
    /// `InvalidStream` if the lengths do not describe a prefix code,
    /// `EndOfStream` if the header is truncated.
    pub fn read_lengths(&mut self) -> Result<()> {
        let start = self.bitstream.read();
        let mut sizes = [0u8; ALPHABET];
        let mut prev = self.bitstream.read_bits(5)? as i32;
        sizes[0] = prev as u8;

        let mut egdec = ExpGolombDecoder::new(&mut self.bitstream, true);
        for (s, size) in sizes.iter_mut().enumerate().skip(1) {
            let len = prev + i32::from(egdec.decode_byte()? as i8);
            if !(0..=MAX_CODE_LENGTH as i32).contains(&len) {
                return Err(Error::InvalidStream(format!(
                    "invalid code length {len} for symbol {s}"
                )));
            }
            *size = len as u8;
            prev = len;
        }

        let table = CodeTable::from_lengths(&sizes)?;
        self.tree = DecodeTree::from_table(&table)?;
        self.table = table;
        self.build_cache();

        debug!(
            present = self.table.present_symbols(),
            max_length = self.table.max_length(),
            header_bits = self.bitstream.read() - start,
            "huffman header read"
        );
        Ok(())
    }

    /// The code currently in use.
    pub fn code_table(&self) -> &CodeTable {
        &self.table
    }

    /// Release the underlying bit stream.
    pub fn into_inner(self) -> R {
        self.bitstream
    }

    fn build_cache(&mut self) {
        self.cache.clear();
        self.cache.push(CacheEntry { node: ROOT, next: 0 });
        self.current = 0;

        for value in 0..CACHE_HEADS as u32 {
            let first = self.cache.len();
            self.heads[value as usize] = first as u32;
            let mut node = ROOT;

            for shift in (0..DECODING_BATCH_SIZE).rev() {
                match self.tree.child(node, value >> shift) {
                    Some(child) => {
                        if let Node::Leaf(_) = self.tree.node(child) {
                            self.push_entry(child);
                            node = ROOT;
                        } else {
                            node = child;
                        }
                    }
                    None => {
                        self.push_entry(INVALID_NODE);
                        node = ROOT;
                        break;
                    }
                }
            }

            if node != ROOT {
                self.push_entry(node);
            }
            if let Some(last) = self.cache.last_mut() {
                last.next = 0;
            }
        }
    }

    fn push_entry(&mut self, node: u32) {
        let next = self.cache.len() as u32 + 1;
        self.cache.push(CacheEntry { node, next });
    }

    /// Walk from `node` down to a leaf, one input bit per level.
    fn descend(&mut self, mut node: u32) -> Result<u8> {
        if node == INVALID_NODE {
            return Err(Error::InvalidStream(
                "bits do not match any huffman code".to_string(),
            ));
        }
        loop {
            if let Node::Leaf(symbol) = self.tree.node(node) {
                return Ok(symbol);
            }
            let bit = self.bitstream.read_bit()?;
            node = self.tree.child(node, bit).ok_or_else(|| {
                Error::InvalidStream("bits do not match any huffman code".to_string())
            })?;
        }
    }

    /// Decode through the cache, reading a fresh 10-bit window when the
    /// current chain is exhausted. The caller guarantees the window lies
    /// within the block.
    fn fast_decode(&mut self) -> Result<u8> {
        if self.current == 0 {
            let window = self.bitstream.read_bits(DECODING_BATCH_SIZE)?;
            self.current = self.heads[window as usize];
        }
        let entry = self.cache[self.current as usize];
        self.current = entry.next;
        self.descend(entry.node)
    }
}

impl<R: InputBitStream> EntropyDecoder for HuffmanDecoder<R> {
    fn decode_byte(&mut self) -> Result<u8> {
        let entry = self.cache[self.current as usize];
        if self.current != 0 {
            self.current = entry.next;
        }
        self.descend(entry.node)
    }

    fn decode(&mut self, block: &mut [u8]) -> Result<usize> {
        if block.is_empty() {
            return Ok(0);
        }

        self.read_lengths()?;
        trace!(len = block.len(), "huffman block");

        let batch = DECODING_BATCH_SIZE as usize;
        let mut i = 0;
        if block.len() > batch {
            let end = block.len() - batch;
            while i < end {
                block[i] = self.fast_decode()?;
                i += 1;
            }
        }

        decode_bytes(self, &mut block[i..])?;
        Ok(block.len())
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

    fn encode_blocks(blocks: &[&[u8]]) -> Vec<u8> {
        let mut obs = DefaultOutputBitStream::new(Vec::new());
        {
            let mut encoder = HuffmanEncoder::new(&mut obs);
            for block in blocks {
                assert_eq!(encoder.encode(block).unwrap(), block.len());
            }
            encoder.dispose().unwrap();
        }
        obs.close().unwrap();
        obs.into_inner()
    }

    fn decode_blocks(bytes: &[u8], lens: &[usize]) -> Result<Vec<Vec<u8>>> {
        let mut decoder = HuffmanDecoder::new(DefaultInputBitStream::new(bytes));
        lens.iter()
            .map(|&len| {
                let mut out = vec![0u8; len];
                decoder.decode(&mut out)?;
                Ok(out)
            })
            .collect()
    }

    fn frequencies_of(data: &[u8]) -> [u32; 256] {
        let mut freqs = [0u32; 256];
        for &b in data {
            freqs[b as usize] += 1;
        }
        freqs
    }

    #[test]
    fn test_huffman_roundtrip() {
        let data = b"abracadabra";
        let bytes = encode_blocks(&[data]);
        let decoded = decode_blocks(&bytes, &[data.len()]).unwrap();
        assert_eq!(decoded[0], data.to_vec());
    }

    #[test]
    fn test_signed_sequence_roundtrip() {
        let values: [i8; 16] = [0, 0, 32, 15, -4, 16, 0, 16, 0, 7, -1, -4, -32, 0, 31, -1];
        let data: Vec<u8> = values.iter().map(|&v| v as u8).collect();
        let bytes = encode_blocks(&[&data]);
        let decoded = decode_blocks(&bytes, &[data.len()]).unwrap();
        assert_eq!(decoded[0], data);
    }

    #[test]
    fn test_canonical_order() {
        let table = CodeTable::from_frequencies(&frequencies_of(b"mississippi river banks")).unwrap();
        let mut symbols: Vec<u8> = (0..=255).filter(|&s| table.size(s) > 0).collect();
        symbols.sort_by_key(|&s| (Reverse(table.size(s)), s));

        for pair in symbols.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if table.size(a) == table.size(b) {
                assert_eq!(table.code(b), table.code(a) + 1, "{a} then {b}");
            }
        }
        assert_eq!(CodeTable::from_lengths(table.sizes()).unwrap(), table);
    }

    #[test]
    fn test_dual_queue_lengths() {
        // weights a=1 b=1 c=2 d=4: a+b=2, then leaf c (2) wins the tie
        let mut freqs = [0u32; 256];
        freqs[b'a' as usize] = 1;
        freqs[b'b' as usize] = 1;
        freqs[b'c' as usize] = 2;
        freqs[b'd' as usize] = 4;
        let table = CodeTable::from_frequencies(&freqs).unwrap();
        assert_eq!(table.size(b'd'), 1);
        assert_eq!(table.size(b'c'), 2);
        assert_eq!(table.size(b'a'), 3);
        assert_eq!(table.size(b'b'), 3);
        assert_eq!(table.code(b'a'), 0b000);
        assert_eq!(table.code(b'b'), 0b001);
        assert_eq!(table.code(b'c'), 0b01);
        assert_eq!(table.code(b'd'), 0b1);
    }

    #[test]
    fn test_single_symbol_gets_one_bit() {
        let mut freqs = [0u32; 256];
        freqs[42] = 1000;
        let table = CodeTable::from_frequencies(&freqs).unwrap();
        assert_eq!(table.size(42), 1);
        assert_eq!(table.present_symbols(), 1);

        let data = vec![42u8; 1000];
        let bytes = encode_blocks(&[&data]);
        let decoded = decode_blocks(&bytes, &[data.len()]).unwrap();
        assert_eq!(decoded[0], data);
    }

    #[test]
    fn test_empty_block_writes_nothing() {
        let mut obs = DefaultOutputBitStream::new(Vec::new());
        let mut encoder = HuffmanEncoder::new(&mut obs);
        assert_eq!(encoder.encode(&[]).unwrap(), 0);
        drop(encoder);
        assert_eq!(obs.written(), 0);

        let mut decoder = HuffmanDecoder::new(DefaultInputBitStream::new(std::io::empty()));
        assert_eq!(decoder.decode(&mut []).unwrap(), 0);
    }

    #[test]
    fn test_default_trees_agree_without_header() {
        let mut obs = DefaultOutputBitStream::new(Vec::new());
        {
            let mut encoder = HuffmanEncoder::new(&mut obs);
            for b in [0u8, 1, 127, 128, 255] {
                assert!(encoder.encode_byte(b));
            }
        }
        assert_eq!(obs.written(), 40);
        obs.close().unwrap();
        let bytes = obs.into_inner();
        assert_eq!(&bytes[..5], &[0, 1, 127, 128, 255]);

        let mut decoder = HuffmanDecoder::new(DefaultInputBitStream::new(&bytes[..]));
        for b in [0u8, 1, 127, 128, 255] {
            assert_eq!(decoder.decode_byte().unwrap(), b);
        }
    }

    #[test]
    fn test_absent_symbol_is_refused() {
        let mut obs = DefaultOutputBitStream::new(Vec::new());
        let mut encoder = HuffmanEncoder::new(&mut obs);
        assert!(encoder.update_frequencies(&frequencies_of(b"aab")).unwrap());
        assert!(encoder.encode_byte(b'a'));
        assert!(!encoder.encode_byte(b'z'));
    }

    #[test]
    fn test_wrong_frequency_count_is_rejected() {
        let mut obs = DefaultOutputBitStream::new(Vec::new());
        let mut encoder = HuffmanEncoder::new(&mut obs);
        let err = encoder.update_frequencies(&[1; 255]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)), "{err:?}");
    }

    #[test]
    fn test_deep_tree_is_limited() {
        // Fibonacci weights produce a degenerate chain 39 levels deep.
        let mut freqs = [0u32; 256];
        let (mut a, mut b) = (1u32, 1u32);
        for f in freqs.iter_mut().take(40) {
            *f = a;
            (a, b) = (b, a + b);
        }
        let table = CodeTable::from_frequencies(&freqs).unwrap();
        assert!(table.max_length() <= MAX_CODE_LENGTH);
        assert_eq!(table.present_symbols(), 40);

        let mut obs = DefaultOutputBitStream::new(Vec::new());
        {
            let mut encoder = HuffmanEncoder::new(&mut obs);
            assert!(encoder.update_frequencies(&freqs).unwrap());
            for s in 0..40u8 {
                assert!(encoder.encode_byte(s));
            }
        }
        obs.close().unwrap();
        let bytes = obs.into_inner();

        let mut decoder = HuffmanDecoder::new(DefaultInputBitStream::new(&bytes[..]));
        decoder.read_lengths().unwrap();
        assert_eq!(decoder.code_table(), &table);
        for s in 0..40u8 {
            assert_eq!(decoder.decode_byte().unwrap(), s);
        }
    }

    #[test]
    fn test_oversubscribed_header_is_invalid() {
        // every symbol claims a 1-bit code
        let mut obs = DefaultOutputBitStream::new(Vec::new());
        obs.write_bits(1, 5);
        for _ in 1..256 {
            obs.write_bit(1);
        }
        obs.close().unwrap();
        let bytes = obs.into_inner();

        let mut decoder = HuffmanDecoder::new(DefaultInputBitStream::new(&bytes[..]));
        let err = decoder.read_lengths().unwrap_err();
        assert!(matches!(err, Error::InvalidStream(_)), "{err:?}");
    }

    #[test]
    fn test_length_overflow_in_header_is_invalid() {
        // 31 for symbol 0, then +1
        let mut obs = DefaultOutputBitStream::new(Vec::new());
        obs.write_bits(31, 5);
        obs.write_bits(0b0100, 4);
        obs.close().unwrap();
        let bytes = obs.into_inner();

        let mut decoder = HuffmanDecoder::new(DefaultInputBitStream::new(&bytes[..]));
        let err = decoder.read_lengths().unwrap_err();
        assert!(matches!(err, Error::InvalidStream(_)), "{err:?}");
    }

    #[test]
    fn test_truncated_block_reports_end_of_stream() {
        let data: Vec<u8> = (0..200u32).map(|i| (i * 7 % 13) as u8).collect();
        let bytes = encode_blocks(&[&data]);
        let mut decoder = HuffmanDecoder::new(DefaultInputBitStream::new(&bytes[..8]));
        let mut out = vec![0u8; data.len()];
        let err = decoder.decode(&mut out).unwrap_err();
        assert!(matches!(err, Error::EndOfStream), "{err:?}");
    }

    #[test]
    fn test_consecutive_blocks() {
        let first = b"aaaaaaaaaaaaaaaaaaaabbbbbbbbbbcccccdd".to_vec();
        let second: Vec<u8> = (0..=255).collect();
        let third = b"z".to_vec();
        let bytes = encode_blocks(&[&first, &second, &third]);
        let decoded = decode_blocks(&bytes, &[first.len(), second.len(), third.len()]).unwrap();
        assert_eq!(decoded, vec![first, second, third]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_roundtrip(data in prop::collection::vec(any::<u8>(), 0..2048)) {
            let bytes = encode_blocks(&[&data]);
            let decoded = decode_blocks(&bytes, &[data.len()]).unwrap();
            prop_assert_eq!(&decoded[0], &data);
        }

        #[test]
        fn prop_skewed_roundtrip(data in prop::collection::vec(prop::sample::select(vec![0u8, 0, 0, 0, 1, 1, 2, 3, 200]), 0..64)) {
            let bytes = encode_blocks(&[&data]);
            let decoded = decode_blocks(&bytes, &[data.len()]).unwrap();
            prop_assert_eq!(&decoded[0], &data);
        }

        #[test]
        fn prop_lengths_rebuild_same_table(freqs in prop::collection::vec(0u32..1000, 256)) {
            let table = CodeTable::from_frequencies(&freqs).unwrap();
            prop_assert!(table.max_length() <= MAX_CODE_LENGTH);
            prop_assert_eq!(CodeTable::from_lengths(table.sizes()).unwrap(), table.clone());
            prop_assert!(DecodeTree::from_table(&table).is_ok());
        }
    }
}
