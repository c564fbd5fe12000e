//! # Entropy coders over a bit stream
//!
//! *Four ways to spend fewer bits on likely bytes.*
//!
//! ## Intuition First
//!
//! An entropy coder gives frequent symbols short codes and rare symbols long
//! ones. The coders here differ in how they learn what "frequent" means and
//! in how finely they can split a bit:
//!
//! - **Exp-Golomb** assumes small magnitudes are common and never learns.
//! - **Huffman** counts a whole block up front and ships a code per block.
//! - **Range** learns byte frequencies as it goes and codes fractional bits.
//! - **PAQ** learns bit by bit from context and codes fractional bits.
//!
//! ## The Problem
//!
//! A byte-oriented compressor ends with a stage that turns already-transformed
//! data (BWT output, residuals, literals) into as few bits as possible. No
//! single coder wins everywhere:
//! - **Prefix codes** (Exp-Golomb, Huffman) are fast but spend at least one
//!   whole bit per symbol.
//! - **Arithmetic-style coders** (Range, PAQ) approach the entropy but do
//!   arithmetic on every symbol or bit.
//!
//! ## Historical Context
//!
//! ```text
//! 1948  Shannon     Entropy as the fundamental limit
//! 1952  Huffman     Minimum-redundancy prefix codes
//! 1964  Schwartz    Canonical Huffman codes
//! 1978  Teuhola     Exponential-Golomb codes
//! 1979  Martin      Range coding
//! 1999  Subbotin    Carryless range coder
//! 2002  Mahoney     PAQ context mixing
//! ```
//!
//! ## Structure
//!
//! Every coder reads or writes through the [`bitstream`] traits and
//! implements the [`codec`] contract, so a caller can pick one at run time:
//!
//! ```rust
//! use entcode::{new_decoder, new_encoder, EntropyCodecType, EntropyDecoder, EntropyEncoder};
//! use entcode::bitstream::{DefaultInputBitStream, DefaultOutputBitStream, OutputBitStream};
//!
//! let data = b"abracadabra";
//! let mut obs = DefaultOutputBitStream::new(Vec::new());
//! {
//!     let mut encoder = new_encoder(EntropyCodecType::Range, &mut obs);
//!     encoder.encode(data)?;
//!     encoder.dispose()?;
//! }
//! obs.close()?;
//! let bytes = obs.into_inner();
//!
//! let mut decoder = new_decoder(EntropyCodecType::Range, DefaultInputBitStream::new(&bytes[..]));
//! let mut out = vec![0u8; data.len()];
//! decoder.decode(&mut out)?;
//! assert_eq!(&out, data);
//! # Ok::<(), entcode::Error>(())
//! ```
//!
//! ## Failure Modes
//!
//! 1. **Desynchronization**: a decoder must see exactly the bits its encoder
//!    wrote, in order. The range coder notices some corruption (its reserved
//!    257th symbol); the PAQ coder silently decodes garbage.
//! 2. **Block framing**: block lengths are not stored. The caller must know
//!    how many symbols to decode.
//!
//! ## Concurrency
//!
//! Coders are single-owner state machines (`&mut self` everywhere). Use one
//! instance per stream.
//!
//! ## References
//!
//! - Huffman, D. (1952). "A Method for the Construction of Minimum-Redundancy Codes."
//! - Subbotin, D. (1999). "Carryless Rangecoder."
//! - Mahoney, M. (2005). "Adaptive Weighing of Context Models for Lossless Data Compression."

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bitstream;
pub mod codec;
pub mod error;
pub mod expgolomb;
pub mod huffman;
pub mod paq;
pub mod predictor;
pub mod range;

pub use codec::{new_decoder, new_encoder, EntropyCodecType, EntropyDecoder, EntropyEncoder};
pub use error::{Error, Result};
pub use expgolomb::{ExpGolombDecoder, ExpGolombEncoder};
pub use huffman::{HuffmanDecoder, HuffmanEncoder};
pub use paq::{PaqDecoder, PaqEncoder};
pub use range::{RangeDecoder, RangeEncoder};
