//! Bit-addressable streams.
//!
//! Every coder in this crate reads and writes its compressed output through
//! [`OutputBitStream`] / [`InputBitStream`]. Bits are packed most significant
//! first: the first bit written lands in bit 7 of the first byte.
//!
//! The default implementations buffer whole bytes in memory and move them to
//! or from any [`Write`] / [`Read`] in chunks of the configured capacity.

use std::io::{self, Read, Write};

use tracing::debug;

use crate::error::{Error, Result};

/// Default size, in bytes, of the internal buffer of the default streams.
pub const DEFAULT_BUFFER_SIZE: usize = 16384;

/// Sink for individual bits and bit groups.
pub trait OutputBitStream {
    /// Write the least significant bit of `bit`.
    ///
    /// Returns `false` when the stream refuses the bit (closed or failed).
    fn write_bit(&mut self, bit: u32) -> bool {
        self.write_bits(u64::from(bit & 1), 1) == 1
    }

    /// Write the `length` low bits of `value`, most significant first.
    ///
    /// Returns the number of bits accepted: `length` on success, 0 when the
    /// stream is closed, has failed, or `length` is not in `1..=64`. A write
    /// whose bytes the sink rejects returns 0 and fails the stream.
    fn write_bits(&mut self, value: u64, length: u32) -> u32;

    /// Push all complete buffered bytes to the underlying sink.
    fn flush(&mut self) -> Result<()>;

    /// Pad, flush and close the stream. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;

    /// Number of bits written so far.
    fn written(&self) -> u64;
}

/// Source of individual bits and bit groups.
pub trait InputBitStream {
    /// Read one bit, returned as 0 or 1.
    fn read_bit(&mut self) -> Result<u32> {
        Ok(self.read_bits(1)? as u32)
    }

    /// Read `length` bits (`1..=64`), most significant first.
    ///
    /// # Errors
    /// `EndOfStream` when the source is exhausted, `StreamClosed` after
    /// [`InputBitStream::close`], `InvalidArgument` for a bad `length`.
    fn read_bits(&mut self, length: u32) -> Result<u64>;

    /// Close the stream. Later reads fail with `StreamClosed`.
    fn close(&mut self) -> Result<()>;

    /// Number of bits read so far.
    fn read(&self) -> u64;

    /// Whether at least one more bit can be read. `false` after a read error,
    /// which the next `read_bits` returns.
    fn has_more_to_read(&mut self) -> bool;
}

impl<T: OutputBitStream + ?Sized> OutputBitStream for &mut T {
    fn write_bit(&mut self, bit: u32) -> bool {
        (**self).write_bit(bit)
    }

    fn write_bits(&mut self, value: u64, length: u32) -> u32 {
        (**self).write_bits(value, length)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn written(&self) -> u64 {
        (**self).written()
    }
}

impl<T: OutputBitStream + ?Sized> OutputBitStream for Box<T> {
    fn write_bit(&mut self, bit: u32) -> bool {
        (**self).write_bit(bit)
    }

    fn write_bits(&mut self, value: u64, length: u32) -> u32 {
        (**self).write_bits(value, length)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn written(&self) -> u64 {
        (**self).written()
    }
}

impl<T: InputBitStream + ?Sized> InputBitStream for &mut T {
    fn read_bit(&mut self) -> Result<u32> {
        (**self).read_bit()
    }

    fn read_bits(&mut self, length: u32) -> Result<u64> {
        (**self).read_bits(length)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn read(&self) -> u64 {
        (**self).read()
    }

    fn has_more_to_read(&mut self) -> bool {
        (**self).has_more_to_read()
    }
}

impl<T: InputBitStream + ?Sized> InputBitStream for Box<T> {
    fn read_bit(&mut self) -> Result<u32> {
        (**self).read_bit()
    }

    fn read_bits(&mut self, length: u32) -> Result<u64> {
        (**self).read_bits(length)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn read(&self) -> u64 {
        (**self).read()
    }

    fn has_more_to_read(&mut self) -> bool {
        (**self).has_more_to_read()
    }
}

/// Buffered bit writer over any [`Write`].
///
/// [`OutputBitStream::close`] pads the last partial byte with zero bits, then
/// appends `0xFF` bytes up to a 64-bit boundary so that a reader fetching up
/// to 64 bits at a time never runs off the tail.
#[derive(Debug)]
pub struct DefaultOutputBitStream<W: Write> {
    sink: W,
    buffer: Vec<u8>,
    capacity: usize,
    /// Partial byte, `pending_bits` low bits valid.
    pending: u32,
    pending_bits: u32,
    written: u64,
    closed: bool,
    failure: Option<io::ErrorKind>,
}

impl<W: Write> DefaultOutputBitStream<W> {
    /// Create a stream with a [`DEFAULT_BUFFER_SIZE`] buffer.
    pub fn new(sink: W) -> Self {
        Self::build(sink, DEFAULT_BUFFER_SIZE)
    }

    /// Create a stream buffering `capacity` bytes before writing to `sink`.
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` if `capacity` is 0.
    pub fn with_capacity(sink: W, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidArgument(
                "bit stream buffer capacity must be at least 1 byte".into(),
            ));
        }
        Ok(Self::build(sink, capacity))
    }

    fn build(sink: W, capacity: usize) -> Self {
        Self {
            sink,
            buffer: Vec::with_capacity(capacity),
            capacity,
            pending: 0,
            pending_bits: 0,
            written: 0,
            closed: false,
            failure: None,
        }
    }

    /// Borrow the underlying sink.
    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    /// Whether [`OutputBitStream::close`] has been called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Return the underlying sink. Bits not yet flushed are dropped, so call
    /// [`OutputBitStream::close`] first.
    pub fn into_inner(self) -> W {
        self.sink
    }

    fn push_byte(&mut self, byte: u8) -> io::Result<()> {
        self.buffer.push(byte);
        if self.buffer.len() >= self.capacity {
            self.drain()?;
        }
        Ok(())
    }

    /// Move the buffer to the sink. A failed write drops the buffered bytes
    /// and leaves the stream refusing all further writes.
    fn drain(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let result = self.sink.write_all(&self.buffer);
        self.buffer.clear();
        if let Err(e) = &result {
            self.failure = Some(e.kind());
        }
        result
    }

    fn check_failure(&self) -> io::Result<()> {
        match self.failure {
            Some(kind) => Err(io::Error::from(kind)),
            None => Ok(()),
        }
    }
}

impl<W: Write> OutputBitStream for DefaultOutputBitStream<W> {
    fn write_bits(&mut self, value: u64, length: u32) -> u32 {
        if self.closed || self.failure.is_some() || length == 0 || length > 64 {
            return 0;
        }

        let mut remaining = length;
        while remaining > 0 {
            let n = remaining.min(8 - self.pending_bits);
            remaining -= n;
            let chunk = ((value >> remaining) & ((1u64 << n) - 1)) as u32;
            self.pending = (self.pending << n) | chunk;
            self.pending_bits += n;

            if self.pending_bits == 8 {
                let byte = self.pending as u8;
                self.pending = 0;
                self.pending_bits = 0;
                if self.push_byte(byte).is_err() {
                    return 0;
                }
            }
        }

        self.written += u64::from(length);
        length
    }

    fn flush(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::StreamClosed);
        }
        self.check_failure()?;
        self.drain()?;
        self.sink.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.check_failure()?;

        let mut padding = 0u64;
        if self.pending_bits > 0 {
            let fill = 8 - self.pending_bits;
            self.push_byte((self.pending << fill) as u8)?;
            self.pending = 0;
            self.pending_bits = 0;
            self.written += u64::from(fill);
            padding += u64::from(fill);
        }

        while self.written & 63 != 0 {
            self.push_byte(0xFF)?;
            self.written += 8;
            padding += 8;
        }

        self.flush()?;
        self.closed = true;
        debug!(written = self.written, padding, "output bit stream closed");
        Ok(())
    }

    fn written(&self) -> u64 {
        self.written
    }
}

/// Buffered bit reader over any [`Read`].
#[derive(Debug)]
pub struct DefaultInputBitStream<R: Read> {
    source: R,
    buffer: Box<[u8]>,
    position: usize,
    limit: usize,
    current: u32,
    bits_left: u32,
    read: u64,
    closed: bool,
    failure: Option<io::ErrorKind>,
}

impl<R: Read> DefaultInputBitStream<R> {
    /// Create a stream with a [`DEFAULT_BUFFER_SIZE`] buffer.
    pub fn new(source: R) -> Self {
        Self::build(source, DEFAULT_BUFFER_SIZE)
    }

    /// Create a stream reading up to `capacity` bytes at a time from `source`.
    ///
    /// # Errors
    /// Returns `Error::InvalidArgument` if `capacity` is 0.
    pub fn with_capacity(source: R, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InvalidArgument(
                "bit stream buffer capacity must be at least 1 byte".into(),
            ));
        }
        Ok(Self::build(source, capacity))
    }

    fn build(source: R, capacity: usize) -> Self {
        Self {
            source,
            buffer: vec![0u8; capacity].into_boxed_slice(),
            position: 0,
            limit: 0,
            current: 0,
            bits_left: 0,
            read: 0,
            closed: false,
            failure: None,
        }
    }

    /// Return the underlying source.
    pub fn into_inner(self) -> R {
        self.source
    }

    /// Fetch the next chunk. A read error is kept and returned again by
    /// every later refill.
    fn refill(&mut self) -> io::Result<bool> {
        if let Some(kind) = self.failure {
            return Err(io::Error::from(kind));
        }
        loop {
            match self.source.read(&mut self.buffer) {
                Ok(n) => {
                    self.position = 0;
                    self.limit = n;
                    return Ok(n > 0);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    self.failure = Some(e.kind());
                    return Err(e);
                }
            }
        }
    }

    fn next_byte(&mut self) -> Result<u8> {
        if self.closed {
            return Err(Error::StreamClosed);
        }
        if self.position == self.limit && !self.refill()? {
            return Err(Error::EndOfStream);
        }
        let byte = self.buffer[self.position];
        self.position += 1;
        Ok(byte)
    }
}

impl<R: Read> InputBitStream for DefaultInputBitStream<R> {
    fn read_bits(&mut self, length: u32) -> Result<u64> {
        if length == 0 || length > 64 {
            return Err(Error::InvalidArgument(format!(
                "cannot read {length} bits (must be in 1..=64)"
            )));
        }

        let mut value = 0u64;
        let mut remaining = length;
        while remaining > 0 {
            if self.bits_left == 0 {
                self.current = u32::from(self.next_byte()?);
                self.bits_left = 8;
            }
            let n = remaining.min(self.bits_left);
            self.bits_left -= n;
            remaining -= n;
            let chunk = (self.current >> self.bits_left) & ((1 << n) - 1);
            value = (value << n) | u64::from(chunk);
            self.read += u64::from(n);
        }

        Ok(value)
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        self.bits_left = 0;
        self.position = 0;
        self.limit = 0;
        Ok(())
    }

    fn read(&self) -> u64 {
        self.read
    }

    fn has_more_to_read(&mut self) -> bool {
        if self.closed {
            return false;
        }
        if self.bits_left > 0 || self.position < self.limit {
            return true;
        }
        // A read error reports "no more"; the next read returns it.
        self.refill().unwrap_or(false)
    }
}
