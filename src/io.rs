//! Push/pull adapters between `std::io` streams and the sink/poll/finish
//! calls.
//!
//! ```
//! use std::io::{Read, Write};
//! use heatshrink::io::{HeatshrinkReader, HeatshrinkWriter};
//! use heatshrink::{DynamicDecoder, DynamicEncoder};
//!
//! let mut writer = HeatshrinkWriter::new(Vec::new(), DynamicEncoder::alloc(10, 5).unwrap());
//! writer.write_all(b"stream stream stream stream").unwrap();
//! let compressed = writer.finish().unwrap();
//!
//! let dec = DynamicDecoder::alloc(64, 10, 5).unwrap();
//! let mut reader = HeatshrinkReader::new(compressed.as_slice(), dec);
//! let mut plain = Vec::new();
//! reader.read_to_end(&mut plain).unwrap();
//! assert_eq!(plain, b"stream stream stream stream");
//! ```

use std::io::{self, Read, Write};

use super::{
    FinishResult, HeatshrinkDecoder, HeatshrinkEncoder, MatchFinder, PollResult, SinkResult,
};

const CHUNK_SIZE: usize = 512;

fn misuse(what: &str) -> io::Error {
    let msg = std::format!("heatshrink {} misuse", what);
    io::Error::new(io::ErrorKind::Other, msg)
}

/// Compresses everything written to it into `inner`.
///
/// The stream is only complete once [`HeatshrinkWriter::finish`] has run;
/// dropping the writer loses the tail of the data.
pub struct HeatshrinkWriter<W, B, F> {
    inner: W,
    encoder: HeatshrinkEncoder<B, F>,
    scratch: [u8; CHUNK_SIZE],
    total_in: u64,
    total_out: u64,
}

impl<W, B, F> HeatshrinkWriter<W, B, F>
where
    W: Write,
    B: AsRef<[u8]> + AsMut<[u8]>,
    F: MatchFinder,
{
    /// Wrap `inner`; `encoder` should be freshly built or reset.
    pub fn new(inner: W, encoder: HeatshrinkEncoder<B, F>) -> Self {
        HeatshrinkWriter {
            inner,
            encoder,
            scratch: [0; CHUNK_SIZE],
            total_in: 0,
            total_out: 0,
        }
    }

    /// The wrapped writer
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Uncompressed bytes accepted so far
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Compressed bytes handed to the inner writer so far
    pub fn total_out(&self) -> u64 {
        self.total_out
    }

    /// Write out the end of the stream, trailing bits included.
    ///
    /// Further writes fail afterwards.
    pub fn try_finish(&mut self) -> io::Result<()> {
        while self.encoder.finish() == FinishResult::More {
            self.drain()?;
        }
        self.inner.flush()
    }

    /// [`try_finish`](Self::try_finish), then give back the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.try_finish()?;
        Ok(self.inner)
    }

    fn drain(&mut self) -> io::Result<()> {
        loop {
            let (res, n) = self.encoder.poll(&mut self.scratch);
            self.inner.write_all(&self.scratch[..n])?;
            self.total_out += n as u64;
            match res {
                PollResult::More => continue,
                PollResult::Empty => return Ok(()),
                PollResult::Misuse => return Err(misuse("encoder poll")),
            }
        }
    }
}

impl<W, B, F> Write for HeatshrinkWriter<W, B, F>
where
    W: Write,
    B: AsRef<[u8]> + AsMut<[u8]>,
    F: MatchFinder,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            match self.encoder.sink(buf) {
                (SinkResult::Accepted, n) => {
                    self.total_in += n as u64;
                    self.drain()?;
                    return Ok(n);
                }
                (SinkResult::Full, _) => self.drain()?,
                (SinkResult::Misuse, _) => return Err(misuse("encoder sink")),
            }
        }
    }

    /// Flushes the inner writer only: bits still waiting for a complete
    /// byte are written by `finish`.
    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Decompresses bytes pulled from `inner`.
pub struct HeatshrinkReader<R, I, W> {
    inner: R,
    decoder: HeatshrinkDecoder<I, W>,
    buf: [u8; CHUNK_SIZE],
    pos: usize,
    len: usize,
    eof: bool,
    total_in: u64,
}

impl<R, I, W> HeatshrinkReader<R, I, W>
where
    R: Read,
    I: AsRef<[u8]> + AsMut<[u8]>,
    W: AsRef<[u8]> + AsMut<[u8]>,
{
    /// Wrap `inner`; `decoder` should be freshly built or reset.
    pub fn new(inner: R, decoder: HeatshrinkDecoder<I, W>) -> Self {
        HeatshrinkReader {
            inner,
            decoder,
            buf: [0; CHUNK_SIZE],
            pos: 0,
            len: 0,
            eof: false,
            total_in: 0,
        }
    }

    /// The wrapped reader
    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Compressed bytes pulled from the inner reader so far
    pub fn total_in(&self) -> u64 {
        self.total_in
    }

    /// Give back the inner reader, dropping any buffered compressed bytes
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R, I, W> Read for HeatshrinkReader<R, I, W>
where
    R: Read,
    I: AsRef<[u8]> + AsMut<[u8]>,
    W: AsRef<[u8]> + AsMut<[u8]>,
{
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        loop {
            if self.pos == self.len && !self.eof {
                let n = self.inner.read(&mut self.buf)?;
                if n == 0 {
                    self.eof = true;
                } else {
                    self.pos = 0;
                    self.len = n;
                    self.total_in += n as u64;
                }
            }

            if self.pos < self.len {
                let (_, n) = self.decoder.sink(&self.buf[self.pos..self.len]);
                self.pos += n;
            }

            match self.decoder.poll(out) {
                (PollResult::Misuse, _) => return Err(misuse("decoder poll")),
                (_, 0) => {}
                (_, n) => return Ok(n),
            }

            if self.eof && self.pos == self.len && self.decoder.finish() == FinishResult::Done {
                return Ok(0);
            }
        }
    }
}
