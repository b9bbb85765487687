#![crate_type = "rlib"]
#![no_std]
#![deny(warnings)]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Minimal streaming compression & decompression library for embedded use
//! Implements the Heatshrink compression algorithm
//! described here <https://github.com/atomicobject/heatshrink>
//! and here <https://spin.atomicobject.com/2013/03/14/heatshrink-embedded-data-compression/>
//!
//! Both halves are driven by the same three calls: `sink` feeds input,
//! `poll` drains output into a caller buffer of any size, and `finish`
//! marks the end of the input. None of them blocks or allocates once the
//! instance is built, so an encoder or decoder can run inside an interrupt
//! handler or an event loop with a few hundred bytes of working memory.
//!
//! Instances are either fixed-size (storage inline, see [`encoder::StaticEncoder`]
//! and [`decoder::StaticDecoder`]) or, with the `alloc` feature, sized once at
//! construction from run-time parameters.

use core::fmt;

#[cfg(feature = "alloc")]
extern crate alloc;

#[cfg(any(feature = "std", test))]
extern crate std;

mod bits;
/// module to uncompress some compressed data
pub mod decoder;
/// module to compress data
pub mod encoder;
/// match search strategies used by the encoder
pub mod index;
/// `std::io` adapters around the encoder and decoder
#[cfg(feature = "std")]
pub mod io;

pub use decoder::{decode, decode_with, HeatshrinkDecoder, StaticDecoder};
pub use encoder::{encode, encode_with, HeatshrinkEncoder, StaticEncoder};
pub use index::{ChainIndex, LinearScan, Match, MatchFinder, SizedFinder};

#[cfg(feature = "alloc")]
pub use decoder::DynamicDecoder;
#[cfg(feature = "alloc")]
pub use encoder::DynamicEncoder;

/// Smallest accepted base-2 log of the window size
pub const MIN_WINDOW_BITS: u8 = 4;
/// Largest accepted base-2 log of the window size
pub const MAX_WINDOW_BITS: u8 = 15;
/// Smallest accepted number of bits for back-reference lengths
pub const MIN_LOOKAHEAD_BITS: u8 = 3;

/// Window size used by [`encode`], [`decode`] and the static aliases
pub const DEFAULT_WINDOW_BITS: u8 = 8;
/// Back-reference length bits used by [`encode`], [`decode`] and the static aliases
pub const DEFAULT_LOOKAHEAD_BITS: u8 = 4;
/// Input buffer size of [`StaticDecoder`]
pub const DEFAULT_INPUT_BUFFER_SIZE: usize = 32;

/// Back-reference lengths are stored on the wire minus this bias.
pub const MATCH_LENGTH_BIAS: u16 = 1;

pub(crate) const LITERAL_MARKER: u8 = 0x01;
pub(crate) const BACKREF_MARKER: u8 = 0x00;

/// Return code for sink function call
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SinkResult {
    /// Data was correctly added to internal buffer
    Accepted,
    /// Internal buffer is full, no data was added
    Full,
    /// instance is not in correct state.
    Misuse,
}

/// Return code for poll function call
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PollResult {
    /// All buffered input has been turned into output
    Empty,
    /// The output buffer ran out, poll again before sinking more input
    More,
    /// Error in input parameters
    Misuse,
}

/// Return code for finish function call
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FinishResult {
    /// Operation is done
    Done,
    /// Buffered data is left, poll (and possibly sink) again
    More,
}

/// Rejected construction parameters
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// window_bits outside `[MIN_WINDOW_BITS, MAX_WINDOW_BITS]`
    WindowBits(u8),
    /// lookahead_bits outside `[MIN_LOOKAHEAD_BITS, window_bits - 1]`
    LookaheadBits(u8),
    /// decoder input buffer of zero bytes
    InputBufferSize,
    /// caller supplied storage does not have the length the parameters require
    BufferSize {
        /// length required by the configuration
        expected: usize,
        /// length actually provided
        actual: usize,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::WindowBits(bits) => write!(
                f,
                "window bits {} not in [{}, {}]",
                bits, MIN_WINDOW_BITS, MAX_WINDOW_BITS
            ),
            ConfigError::LookaheadBits(bits) => write!(
                f,
                "lookahead bits {} must be at least {} and below the window bits",
                bits, MIN_LOOKAHEAD_BITS
            ),
            ConfigError::InputBufferSize => write!(f, "input buffer size must not be zero"),
            ConfigError::BufferSize { expected, actual } => {
                write!(f, "buffer holds {} bytes, {} required", actual, expected)
            }
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for ConfigError {}

/// Error that can be encountered while (un)compresing data
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HSError {
    /// The output buffer was not large enough to hold output data
    OutputFull,
    /// Some internal error did occur
    Internal,
    /// The encoder or decoder could not be built
    Config(ConfigError),
}

impl fmt::Display for HSError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HSError::OutputFull => write!(f, "output buffer was insufficient"),
            HSError::Internal => write!(f, "encoder or decoder was misused"),
            HSError::Config(err) => write!(f, "invalid configuration: {}", err),
        }
    }
}

impl From<ConfigError> for HSError {
    fn from(err: ConfigError) -> Self {
        HSError::Config(err)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for HSError {}

/// Window and lookahead parameters shared by an encoder and its decoder.
///
/// Nothing in the stream records them, so both sides must agree out of band.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Config {
    window_bits: u8,
    lookahead_bits: u8,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            window_bits: DEFAULT_WINDOW_BITS,
            lookahead_bits: DEFAULT_LOOKAHEAD_BITS,
        }
    }
}

impl Config {
    /// Validate a window/lookahead pair
    pub const fn new(window_bits: u8, lookahead_bits: u8) -> Result<Self, ConfigError> {
        if window_bits < MIN_WINDOW_BITS || window_bits > MAX_WINDOW_BITS {
            Err(ConfigError::WindowBits(window_bits))
        } else if lookahead_bits < MIN_LOOKAHEAD_BITS || lookahead_bits >= window_bits {
            Err(ConfigError::LookaheadBits(lookahead_bits))
        } else {
            Ok(Config {
                window_bits,
                lookahead_bits,
            })
        }
    }

    /// Base-2 log of the window size
    pub const fn window_bits(&self) -> u8 {
        self.window_bits
    }

    /// Number of bits used for back-reference lengths
    pub const fn lookahead_bits(&self) -> u8 {
        self.lookahead_bits
    }

    /// Number of bytes a back-reference can reach
    pub const fn window_size(&self) -> usize {
        1 << self.window_bits
    }

    /// Longest encodable match
    pub const fn lookahead_size(&self) -> usize {
        1 << self.lookahead_bits
    }

    /// Encoder buffer length: one window of history plus one of pending input
    pub const fn encoder_buffer_size(&self) -> usize {
        2 << self.window_bits
    }

    /// Shortest match the encoder emits as a back-reference.
    ///
    /// Anything shorter costs at least as many bits as the literals it
    /// would replace.
    pub const fn min_match_length(&self) -> usize {
        let break_even_point = 1 + self.window_bits as usize + self.lookahead_bits as usize;
        break_even_point / 8 + 1
    }
}

/// Structure to manage the output buffer and keep track of how much it is
/// filled
pub(crate) struct OutputCursor<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> OutputCursor<'a> {
    pub(crate) fn new(buf: &'a mut [u8]) -> Self {
        OutputCursor { buf, len: 0 }
    }

    /// Caller checks `can_take_byte` first.
    pub(crate) fn push_byte(&mut self, byte: u8) {
        self.buf[self.len] = byte;
        self.len += 1;
    }

    pub(crate) fn can_take_byte(&self) -> bool {
        self.len < self.buf.len()
    }

    pub(crate) fn remaining_free_size(&self) -> usize {
        self.buf.len() - self.len
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }
}
