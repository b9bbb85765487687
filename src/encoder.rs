use super::bits::BitWriter;
use super::index::{MatchFinder, SizedFinder};
use super::Config;
use super::ConfigError;
use super::FinishResult;
use super::HSError;
use super::OutputCursor;
use super::PollResult;
use super::SinkResult;
use super::BACKREF_MARKER;
use super::DEFAULT_WINDOW_BITS;
use super::LITERAL_MARKER;
use super::MATCH_LENGTH_BIAS;

#[cfg(feature = "heatshrink-use-index")]
use super::index::ChainIndex;
#[cfg(not(feature = "heatshrink-use-index"))]
use super::index::LinearScan;

#[cfg(feature = "alloc")]
use alloc::{vec, vec::Vec};

#[derive(Debug, Copy, Clone, PartialEq)]
enum HSEstate {
    NotFull,       /* input buffer not full enough */
    Filled,        /* buffer is full */
    Search,        /* searching for patterns */
    YieldTagBit,   /* yield tag bit */
    YieldLiteral,  /* emit literal byte */
    YieldBrIndex,  /* yielding backref index */
    YieldBrLength, /* yielding backref length */
    SaveBacklog,   /* copying buffer to backlog */
    FlushBits,     /* flush bit buffer */
    Done,          /* done */
}

/// A constant flag to set an encoder as finishing
const FLAG_IS_FINISHING: u8 = 1;

const STATIC_BUFFER_SIZE: usize = 2 << DEFAULT_WINDOW_BITS;

/// Fixed-memory encoder for the default parameters
#[cfg(feature = "heatshrink-use-index")]
pub type StaticEncoder =
    HeatshrinkEncoder<[u8; STATIC_BUFFER_SIZE], ChainIndex<[Option<u16>; STATIC_BUFFER_SIZE]>>;
/// Fixed-memory encoder for the default parameters
#[cfg(not(feature = "heatshrink-use-index"))]
pub type StaticEncoder = HeatshrinkEncoder<[u8; STATIC_BUFFER_SIZE], LinearScan>;

/// Encoder sized at construction time
#[cfg(all(feature = "alloc", feature = "heatshrink-use-index"))]
pub type DynamicEncoder = HeatshrinkEncoder<Vec<u8>, ChainIndex<Vec<Option<u16>>>>;
/// Encoder sized at construction time
#[cfg(all(feature = "alloc", not(feature = "heatshrink-use-index")))]
pub type DynamicEncoder = HeatshrinkEncoder<Vec<u8>, LinearScan>;

/// The encoder instance.
///
/// `B` is the working buffer (`2 << window_bits` bytes: history followed
/// by input waiting to be encoded) and `F` the match search strategy.
#[derive(Debug)]
pub struct HeatshrinkEncoder<B, F> {
    config: Config,
    input_size: u16,
    match_scan_index: u16,
    match_length: u16,
    match_pos: u16,
    backlog_size: u16,
    outgoing_bits: u16,
    outgoing_bits_count: u8,
    flags: u8,
    writer: BitWriter,
    state: HSEstate,
    buffer: B,
    finder: F,
}

/// compress the src buffer to the destination buffer, with the default
/// window and lookahead sizes
pub fn encode<'a>(src: &[u8], dst: &'a mut [u8]) -> Result<&'a [u8], HSError> {
    let mut enc: StaticEncoder = Default::default();
    encode_with(&mut enc, src, dst)
}

/// compress the src buffer to the destination buffer with a caller built
/// encoder. The encoder is finished by the call; reset it to reuse it.
pub fn encode_with<'a, B, F>(
    enc: &mut HeatshrinkEncoder<B, F>,
    src: &[u8],
    dst: &'a mut [u8],
) -> Result<&'a [u8], HSError>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
    F: MatchFinder,
{
    let mut total_input_size = 0;
    let mut total_output_size = 0;
    let mut output_pending = false;

    loop {
        // Fill the input buffer from the src buffer, once the previous
        // input has been fully polled
        if total_input_size < src.len() && !output_pending {
            match enc.sink(&src[total_input_size..]) {
                (SinkResult::Accepted, segment_input_size) => {
                    total_input_size += segment_input_size;
                }
                (SinkResult::Full, _) => {}
                (SinkResult::Misuse, _) => {
                    return Err(HSError::Internal);
                }
            }
        }

        // if all the src buffer is processed, finish the compress stream
        if total_input_size == src.len() {
            if let FinishResult::Done = enc.finish() {
                break;
            }
        }

        let (res, segment_output_size) = if total_output_size < dst.len() {
            enc.poll(&mut dst[total_output_size..])
        } else {
            // dst is exhausted, any further byte means it was too small
            let mut spare = [0u8; 1];
            match enc.poll(&mut spare) {
                (_, 1) => return Err(HSError::OutputFull),
                res => res,
            }
        };
        match res {
            PollResult::Misuse => return Err(HSError::Internal),
            PollResult::More => output_pending = true,
            PollResult::Empty => output_pending = false,
        }
        total_output_size += segment_output_size;
    }

    Ok(&dst[..total_output_size])
}

impl Default for StaticEncoder {
    /// An encoder for the default parameters
    fn default() -> Self {
        HeatshrinkEncoder::from_parts(
            Config::default(),
            [0; STATIC_BUFFER_SIZE],
            Default::default(),
        )
    }
}

impl<const N: usize, F: SizedFinder> HeatshrinkEncoder<[u8; N], F> {
    /// Create a new encoder instance with inline storage; `N` must be
    /// `config.encoder_buffer_size()`.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        HeatshrinkEncoder::with_buffers(config, [0; N], F::with_buffer_len(N))
    }
}

#[cfg(feature = "alloc")]
impl<F: SizedFinder> HeatshrinkEncoder<Vec<u8>, F> {
    /// Allocate an encoder sized for `window_bits`/`lookahead_bits`
    pub fn alloc(window_bits: u8, lookahead_bits: u8) -> Result<Self, ConfigError> {
        let config = Config::new(window_bits, lookahead_bits)?;
        let size = config.encoder_buffer_size();
        HeatshrinkEncoder::with_buffers(config, vec![0; size], F::with_buffer_len(size))
    }
}

impl<B, F> HeatshrinkEncoder<B, F>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
    F: MatchFinder,
{
    /// Create an encoder over caller provided storage
    pub fn with_buffers(config: Config, buffer: B, finder: F) -> Result<Self, ConfigError> {
        let expected = config.encoder_buffer_size();
        let actual = buffer.as_ref().len();
        if actual != expected {
            return Err(ConfigError::BufferSize { expected, actual });
        }
        if !finder.supports(expected) {
            return Err(ConfigError::BufferSize {
                expected,
                actual: 0,
            });
        }
        Ok(HeatshrinkEncoder::from_parts(config, buffer, finder))
    }

    /// Storage sizes are already checked against `config`.
    fn from_parts(config: Config, buffer: B, finder: F) -> Self {
        let mut enc = HeatshrinkEncoder {
            config,
            input_size: 0,
            match_scan_index: 0,
            match_length: 0,
            match_pos: 0,
            backlog_size: 0,
            outgoing_bits: 0,
            outgoing_bits_count: 0,
            flags: 0,
            writer: BitWriter::new(),
            state: HSEstate::NotFull,
            buffer,
            finder,
        };
        enc.reset();
        enc
    }

    /// Parameters this encoder was built with
    pub fn config(&self) -> Config {
        self.config
    }

    /// Reset the current encoder instance
    pub fn reset(&mut self) {
        self.input_size = 0;
        self.match_scan_index = 0;
        self.match_length = 0;
        self.match_pos = 0;
        self.backlog_size = 0;
        self.outgoing_bits = 0;
        self.outgoing_bits_count = 0;
        self.flags = 0;
        self.writer = BitWriter::new();
        self.state = HSEstate::NotFull;
        // memset self.buffer to 0
        self.buffer.as_mut().iter_mut().for_each(|m| *m = 0);
        self.finder.reset();
    }

    /// Add an input buffer to be processed/compressed
    pub fn sink(&mut self, input_buffer: &[u8]) -> (SinkResult, usize) {
        /* Sinking more content after saying the content is done, tsk tsk */
        if self.is_finishing() {
            return (SinkResult::Misuse, 0);
        }

        /* Sinking more content before processing is done */
        if self.state != HSEstate::NotFull {
            return (SinkResult::Misuse, 0);
        }

        let write_offset = self.get_input_offset() + usize::from(self.input_size);
        let remaining_size = self.get_input_buffer_size() - usize::from(self.input_size);

        if remaining_size == 0 {
            return (SinkResult::Full, 0);
        }

        let copy_size = remaining_size.min(input_buffer.len());

        // memcpy content of input_buffer into self.buffer
        self.buffer.as_mut()[write_offset..write_offset + copy_size]
            .copy_from_slice(&input_buffer[..copy_size]);
        self.input_size += copy_size as u16;

        if copy_size == remaining_size {
            self.state = HSEstate::Filled;
        }

        (SinkResult::Accepted, copy_size)
    }

    /// function to process the input/internal buffer and put the compressed
    /// stream in the provided buffer.
    pub fn poll(&mut self, output_buffer: &mut [u8]) -> (PollResult, usize) {
        if output_buffer.is_empty() {
            return (PollResult::Misuse, 0);
        }

        let mut output_info = OutputCursor::new(output_buffer);

        loop {
            let in_state = self.state;

            match in_state {
                HSEstate::NotFull => {
                    return (PollResult::Empty, output_info.len());
                }
                HSEstate::Filled => {
                    self.do_indexing();
                    self.state = HSEstate::Search;
                }
                HSEstate::Search => {
                    self.state = self.st_step_search();
                }
                HSEstate::YieldTagBit => {
                    self.state = self.st_yield_tag_bit(&mut output_info);
                }
                HSEstate::YieldLiteral => {
                    self.state = self.st_yield_literal(&mut output_info);
                }
                HSEstate::YieldBrIndex => {
                    self.state = self.st_yield_br_index(&mut output_info);
                }
                HSEstate::YieldBrLength => {
                    self.state = self.st_yield_br_length(&mut output_info);
                }
                HSEstate::SaveBacklog => {
                    self.state = self.st_save_backlog();
                }
                HSEstate::FlushBits => {
                    self.state = self.st_flush_bit_buffer(&mut output_info);
                }
                HSEstate::Done => {
                    return (PollResult::Empty, output_info.len());
                }
            }

            // If the current state cannot advance, check if output
            // buffer is exhausted.
            if self.state == in_state && !output_info.can_take_byte() {
                return (PollResult::More, output_info.len());
            }
        }
    }

    /// Finish the compression stream.
    ///
    /// Returns `More` until every buffered byte has been emitted by `poll`.
    pub fn finish(&mut self) -> FinishResult {
        self.flags |= FLAG_IS_FINISHING;

        if self.state == HSEstate::NotFull {
            self.state = HSEstate::Filled;
        }

        if self.state == HSEstate::Done {
            FinishResult::Done
        } else {
            FinishResult::More
        }
    }

    fn st_step_search(&mut self) -> HSEstate {
        let window_length = self.get_input_buffer_size();
        let lookahead_size = self.config.lookahead_size();
        let msi = usize::from(self.match_scan_index);
        let input_size = usize::from(self.input_size);
        let fin = self.is_finishing();

        // Without more input to come, search until the last byte; otherwise
        // keep a full lookahead so matches are not cut short.
        if msi + (if fin { 1 } else { lookahead_size }) > input_size {
            return if fin {
                HSEstate::FlushBits
            } else {
                HSEstate::SaveBacklog
            };
        }

        let end = self.get_input_offset() + msi;
        let history = window_length.min(usize::from(self.backlog_size) + msi);
        let start = end - history;
        let max_possible = lookahead_size.min(input_size - msi);

        let found = self
            .finder
            .find_longest_match(self.buffer.as_ref(), start, end, max_possible)
            .filter(|m| usize::from(m.length) >= self.config.min_match_length());

        match found {
            None => {
                self.match_scan_index += 1;
                self.match_length = 0;
            }
            Some(m) => {
                self.match_pos = m.distance;
                self.match_length = m.length;
            }
        }
        HSEstate::YieldTagBit
    }

    fn st_yield_tag_bit(&mut self, output_info: &mut OutputCursor) -> HSEstate {
        if output_info.can_take_byte() {
            if self.match_length == 0 {
                self.add_tag_bit(output_info, LITERAL_MARKER);
                HSEstate::YieldLiteral
            } else {
                self.add_tag_bit(output_info, BACKREF_MARKER);
                self.outgoing_bits = self.match_pos - 1;
                self.outgoing_bits_count = self.config.window_bits();
                HSEstate::YieldBrIndex
            }
        } else {
            HSEstate::YieldTagBit
        }
    }

    fn st_yield_literal(&mut self, output_info: &mut OutputCursor) -> HSEstate {
        if output_info.can_take_byte() {
            self.push_literal_byte(output_info);
            HSEstate::Search
        } else {
            HSEstate::YieldLiteral
        }
    }

    fn st_yield_br_index(&mut self, output_info: &mut OutputCursor) -> HSEstate {
        if output_info.can_take_byte() {
            if self.push_outgoing_bits(output_info) > 0 {
                HSEstate::YieldBrIndex
            } else {
                self.outgoing_bits = self.match_length - MATCH_LENGTH_BIAS;
                self.outgoing_bits_count = self.config.lookahead_bits();
                HSEstate::YieldBrLength
            }
        } else {
            HSEstate::YieldBrIndex
        }
    }

    fn st_yield_br_length(&mut self, output_info: &mut OutputCursor) -> HSEstate {
        if output_info.can_take_byte() {
            if self.push_outgoing_bits(output_info) > 0 {
                HSEstate::YieldBrLength
            } else {
                self.match_scan_index += self.match_length;
                self.match_length = 0;
                HSEstate::Search
            }
        } else {
            HSEstate::YieldBrLength
        }
    }

    fn st_save_backlog(&mut self) -> HSEstate {
        self.save_backlog();
        HSEstate::NotFull
    }

    fn st_flush_bit_buffer(&mut self, output_info: &mut OutputCursor) -> HSEstate {
        if self.writer.flush(output_info) {
            HSEstate::Done
        } else {
            HSEstate::FlushBits
        }
    }

    fn add_tag_bit(&mut self, output_info: &mut OutputCursor, tag: u8) {
        self.writer.push_bits(1, tag, output_info);
    }

    fn get_input_offset(&self) -> usize {
        self.get_input_buffer_size()
    }

    fn get_input_buffer_size(&self) -> usize {
        self.config.window_size()
    }

    fn is_finishing(&self) -> bool {
        (self.flags & FLAG_IS_FINISHING) == FLAG_IS_FINISHING
    }

    fn do_indexing(&mut self) {
        let offset = self.get_input_offset();
        let start = offset - usize::from(self.backlog_size);
        let end = offset + usize::from(self.input_size);
        self.finder.index(self.buffer.as_ref(), start, end);
    }

    fn push_outgoing_bits(&mut self, output_info: &mut OutputCursor) -> u8 {
        let count: u8;
        let bits: u8;

        if self.outgoing_bits_count > 8 {
            count = 8;
            bits = (self.outgoing_bits >> (self.outgoing_bits_count - 8)) as u8;
        } else {
            count = self.outgoing_bits_count;
            bits = self.outgoing_bits as u8;
        }

        if count > 0 {
            let pushed = self.writer.push_bits(count, bits, output_info);
            self.outgoing_bits_count -= pushed;
            pushed
        } else {
            0
        }
    }

    fn push_literal_byte(&mut self, output_info: &mut OutputCursor) {
        let input_offset = usize::from(self.match_scan_index) - 1;
        let c = self.buffer.as_ref()[self.get_input_offset() + input_offset];
        self.writer.push_bits(8, c, output_info);
    }

    fn save_backlog(&mut self) {
        // Copy processed data to beginning of buffer, so it can be used for
        // future matches. Only reached with a full input half, the finishing
        // path flushes instead.
        let input_buf_size = self.get_input_buffer_size();
        let msi = usize::from(self.match_scan_index);
        let remaining_size = input_buf_size - msi; // unprocessed bytes
        let shift_size = input_buf_size + remaining_size;
        self.buffer.as_mut().copy_within(msi..msi + shift_size, 0);
        self.backlog_size = (usize::from(self.backlog_size) + msi).min(input_buf_size) as u16;
        self.input_size -= msi as u16;
        self.match_scan_index = 0;
    }
}

#[cfg(test)]
mod test {
    use super::{encode, HeatshrinkEncoder, StaticEncoder};
    use crate::index::{ChainIndex, LinearScan};
    use crate::{Config, ConfigError, FinishResult, HSError, PollResult, SinkResult};

    type Enc87 = HeatshrinkEncoder<[u8; 512], LinearScan>;

    fn encode_all<B, F>(enc: &mut HeatshrinkEncoder<B, F>, src: &[u8], out: &mut [u8]) -> usize
    where
        B: AsRef<[u8]> + AsMut<[u8]>,
        F: crate::MatchFinder,
    {
        let (res, n) = enc.sink(src);
        assert_eq!(res, SinkResult::Accepted);
        assert_eq!(n, src.len());
        assert_eq!(enc.finish(), FinishResult::More);
        let (res, len) = enc.poll(out);
        assert_eq!(res, PollResult::Empty);
        assert_eq!(enc.finish(), FinishResult::Done);
        len
    }

    #[test]
    fn literal_only_vector() {
        let mut enc = Enc87::new(Config::new(8, 7).unwrap()).unwrap();
        let mut out = [0u8; 16];
        let len = encode_all(&mut enc, &[0, 1, 2, 3, 4], &mut out);
        assert_eq!(&out[..len], &[0x80, 0x40, 0x60, 0x50, 0x38, 0x20]);
    }

    #[test]
    fn self_overlapping_backref_vector() {
        let mut enc = Enc87::new(Config::new(8, 7).unwrap()).unwrap();
        let mut out = [0u8; 16];
        let len = encode_all(&mut enc, b"aaaaa", &mut out);
        assert_eq!(&out[..len], &[0xb0, 0x80, 0x01, 0x80]);
    }

    #[test]
    fn index_and_scan_agree() {
        let src = b"she sells sea shells by the sea shore, the shells she sells are sea shells";
        let cfg = Config::new(8, 4).unwrap();
        let mut scan = HeatshrinkEncoder::<[u8; 512], LinearScan>::new(cfg).unwrap();
        let mut chain =
            HeatshrinkEncoder::<[u8; 512], ChainIndex<[Option<u16>; 512]>>::new(cfg).unwrap();
        let mut a = [0u8; 128];
        let mut b = [0u8; 128];
        let la = encode_all(&mut scan, src, &mut a);
        let lb = encode_all(&mut chain, src, &mut b);
        assert_eq!(&a[..la], &b[..lb]);
        assert!(la < src.len());
    }

    #[test]
    fn rejects_mismatched_storage() {
        let cfg = Config::new(7, 4).unwrap();
        assert_eq!(
            Enc87::new(cfg).err(),
            Some(ConfigError::BufferSize {
                expected: 256,
                actual: 512
            })
        );
    }

    #[test]
    fn sink_after_finish_is_misuse() {
        let mut enc: StaticEncoder = Default::default();
        assert_eq!(enc.sink(b"abc"), (SinkResult::Accepted, 3));
        enc.finish();
        assert_eq!(enc.sink(b"d"), (SinkResult::Misuse, 0));
    }

    #[test]
    fn sink_before_poll_is_misuse() {
        let mut enc: StaticEncoder = Default::default();
        let big = [7u8; 300];
        assert_eq!(enc.sink(&big), (SinkResult::Accepted, 256));
        assert_eq!(enc.sink(&big[256..]), (SinkResult::Misuse, 0));
        let mut out = [0u8; 64];
        assert_eq!(enc.poll(&mut out).0, PollResult::Empty);
        assert_eq!(enc.sink(&big[256..]).0, SinkResult::Accepted);
    }

    #[test]
    fn empty_poll_buffer_leaves_state_untouched() {
        let src = b"abcabcabcabcabc";
        let mut reference = [0u8; 64];
        let expected = encode(src, &mut reference).unwrap();

        let mut enc: StaticEncoder = Default::default();
        enc.sink(src);
        enc.finish();
        assert_eq!(enc.poll(&mut []), (PollResult::Misuse, 0));
        let mut out = [0u8; 64];
        let (res, len) = enc.poll(&mut out);
        assert_eq!(res, PollResult::Empty);
        assert_eq!(&out[..len], expected);
    }

    #[test]
    fn one_byte_polls_reproduce_bulk_output() {
        let src = b"abracadabra abracadabra abracadabra";
        let mut reference = [0u8; 64];
        let expected = encode(src, &mut reference).unwrap();

        let mut enc: StaticEncoder = Default::default();
        for &byte in src.iter() {
            assert_eq!(enc.sink(&[byte]), (SinkResult::Accepted, 1));
        }
        let mut collected = [0u8; 64];
        let mut total = 0;
        let mut polls = 0;
        while enc.finish() == FinishResult::More {
            let mut one = [0u8; 1];
            let (_, n) = enc.poll(&mut one);
            collected[total..total + n].copy_from_slice(&one[..n]);
            total += n;
            polls += 1;
            assert!(polls < 1000);
        }
        assert_eq!(&collected[..total], expected);
    }

    #[test]
    fn reset_allows_reuse() {
        let mut enc: StaticEncoder = Default::default();
        let mut first = [0u8; 32];
        let n1 = encode_all(&mut enc, b"hello hello", &mut first);
        enc.reset();
        let mut second = [0u8; 32];
        let n2 = encode_all(&mut enc, b"hello hello", &mut second);
        assert_eq!(&first[..n1], &second[..n2]);
    }

    #[test]
    fn output_full_is_reported() {
        // ten literals, 90 bits
        let src = b"0123456789";
        let mut dst = [0u8; 11];
        assert_eq!(encode(src, &mut dst), Err(HSError::OutputFull));
        let mut exact = [0u8; 12];
        assert_eq!(encode(src, &mut exact).map(|out| out.len()), Ok(12));
    }

    #[test]
    fn default_encoder_uses_default_parameters() {
        let enc: StaticEncoder = Default::default();
        assert_eq!(enc.config(), Config::default());
        assert_eq!(enc.config().encoder_buffer_size(), 512);

        let enc = Enc87::new(Config::new(8, 7).unwrap()).unwrap();
        assert_eq!(enc.config().lookahead_bits(), 7);
    }
}
