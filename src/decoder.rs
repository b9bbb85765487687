use super::bits::{BitReader, ByteSource};
use super::Config;
use super::ConfigError;
use super::FinishResult;
use super::HSError;
use super::OutputCursor;
use super::PollResult;
use super::SinkResult;
use super::DEFAULT_INPUT_BUFFER_SIZE;
use super::DEFAULT_WINDOW_BITS;
use super::MATCH_LENGTH_BIAS;

#[cfg(feature = "alloc")]
use alloc::{vec, vec::Vec};

#[derive(Debug, Copy, Clone, PartialEq)]
enum HSDstate {
    TagBit,          /* tag bit */
    YieldLiteral,    /* ready to yield literal byte */
    BackrefIndexMsb, /* most significant byte of index */
    BackrefIndexLsb, /* least significant byte of index */
    BackrefCountMsb, /* most significant byte of count */
    BackrefCountLsb, /* least significant byte of count */
    YieldBackref,    /* ready to yield back-reference */
}

/// Fixed-memory decoder for the default parameters
pub type StaticDecoder =
    HeatshrinkDecoder<[u8; DEFAULT_INPUT_BUFFER_SIZE], [u8; 1 << DEFAULT_WINDOW_BITS]>;

/// Decoder sized at construction time
#[cfg(feature = "alloc")]
pub type DynamicDecoder = HeatshrinkDecoder<Vec<u8>, Vec<u8>>;

/// Compressed bytes sunk but not yet read
#[derive(Debug)]
struct InputBuffer<S> {
    buf: S,
    size: usize,
    index: usize,
}

impl<S: AsRef<[u8]>> ByteSource for InputBuffer<S> {
    fn next_byte(&mut self) -> Option<u8> {
        if self.size == 0 {
            return None;
        }
        let byte = self.buf.as_ref()[self.index];
        self.index += 1;
        if self.index == self.size {
            // input_buffer is consumed
            self.index = 0;
            self.size = 0;
        }
        Some(byte)
    }
}

/// the decoder instance
///
/// `I` holds compressed input between `sink` and `poll`, `W` is the
/// `1 << window_bits` byte history that back-references copy from.
#[derive(Debug)]
pub struct HeatshrinkDecoder<I, W> {
    config: Config,
    output_count: u16,
    output_index: u16,
    head_index: u16,
    reader: BitReader,
    state: HSDstate,
    input: InputBuffer<I>,
    output_buffer: W,
}

/// uncompress the src buffer to the destination buffer, with the default
/// window and lookahead sizes
pub fn decode<'a>(src: &[u8], dst: &'a mut [u8]) -> Result<&'a [u8], HSError> {
    let mut dec: StaticDecoder = Default::default();
    decode_with(&mut dec, src, dst)
}

/// uncompress the src buffer to the destination buffer with a caller built
/// decoder
pub fn decode_with<'a, I, W>(
    dec: &mut HeatshrinkDecoder<I, W>,
    src: &[u8],
    dst: &'a mut [u8],
) -> Result<&'a [u8], HSError>
where
    I: AsRef<[u8]> + AsMut<[u8]>,
    W: AsRef<[u8]> + AsMut<[u8]>,
{
    let mut total_input_size = 0;
    let mut total_output_size = 0;

    loop {
        // Fill the input buffer from the src buffer
        if total_input_size < src.len() {
            match dec.sink(&src[total_input_size..]) {
                (SinkResult::Accepted, segment_input_size) => {
                    total_input_size += segment_input_size;
                }
                (SinkResult::Full, _) => {}
                (SinkResult::Misuse, _) => {
                    return Err(HSError::Internal);
                }
            }
        }

        // process the current input buffer
        let (res, segment_output_size) = if total_output_size < dst.len() {
            dec.poll(&mut dst[total_output_size..])
        } else {
            // dst is exhausted, any further byte means it was too small
            let mut spare = [0u8; 1];
            match dec.poll(&mut spare) {
                (_, 1) => return Err(HSError::OutputFull),
                res => res,
            }
        };
        total_output_size += segment_output_size;

        match res {
            PollResult::Misuse => return Err(HSError::Internal),
            PollResult::More => {}
            PollResult::Empty => {
                // if all the src buffer is processed, finish the uncompress stream
                if total_input_size == src.len() {
                    if let FinishResult::Done = dec.finish() {
                        break;
                    }
                }
            }
        }
    }

    Ok(&dst[..total_output_size])
}

impl Default for StaticDecoder {
    /// A decoder for the default parameters
    fn default() -> Self {
        HeatshrinkDecoder::from_parts(
            Config::default(),
            [0; DEFAULT_INPUT_BUFFER_SIZE],
            [0; 1 << DEFAULT_WINDOW_BITS],
        )
    }
}

impl<const N: usize, const M: usize> HeatshrinkDecoder<[u8; N], [u8; M]> {
    /// Create a new decoder instance with inline storage: an `N` byte input
    /// buffer and a window of `M == config.window_size()` bytes.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        HeatshrinkDecoder::with_buffers(config, [0; N], [0; M])
    }
}

#[cfg(feature = "alloc")]
impl HeatshrinkDecoder<Vec<u8>, Vec<u8>> {
    /// Allocate a decoder with an `input_buffer_size` byte input buffer
    pub fn alloc(
        input_buffer_size: usize,
        window_bits: u8,
        lookahead_bits: u8,
    ) -> Result<Self, ConfigError> {
        if input_buffer_size == 0 {
            return Err(ConfigError::InputBufferSize);
        }
        let config = Config::new(window_bits, lookahead_bits)?;
        HeatshrinkDecoder::with_buffers(
            config,
            vec![0; input_buffer_size],
            vec![0; config.window_size()],
        )
    }
}

impl<I, W> HeatshrinkDecoder<I, W>
where
    I: AsRef<[u8]> + AsMut<[u8]>,
    W: AsRef<[u8]> + AsMut<[u8]>,
{
    /// Create a decoder over caller provided storage
    pub fn with_buffers(config: Config, input_buffer: I, window: W) -> Result<Self, ConfigError> {
        if input_buffer.as_ref().is_empty() {
            return Err(ConfigError::InputBufferSize);
        }
        let expected = config.window_size();
        let actual = window.as_ref().len();
        if actual != expected {
            return Err(ConfigError::BufferSize { expected, actual });
        }
        Ok(HeatshrinkDecoder::from_parts(config, input_buffer, window))
    }

    /// Storage sizes are already checked against `config`.
    fn from_parts(config: Config, input_buffer: I, window: W) -> Self {
        let mut dec = HeatshrinkDecoder {
            config,
            output_count: 0,
            output_index: 0,
            head_index: 0,
            reader: BitReader::new(),
            state: HSDstate::TagBit,
            input: InputBuffer {
                buf: input_buffer,
                size: 0,
                index: 0,
            },
            output_buffer: window,
        };
        dec.reset();
        dec
    }

    /// Parameters this decoder was built with
    pub fn config(&self) -> Config {
        self.config
    }

    /// Reset the current decoder instance
    pub fn reset(&mut self) {
        self.input.size = 0;
        self.input.index = 0;
        self.output_count = 0;
        self.output_index = 0;
        self.head_index = 0;
        self.reader = BitReader::new();
        self.state = HSDstate::TagBit;
        // memset self.buffer to 0
        self.input.buf.as_mut().iter_mut().for_each(|m| *m = 0);
        self.output_buffer.as_mut().iter_mut().for_each(|m| *m = 0);
    }

    /// Add an input buffer to be processed/uncompressed
    pub fn sink(&mut self, input_buffer: &[u8]) -> (SinkResult, usize) {
        let capacity = self.input.buf.as_ref().len();
        let remaining_size = capacity - self.input.size;

        if remaining_size == 0 {
            return (SinkResult::Full, 0);
        }

        let copy_size = remaining_size.min(input_buffer.len());

        // memcpy content of input_buffer into self.input.buf.
        let start = self.input.size;
        self.input.buf.as_mut()[start..start + copy_size]
            .copy_from_slice(&input_buffer[..copy_size]);
        self.input.size += copy_size;

        (SinkResult::Accepted, copy_size)
    }

    /// function to process the input/internal buffer and put the uncompressed
    /// stream in the provided buffer.
    pub fn poll(&mut self, output_buffer: &mut [u8]) -> (PollResult, usize) {
        if output_buffer.is_empty() {
            return (PollResult::Misuse, 0);
        }

        let mut output_info = OutputCursor::new(output_buffer);

        loop {
            let in_state = self.state;

            match in_state {
                HSDstate::TagBit => {
                    self.state = self.st_tag_bit();
                }
                HSDstate::YieldLiteral => {
                    self.state = self.st_yield_literal(&mut output_info);
                }
                HSDstate::BackrefIndexMsb => {
                    self.state = self.st_backref_index_msb();
                }
                HSDstate::BackrefIndexLsb => {
                    self.state = self.st_backref_index_lsb();
                }
                HSDstate::BackrefCountMsb => {
                    self.state = self.st_backref_count_msb();
                }
                HSDstate::BackrefCountLsb => {
                    self.state = self.st_backref_count_lsb();
                }
                HSDstate::YieldBackref => {
                    self.state = self.st_yield_backref(&mut output_info);
                }
            }

            // If the current state cannot advance, check if input or
            // output buffer are exhausted.
            if self.state == in_state {
                if output_info.can_take_byte() {
                    return (PollResult::Empty, output_info.len());
                } else {
                    return (PollResult::More, output_info.len());
                }
            }
        }
    }

    /// Finish the uncompress stream.
    ///
    /// `Done` once every sunk byte has been read and no back-reference is
    /// half copied. Bits left over in the last byte are the encoder's zero
    /// padding (or a truncated token) and produce nothing, so they never
    /// hold the stream open.
    pub fn finish(&self) -> FinishResult {
        if self.input.size == 0 && self.state != HSDstate::YieldBackref {
            FinishResult::Done
        } else {
            FinishResult::More
        }
    }

    fn st_tag_bit(&mut self) -> HSDstate {
        match self.get_bits(1) {
            None => HSDstate::TagBit,
            Some(0) => {
                self.output_index = 0;
                if self.config.window_bits() > 8 {
                    HSDstate::BackrefIndexMsb
                } else {
                    HSDstate::BackrefIndexLsb
                }
            }
            Some(_) => HSDstate::YieldLiteral,
        }
    }

    fn st_yield_literal(&mut self, output_info: &mut OutputCursor) -> HSDstate {
        // Only read the byte once it has somewhere to go.
        if output_info.can_take_byte() {
            match self.get_bits(8) {
                None => HSDstate::YieldLiteral, // input_buffer is consumed
                Some(x) => {
                    let c: u8 = (x & 0xff) as u8;
                    self.push_window_byte(c);
                    output_info.push_byte(c);
                    HSDstate::TagBit
                }
            }
        } else {
            HSDstate::YieldLiteral
        }
    }

    fn st_backref_index_msb(&mut self) -> HSDstate {
        let bit_ct = self.config.window_bits() - 8;
        match self.get_bits(bit_ct) {
            None => HSDstate::BackrefIndexMsb,
            Some(x) => {
                self.output_index = x << 8;
                HSDstate::BackrefIndexLsb
            }
        }
    }

    fn st_backref_index_lsb(&mut self) -> HSDstate {
        let bit_ct = self.config.window_bits().min(8);
        match self.get_bits(bit_ct) {
            None => HSDstate::BackrefIndexLsb,
            Some(x) => {
                self.output_index |= x;
                self.output_index += 1;
                self.output_count = 0;
                if self.config.lookahead_bits() > 8 {
                    HSDstate::BackrefCountMsb
                } else {
                    HSDstate::BackrefCountLsb
                }
            }
        }
    }

    fn st_backref_count_msb(&mut self) -> HSDstate {
        let bit_ct = self.config.lookahead_bits() - 8;
        match self.get_bits(bit_ct) {
            None => HSDstate::BackrefCountMsb,
            Some(x) => {
                self.output_count = x << 8;
                HSDstate::BackrefCountLsb
            }
        }
    }

    fn st_backref_count_lsb(&mut self) -> HSDstate {
        let bit_ct = self.config.lookahead_bits().min(8);
        match self.get_bits(bit_ct) {
            None => HSDstate::BackrefCountLsb,
            Some(x) => {
                self.output_count |= x;
                self.output_count += MATCH_LENGTH_BIAS;
                HSDstate::YieldBackref
            }
        }
    }

    fn st_yield_backref(&mut self, output_info: &mut OutputCursor) -> HSDstate {
        // Emit a repeated section from the window buffer, and add it (again)
        // to the window buffer. (Note that the repetition can include itself)
        if output_info.can_take_byte() {
            let count = usize::from(self.output_count).min(output_info.remaining_free_size());
            let mask = self.mask();

            for _ in 0..count {
                let src = usize::from(self.head_index.wrapping_sub(self.output_index)) & mask;
                let c = self.output_buffer.as_ref()[src];
                self.push_window_byte(c);
                output_info.push_byte(c);
            }

            self.output_count -= count as u16;

            if self.output_count == 0 {
                return HSDstate::TagBit;
            }
        }
        HSDstate::YieldBackref
    }

    fn push_window_byte(&mut self, c: u8) {
        let mask = self.mask();
        self.output_buffer.as_mut()[usize::from(self.head_index) & mask] = c;
        self.head_index = self.head_index.wrapping_add(1);
    }

    fn mask(&self) -> usize {
        self.config.window_size() - 1
    }

    /// Get the next COUNT bits from the input buffer. Returns None on end of
    /// input; the bits already read are kept for the next attempt.
    fn get_bits(&mut self, count: u8) -> Option<u16> {
        self.reader.pull_bits(count, &mut self.input)
    }
}

#[cfg(test)]
mod test {
    use super::{decode, HeatshrinkDecoder, StaticDecoder};
    use crate::{encoder, Config, ConfigError, FinishResult, HSError, PollResult, SinkResult};

    type Dec87 = HeatshrinkDecoder<[u8; 8], [u8; 256]>;

    fn drain<I, W>(dec: &mut HeatshrinkDecoder<I, W>, out: &mut [u8], total: &mut usize)
    where
        I: AsRef<[u8]> + AsMut<[u8]>,
        W: AsRef<[u8]> + AsMut<[u8]>,
    {
        loop {
            let (res, n) = dec.poll(&mut out[*total..]);
            *total += n;
            match res {
                PollResult::Empty => return,
                PollResult::More => continue,
                PollResult::Misuse => panic!("poll misuse"),
            }
        }
    }

    #[test]
    fn literal_vector() {
        let mut dec = Dec87::new(Config::new(8, 7).unwrap()).unwrap();
        let mut out = [0u8; 16];
        let mut total = 0;
        assert_eq!(
            dec.sink(&[0x80, 0x40, 0x60, 0x50, 0x38, 0x20]),
            (SinkResult::Accepted, 6)
        );
        drain(&mut dec, &mut out, &mut total);
        assert_eq!(dec.finish(), FinishResult::Done);
        assert_eq!(&out[..total], &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn overlapping_backref_is_copied_byte_by_byte() {
        let mut dec = Dec87::new(Config::new(8, 7).unwrap()).unwrap();
        let mut out = [0u8; 16];
        let mut total = 0;
        dec.sink(&[0xb0, 0x80, 0x01, 0x80]);
        drain(&mut dec, &mut out, &mut total);
        assert_eq!(dec.finish(), FinishResult::Done);
        assert_eq!(&out[..total], b"aaaaa");
    }

    #[test]
    fn sink_reports_full() {
        let mut dec = Dec87::new(Config::new(8, 4).unwrap()).unwrap();
        assert_eq!(dec.sink(&[0u8; 20]), (SinkResult::Accepted, 8));
        assert_eq!(dec.sink(&[0u8; 20]), (SinkResult::Full, 0));
        assert_eq!(dec.finish(), FinishResult::More);
    }

    #[test]
    fn construction_is_validated() {
        let cfg = Config::new(8, 4).unwrap();
        assert_eq!(
            HeatshrinkDecoder::<[u8; 0], [u8; 256]>::new(cfg).err(),
            Some(ConfigError::InputBufferSize)
        );
        assert_eq!(
            HeatshrinkDecoder::<[u8; 4], [u8; 128]>::new(cfg).err(),
            Some(ConfigError::BufferSize {
                expected: 256,
                actual: 128
            })
        );
    }

    #[test]
    fn default_decoder_uses_default_parameters() {
        let dec: StaticDecoder = Default::default();
        assert_eq!(dec.config(), Config::default());
        assert_eq!(dec.finish(), FinishResult::Done);

        let dec = Dec87::new(Config::new(8, 7).unwrap()).unwrap();
        assert_eq!(dec.config().window_size(), 256);
        assert_eq!(dec.config().lookahead_bits(), 7);
    }

    #[cfg(feature = "alloc")]
    #[test]
    fn alloc_validates_parameters() {
        use super::DynamicDecoder;

        assert_eq!(
            DynamicDecoder::alloc(0, 8, 4).err(),
            Some(ConfigError::InputBufferSize)
        );
        assert_eq!(
            DynamicDecoder::alloc(16, 16, 4).err(),
            Some(ConfigError::WindowBits(16))
        );
        assert_eq!(
            DynamicDecoder::alloc(16, 8, 8).err(),
            Some(ConfigError::LookaheadBits(8))
        );

        let dec = DynamicDecoder::alloc(1, 12, 6).unwrap();
        assert_eq!(dec.config(), Config::new(12, 6).unwrap());
    }

    #[test]
    fn empty_poll_buffer_is_misuse_and_harmless() {
        let mut dec: StaticDecoder = Default::default();
        dec.sink(&[0xb0, 0x80]);
        assert_eq!(dec.poll(&mut []), (PollResult::Misuse, 0));
        let mut out = [0u8; 4];
        let (res, n) = dec.poll(&mut out);
        assert_eq!((res, n), (PollResult::Empty, 1));
        assert_eq!(out[0], b'a');
    }

    #[test]
    fn backref_split_across_every_sink_boundary() {
        let src = b"abcdefgh-abcdefgh-abcdefgh-abcdefgh";
        let mut compressed = [0u8; 64];
        let compressed = encoder::encode(src, &mut compressed).unwrap();

        for split in 0..=compressed.len() {
            let mut dec: StaticDecoder = Default::default();
            let mut out = [0u8; 64];
            let mut total = 0;
            for part in [&compressed[..split], &compressed[split..]] {
                let mut sunk = 0;
                while sunk < part.len() {
                    let (_, n) = dec.sink(&part[sunk..]);
                    sunk += n;
                    drain(&mut dec, &mut out, &mut total);
                }
            }
            assert_eq!(dec.finish(), FinishResult::Done);
            assert_eq!(&out[..total], &src[..], "split at {}", split);
        }
    }

    #[test]
    fn finish_is_done_for_any_trailing_byte() {
        // Regression: finish must never report More while poll yields nothing.
        let mut compressed = [0u8; 64];
        let prefix = encoder::encode(b"trailing byte test", &mut compressed).unwrap();

        for last in 0..=255u8 {
            let mut dec: StaticDecoder = Default::default();
            let mut out = [0u8; 256];
            let mut total = 0;
            for byte in prefix.iter().chain(core::iter::once(&last)) {
                assert_eq!(dec.sink(&[*byte]).0, SinkResult::Accepted);
                drain(&mut dec, &mut out, &mut total);
            }
            assert_eq!(dec.finish(), FinishResult::Done, "trailing {:#04x}", last);
            let (_, n) = dec.poll(&mut out[total..]);
            assert_eq!(n, 0);
        }

        for pattern in 0..=255u8 {
            let cfg = Config::new(4, 3).unwrap();
            let mut dec = HeatshrinkDecoder::<[u8; 2], [u8; 16]>::new(cfg).unwrap();
            let mut out = [0u8; 64];
            let mut total = 0;
            dec.sink(&[pattern]);
            drain(&mut dec, &mut out, &mut total);
            assert_eq!(dec.finish(), FinishResult::Done, "pattern {:#04x}", pattern);
        }
    }

    #[test]
    fn one_byte_output_buffer() {
        let src = b"xxxxxxxxxxxxxxxxxxxxxxxxyyyyyyyyyyyyyyyyyyyyyyyyxxxxxxxxxxxx";
        let mut compressed = [0u8; 64];
        let compressed = encoder::encode(src, &mut compressed).unwrap();

        let mut dec: StaticDecoder = Default::default();
        let mut out = [0u8; 128];
        let mut total = 0;
        let mut sunk = 0;
        let mut polls = 0;
        while sunk < compressed.len() || dec.finish() == FinishResult::More {
            if sunk < compressed.len() {
                sunk += dec.sink(&compressed[sunk..sunk + 1]).1;
            }
            let (_, n) = dec.poll(&mut out[total..total + 1]);
            total += n;
            polls += 1;
            assert!(polls < 10_000);
        }
        assert_eq!(&out[..total], &src[..]);
    }

    #[test]
    fn history_before_stream_start_reads_as_zero() {
        // backref distance 3, length 2, with nothing decoded yet
        let mut dec = Dec87::new(Config::new(8, 4).unwrap()).unwrap();
        let mut out = [0xffu8; 8];
        let mut total = 0;
        // 0 | 00000010 | 0001 | pad
        dec.sink(&[0b0000_0001, 0b0000_1000]);
        drain(&mut dec, &mut out, &mut total);
        assert_eq!(&out[..total], &[0, 0]);
    }

    #[test]
    fn reset_restores_fresh_state() {
        let mut dec: StaticDecoder = Default::default();
        dec.sink(&[0xb0, 0x80, 0x01]);
        dec.reset();
        assert_eq!(dec.finish(), FinishResult::Done);
        let mut dst = [0u8; 8];
        let mut total = 0;
        dec.sink(&[0xb0, 0x80]);
        drain(&mut dec, &mut dst, &mut total);
        assert_eq!(&dst[..total], b"a");
    }

    #[test]
    fn output_full_is_reported() {
        let mut compressed = [0u8; 64];
        let compressed = encoder::encode(b"0123456789", &mut compressed).unwrap();
        let mut small = [0u8; 9];
        assert_eq!(decode(compressed, &mut small), Err(HSError::OutputFull));
        let mut exact = [0u8; 10];
        assert_eq!(decode(compressed, &mut exact).unwrap(), b"0123456789");
    }
}
