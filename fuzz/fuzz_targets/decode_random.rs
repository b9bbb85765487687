//! Feeds arbitrary bytes to the decoder. Corrupt streams may decode to
//! garbage but must never panic, stall, or expand without bound.

#![no_main]

use arbitrary::Arbitrary;
use heatshrink::{DynamicDecoder, FinishResult, PollResult};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct RandomStream {
    window_bits: u8,
    lookahead_bits: u8,
    input_buffer_size: u8,
    data: Vec<u8>,
}

fuzz_target!(|input: RandomStream| {
    let window_bits = 4 + input.window_bits % 12;
    let lookahead_bits = 3 + input.lookahead_bits % (window_bits - 3);
    let mut dec = DynamicDecoder::alloc(
        usize::from(input.input_buffer_size).max(1),
        window_bits,
        lookahead_bits,
    )
    .unwrap();

    // Each bit expands into at most one lookahead's worth of bytes
    let bound = (input.data.len() * 8 + 1) << lookahead_bits;
    let mut buf = [0u8; 97];
    let mut produced = 0usize;
    let mut pos = 0;

    loop {
        if pos < input.data.len() {
            let (_, n) = dec.sink(&input.data[pos..]);
            pos += n;
        }
        let (res, n) = dec.poll(&mut buf);
        produced += n;
        assert!(produced <= bound);
        match res {
            PollResult::More => {}
            PollResult::Empty if pos == input.data.len() => break,
            PollResult::Empty => {}
            PollResult::Misuse => panic!("decoder poll misuse"),
        }
    }

    assert_eq!(dec.finish(), FinishResult::Done);
});
