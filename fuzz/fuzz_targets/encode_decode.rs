//! Round trips arbitrary data through the encoder and decoder, feeding
//! both with fuzzer chosen chunk sizes.

#![no_main]

use arbitrary::Arbitrary;
use heatshrink::{
    DynamicDecoder, DynamicEncoder, FinishResult, HeatshrinkEncoder, LinearScan, PollResult,
    SinkResult,
};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct RoundTrip {
    window_bits: u8,
    lookahead_bits: u8,
    /// Bytes per sink call
    sink_chunk: u8,
    /// Output buffer size per poll call
    poll_chunk: u8,
    linear_scan: bool,
    data: Vec<u8>,
}

fn drain_encoder<B, F>(enc: &mut HeatshrinkEncoder<B, F>, chunk: usize, out: &mut Vec<u8>)
where
    B: AsRef<[u8]> + AsMut<[u8]>,
    F: heatshrink::MatchFinder,
{
    let mut buf = vec![0u8; chunk];
    loop {
        let (res, n) = enc.poll(&mut buf);
        out.extend_from_slice(&buf[..n]);
        match res {
            PollResult::More => {}
            PollResult::Empty => return,
            PollResult::Misuse => panic!("encoder poll misuse"),
        }
    }
}

fn compress<B, F>(mut enc: HeatshrinkEncoder<B, F>, input: &RoundTrip) -> Vec<u8>
where
    B: AsRef<[u8]> + AsMut<[u8]>,
    F: heatshrink::MatchFinder,
{
    let sink_chunk = usize::from(input.sink_chunk).max(1);
    let poll_chunk = usize::from(input.poll_chunk).max(1);
    let mut compressed = Vec::new();

    for chunk in input.data.chunks(sink_chunk) {
        let mut sunk = 0;
        while sunk < chunk.len() {
            match enc.sink(&chunk[sunk..]) {
                (SinkResult::Accepted, n) => sunk += n,
                (res, _) => panic!("encoder sink returned {:?}", res),
            }
            drain_encoder(&mut enc, poll_chunk, &mut compressed);
        }
    }
    while enc.finish() == FinishResult::More {
        drain_encoder(&mut enc, poll_chunk, &mut compressed);
    }
    compressed
}

fuzz_target!(|input: RoundTrip| {
    // Limit input size to keep the linear scan fast
    if input.data.len() > 64 * 1024 {
        return;
    }

    let window_bits = 4 + input.window_bits % 12;
    let lookahead_bits = 3 + input.lookahead_bits % (window_bits - 3);

    let compressed = if input.linear_scan {
        let enc = HeatshrinkEncoder::<Vec<u8>, LinearScan>::alloc(window_bits, lookahead_bits)
            .unwrap();
        compress(enc, &input)
    } else {
        let enc = DynamicEncoder::alloc(window_bits, lookahead_bits).unwrap();
        compress(enc, &input)
    };

    // Every literal costs 9 bits, so nothing can grow more than that
    assert!(compressed.len() <= (input.data.len() * 9 + 7) / 8);

    let poll_chunk = usize::from(input.poll_chunk).max(1);
    let mut dec = DynamicDecoder::alloc(
        usize::from(input.sink_chunk).max(1),
        window_bits,
        lookahead_bits,
    )
    .unwrap();
    let mut buf = vec![0u8; poll_chunk];
    let mut plain = Vec::with_capacity(input.data.len());
    let mut pos = 0;

    loop {
        if pos < compressed.len() {
            let (_, n) = dec.sink(&compressed[pos..]);
            pos += n;
        }
        let (res, n) = dec.poll(&mut buf);
        plain.extend_from_slice(&buf[..n]);
        assert_ne!(res, PollResult::Misuse);
        if res == PollResult::Empty && pos == compressed.len() {
            break;
        }
    }

    assert_eq!(dec.finish(), FinishResult::Done);
    assert_eq!(plain, input.data, "round trip mismatch");
});
