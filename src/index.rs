//! Longest-match search over the encoder buffer.
//!
//! The encoder keeps history and pending input in one buffer. A search for
//! the bytes starting at `end` considers every candidate position in
//! `start..end`; a candidate may run past `end` into the pending input,
//! which the decoder reproduces by copying byte by byte.

#[cfg(feature = "alloc")]
use alloc::{vec, vec::Vec};

/// A back-reference candidate
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Match {
    /// How far back the match starts (1 = previous byte)
    pub distance: u16,
    /// Number of matching bytes
    pub length: u16,
}

/// Strategy used by the encoder to locate back-references.
pub trait MatchFinder {
    /// Called once the buffer holds fresh input, `buf[start..end]` being
    /// the valid bytes.
    fn index(&mut self, buf: &[u8], start: usize, end: usize);

    /// Longest run in `buf[start..end]` equal to the bytes at `end`,
    /// no longer than `max_len`. Among equally long runs the closest one
    /// wins.
    fn find_longest_match(
        &self,
        buf: &[u8],
        start: usize,
        end: usize,
        max_len: usize,
    ) -> Option<Match>;

    /// Forget everything learned about previous input
    fn reset(&mut self) {}

    /// Whether this finder can serve an encoder buffer of `buf_len` bytes
    fn supports(&self, _buf_len: usize) -> bool {
        true
    }
}

/// Finders the encoder constructors can build on their own
pub trait SizedFinder: MatchFinder {
    /// A finder for an encoder buffer of `buf_len` bytes
    fn with_buffer_len(buf_len: usize) -> Self;
}

/// Number of leading bytes `candidate` and `needle` share, at most `max_len`
fn common_prefix(candidate: &[u8], needle: &[u8], max_len: usize) -> usize {
    candidate
        .iter()
        .zip(needle)
        .take(max_len)
        .take_while(|(a, b)| a == b)
        .count()
}

fn to_match(end: usize, pos: usize, len: usize) -> Option<Match> {
    if len == 0 {
        None
    } else {
        Some(Match {
            distance: (end - pos) as u16,
            length: len as u16,
        })
    }
}

/// Brute force backward scan, no extra memory.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct LinearScan;

impl MatchFinder for LinearScan {
    fn index(&mut self, _buf: &[u8], _start: usize, _end: usize) {}

    fn find_longest_match(
        &self,
        buf: &[u8],
        start: usize,
        end: usize,
        max_len: usize,
    ) -> Option<Match> {
        let needle = &buf[end..end + max_len];
        let mut match_maxlen: usize = 0;
        let mut match_index: usize = 0;

        for pos in (start..end).rev() {
            // Only check candidates that could beat the current best.
            if buf[pos + match_maxlen] != needle[match_maxlen] || buf[pos] != needle[0] {
                continue;
            }
            let len = common_prefix(&buf[pos..], needle, max_len);
            if len > match_maxlen {
                match_maxlen = len;
                match_index = pos;
                if len == max_len {
                    break;
                }
            }
        }

        to_match(end, match_index, match_maxlen)
    }
}

impl SizedFinder for LinearScan {
    fn with_buffer_len(_buf_len: usize) -> Self {
        LinearScan
    }
}

/// Per-position links to the previous occurrence of the same byte value.
///
/// For example, if `buf[200] == b'x'`, then `links[200]` is the closest
/// `i < 200` with `buf[i] == b'x'`, or `None`. Walking the chain visits
/// only candidates whose first byte already matches, for two bytes of RAM
/// (plus the `Option` tag) per buffer byte.
#[derive(Debug, Clone)]
pub struct ChainIndex<S> {
    links: S,
}

impl<S: AsRef<[Option<u16>]> + AsMut<[Option<u16>]>> ChainIndex<S> {
    /// Wrap caller provided link storage; it must be as long as the encoder buffer.
    pub fn with_storage(mut links: S) -> Self {
        links.as_mut().iter_mut().for_each(|m| *m = None);
        ChainIndex { links }
    }
}

impl<const N: usize> Default for ChainIndex<[Option<u16>; N]> {
    fn default() -> Self {
        ChainIndex { links: [None; N] }
    }
}

impl<S: AsRef<[Option<u16>]> + AsMut<[Option<u16>]>> MatchFinder for ChainIndex<S> {
    fn index(&mut self, buf: &[u8], start: usize, end: usize) {
        let links = self.links.as_mut();
        let mut last: [Option<u16>; 256] = [None; 256];

        links[..start].iter_mut().for_each(|m| *m = None);
        for (i, &byte) in buf.iter().enumerate().take(end).skip(start) {
            let v: usize = byte.into();
            links[i] = last[v];
            last[v] = Some(i as u16);
        }
    }

    fn find_longest_match(
        &self,
        buf: &[u8],
        start: usize,
        end: usize,
        max_len: usize,
    ) -> Option<Match> {
        let links = self.links.as_ref();
        let needle = &buf[end..end + max_len];
        let mut match_maxlen: usize = 0;
        let mut match_index: usize = 0;
        let mut next = links[end];

        while let Some(p) = next {
            let pos = usize::from(p);
            if pos < start {
                break;
            }
            next = links[pos];

            // The chain guarantees the first byte; skip candidates that
            // cannot beat the current best.
            if buf[pos + match_maxlen] != needle[match_maxlen] {
                continue;
            }
            let len = common_prefix(&buf[pos..], needle, max_len);
            if len > match_maxlen {
                match_maxlen = len;
                match_index = pos;
                if len == max_len {
                    break;
                }
            }
        }

        to_match(end, match_index, match_maxlen)
    }

    fn reset(&mut self) {
        self.links.as_mut().iter_mut().for_each(|m| *m = None);
    }

    fn supports(&self, buf_len: usize) -> bool {
        self.links.as_ref().len() >= buf_len && buf_len <= usize::from(u16::MAX) + 1
    }
}

impl<const N: usize> SizedFinder for ChainIndex<[Option<u16>; N]> {
    fn with_buffer_len(_buf_len: usize) -> Self {
        Self::default()
    }
}

#[cfg(feature = "alloc")]
impl SizedFinder for ChainIndex<Vec<Option<u16>>> {
    fn with_buffer_len(buf_len: usize) -> Self {
        ChainIndex {
            links: vec![None; buf_len],
        }
    }
}

#[cfg(test)]
mod test {
    use super::{ChainIndex, LinearScan, Match, MatchFinder};

    fn both(buf: &[u8], start: usize, end: usize, max_len: usize) -> Option<Match> {
        let linear = LinearScan.find_longest_match(buf, start, end, max_len);
        let mut chain: ChainIndex<[Option<u16>; 64]> = ChainIndex::default();
        chain.index(buf, start, buf.len());
        assert_eq!(chain.find_longest_match(buf, start, end, max_len), linear);
        linear
    }

    #[test]
    fn finds_longest_run() {
        let buf = b"abcXabcdYabcd...abcde";
        let end = 16;
        assert_eq!(
            both(buf, 0, end, 5),
            Some(Match {
                distance: 7,
                length: 4
            })
        );
    }

    #[test]
    fn prefers_the_closest_of_equal_matches() {
        let buf = b"xyz-xyz-xyz-xyz";
        assert_eq!(
            both(buf, 0, 12, 3),
            Some(Match {
                distance: 4,
                length: 3
            })
        );
    }

    #[test]
    fn respects_search_start() {
        let buf = b"qrs.......qrs";
        assert_eq!(both(buf, 1, 10, 3), None);
        assert_eq!(
            both(buf, 0, 10, 3),
            Some(Match {
                distance: 10,
                length: 3
            })
        );
    }

    #[test]
    fn overlapping_run() {
        let buf = b"aaaaa";
        assert_eq!(
            both(buf, 0, 1, 4),
            Some(Match {
                distance: 1,
                length: 4
            })
        );
    }

    #[test]
    fn chain_reset_clears_links() {
        let buf = b"abab";
        let mut chain: ChainIndex<[Option<u16>; 4]> = ChainIndex::default();
        chain.index(buf, 0, 4);
        assert!(chain.find_longest_match(buf, 0, 2, 2).is_some());
        chain.reset();
        assert_eq!(chain.find_longest_match(buf, 0, 2, 2), None);
        assert!(chain.supports(4));
        assert!(!chain.supports(5));
    }
}
