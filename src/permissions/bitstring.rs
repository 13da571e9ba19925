//! Packed permission bitstrings.
//!
//! A snapshot is stored as text, one line per forum id (line 0 is the
//! global scope, missing forums are blank lines). Each line is a sequence
//! of 31-bit chunks; the first bit of a chunk is its most significant one.
//! A chunk is written as its value in lowercase base 36, left-padded with
//! `0` to six characters. Trailing blank lines are dropped.
//!
//! ```text
//! global a_foo=1 a_bar=0  ->  bits 10000..0 (31) -> 2^30 -> "hra0hs"
//! ```

use std::collections::{BTreeMap, HashMap};

use super::options::{AclOptions, CHUNK_BITS, Namespace, Scope};
use super::{ForumSettings, RawAcl};
use crate::database::ForumId;

/// Characters per encoded chunk.
pub const CHUNK_CHARS: usize = 6;

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Fixed-width bit vector for one scope line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ForumBits {
    chunks: Vec<u32>,
    /// Decoded width in bits. Equal to `chunks.len() * 31` unless the
    /// source contained a chunk wider than 31 bits.
    len: usize,
}

impl ForumBits {
    /// All-clear vector large enough for `bits` options.
    pub fn zeroed(bits: usize) -> Self {
        let chunks = bits.div_ceil(CHUNK_BITS);
        Self {
            chunks: vec![0; chunks],
            len: chunks * CHUNK_BITS,
        }
    }

    #[inline]
    fn locate(bit: usize) -> (usize, u32) {
        (bit / CHUNK_BITS, 1 << (CHUNK_BITS - 1 - bit % CHUNK_BITS))
    }

    /// Read a bit; bits past the end read as clear.
    pub fn get(&self, bit: usize) -> bool {
        let (chunk, mask) = Self::locate(bit);
        self.chunks.get(chunk).is_some_and(|c| c & mask != 0)
    }

    pub fn set(&mut self, bit: usize, value: bool) {
        let (chunk, mask) = Self::locate(bit);
        if let Some(c) = self.chunks.get_mut(chunk) {
            if value {
                *c |= mask;
            } else {
                *c &= !mask;
            }
        }
    }

    /// Width in bits as decoded.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Indices of set bits.
    pub fn ones(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.chunks.len() * CHUNK_BITS).filter(|&bit| self.get(bit))
    }

    /// Build the line for one forum.
    ///
    /// Options are written in bit order, each one overwriting its own bit.
    /// A YES option also sets its flag bit, so a flag ordered before its
    /// children ends up set while one ordered after them keeps its own value.
    pub fn from_settings(settings: &ForumSettings, namespace: &Namespace) -> Self {
        let mut bits = Self::zeroed(namespace.len());

        for (bit, id) in namespace.options().iter().enumerate() {
            let yes = settings.get(id).is_some_and(|s| s.is_yes());
            bits.set(bit, yes);
            if yes && let Some(parent) = namespace.parent(bit) {
                bits.set(parent, true);
            }
        }

        bits
    }

    /// Append the base-36 form of this line.
    pub fn write_to(&self, out: &mut String) {
        for &chunk in &self.chunks {
            write_chunk(chunk, out);
        }
    }

    /// Parse one non-empty line, reusing conversions already seen.
    fn parse<'a>(line: &'a str, memo: &mut HashMap<&'a str, (u32, usize)>) -> Self {
        let mut bits = Self::default();
        let mut rest = line;

        while !rest.is_empty() {
            let cut = rest
                .char_indices()
                .nth(CHUNK_CHARS)
                .map_or(rest.len(), |(pos, _)| pos);
            let (group, tail) = rest.split_at(cut);
            rest = tail;

            let (value, width) = *memo.entry(group).or_insert_with(|| read_chunk(group));
            bits.chunks.push(value);
            bits.len += width;
        }

        bits
    }
}

fn write_chunk(value: u32, out: &mut String) {
    let mut buf = [b'0'; CHUNK_CHARS];
    let mut rest = value;
    let mut pos = CHUNK_CHARS;

    while rest > 0 && pos > 0 {
        pos -= 1;
        buf[pos] = DIGITS[(rest % 36) as usize];
        rest /= 36;
    }

    out.extend(buf.iter().map(|&b| char::from(b)));
}

/// Convert a base-36 group to its value and binary width (at least 31).
/// Characters outside the base-36 alphabet are skipped.
fn read_chunk(group: &str) -> (u32, usize) {
    let value = group
        .chars()
        .filter_map(|c| c.to_digit(36))
        .fold(0u64, |acc, d| acc * 36 + u64::from(d));

    let width = (u64::BITS - value.leading_zeros()) as usize;
    let mask = (1u64 << CHUNK_BITS) - 1;
    ((value & mask) as u32, width.max(CHUNK_BITS))
}

/// Encode aggregated settings into the stored text form.
pub fn encode(raw: &RawAcl, options: &AclOptions) -> String {
    let mut out = String::new();
    let mut last: ForumId = 0;

    for (&forum_id, settings) in raw {
        let namespace = options.namespace(Scope::for_forum(forum_id));

        for _ in last..forum_id {
            out.push('\n');
        }
        ForumBits::from_settings(settings, namespace).write_to(&mut out);
        last = forum_id;
    }

    out.truncate(out.trim_end().len());
    out
}

/// Decoded per-user snapshot: forum id -> bit vector. Blank lines are absent.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AclSnapshot {
    lines: BTreeMap<ForumId, ForumBits>,
}

impl AclSnapshot {
    pub fn decode(encoded: &str) -> Self {
        let mut memo = HashMap::new();
        let mut lines = BTreeMap::new();

        for (idx, line) in encoded.split('\n').enumerate() {
            if line.is_empty() {
                continue;
            }
            let Ok(forum_id) = ForumId::try_from(idx) else {
                break;
            };
            lines.insert(forum_id, ForumBits::parse(line, &mut memo));
        }

        Self { lines }
    }

    /// Re-encode the decoded lines.
    pub fn encode(&self) -> String {
        let mut out = String::new();
        let mut last: ForumId = 0;

        for (&forum_id, bits) in &self.lines {
            for _ in last..forum_id {
                out.push('\n');
            }
            bits.write_to(&mut out);
            last = forum_id;
        }

        out
    }

    pub fn line(&self, forum_id: ForumId) -> Option<&ForumBits> {
        self.lines.get(&forum_id)
    }

    /// Bit of a line, or `None` when the line is absent.
    pub fn bit(&self, forum_id: ForumId, bit: usize) -> Option<bool> {
        self.lines.get(&forum_id).map(|line| line.get(bit))
    }

    /// Every forum id with a line, global (0) included.
    pub fn forum_ids(&self) -> impl Iterator<Item = ForumId> + '_ {
        self.lines.keys().copied()
    }

    /// Forum lines only, global excluded.
    pub fn local_forum_ids(&self) -> impl Iterator<Item = ForumId> + '_ {
        self.forum_ids().filter(|&f| f != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Whether every line has the width the current registry expects.
    pub fn matches_layout(&self, options: &AclOptions) -> bool {
        let global = options.global().padded_len();
        let local = options.local().padded_len();

        self.lines.iter().all(|(&forum_id, bits)| {
            let expected = if forum_id == 0 { global } else { local };
            bits.len() == expected
        })
    }

    /// Names of the options whose bit is set, per forum.
    pub fn granted<'a>(&self, options: &'a AclOptions) -> BTreeMap<ForumId, Vec<&'a str>> {
        let mut names: HashMap<_, &'a str> = HashMap::new();
        for (name, id) in options.iter() {
            names.insert(id, name);
        }

        self.lines
            .iter()
            .map(|(&forum_id, bits)| {
                let namespace = options.namespace(Scope::for_forum(forum_id));
                let granted = bits
                    .ones()
                    .filter_map(|bit| namespace.options().get(bit))
                    .filter_map(|id| names.get(id).copied())
                    .collect();
                (forum_id, granted)
            })
            .collect()
    }
}
