//! Internal Key Format
//!
//! Every stored entry is addressed by an internal key: the user key followed
//! by an 8-byte trailer packing the sequence number and the value kind.
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────────┐
//! │ user key (n bytes)   │ (sequence << 8 | kind) as u64 BE │
//! └──────────────────────┴──────────────────────────────────┘
//! ```
//!
//! Ordering: user key ascending, then sequence descending, so the newest
//! version of a key is met first during a forward scan.

use std::cmp::Ordering;

/// Monotonic write sequence number
pub type SequenceNumber = u64;

/// Largest sequence number that fits in the trailer
pub const MAX_SEQUENCE_NUMBER: SequenceNumber = (1 << 56) - 1;

/// Size of the trailer appended to every user key
pub const TRAILER_SIZE: usize = 8;

/// Kind of an internal entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ValueKind {
    /// A tombstone
    Deletion = 0,

    /// A live value
    Value = 1,
}

impl ValueKind {
    pub fn from_u8(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(ValueKind::Deletion),
            1 => Some(ValueKind::Value),
            _ => None,
        }
    }
}

/// Kind used when building lookup keys: sorts before every entry with an
/// equal sequence number
pub const KIND_FOR_SEEK: ValueKind = ValueKind::Value;

fn pack_trailer(sequence: SequenceNumber, kind: ValueKind) -> u64 {
    (sequence << 8) | kind as u64
}

/// Build an encoded internal key
pub fn encode_internal_key(user_key: &[u8], sequence: SequenceNumber, kind: ValueKind) -> Vec<u8> {
    let mut buf = Vec::with_capacity(user_key.len() + TRAILER_SIZE);
    buf.extend_from_slice(user_key);
    buf.extend_from_slice(&pack_trailer(sequence, kind).to_be_bytes());
    buf
}

/// Lookup key that positions a seek at the newest entry for `user_key`
/// visible at `snapshot`
pub fn lookup_key(user_key: &[u8], snapshot: SequenceNumber) -> Vec<u8> {
    encode_internal_key(user_key, snapshot, KIND_FOR_SEEK)
}

/// Borrowed view of a decoded internal key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedKey<'a> {
    pub user_key: &'a [u8],
    pub sequence: SequenceNumber,
    pub kind: ValueKind,
}

/// Split an encoded internal key into its parts
pub fn parse_internal_key(key: &[u8]) -> Option<ParsedKey<'_>> {
    if key.len() < TRAILER_SIZE {
        return None;
    }
    let split = key.len() - TRAILER_SIZE;
    let trailer = u64::from_be_bytes(key[split..].try_into().ok()?);
    let kind = ValueKind::from_u8((trailer & 0xff) as u8)?;
    Some(ParsedKey {
        user_key: &key[..split],
        sequence: trailer >> 8,
        kind,
    })
}

/// User-key portion of an encoded internal key
///
/// Keys shorter than the trailer are returned whole; they never come out of
/// a well-formed table.
pub fn user_key(key: &[u8]) -> &[u8] {
    if key.len() < TRAILER_SIZE {
        return key;
    }
    &key[..key.len() - TRAILER_SIZE]
}

fn trailer(key: &[u8]) -> u64 {
    if key.len() < TRAILER_SIZE {
        return 0;
    }
    let mut raw = [0u8; TRAILER_SIZE];
    raw.copy_from_slice(&key[key.len() - TRAILER_SIZE..]);
    u64::from_be_bytes(raw)
}

/// Total order over encoded internal keys
pub fn compare_internal(a: &[u8], b: &[u8]) -> Ordering {
    match user_key(a).cmp(user_key(b)) {
        // Higher trailer (newer sequence) sorts first
        Ordering::Equal => trailer(b).cmp(&trailer(a)),
        other => other,
    }
}

/// Owned internal key with the internal ordering, used as the memtable key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalKey(Vec<u8>);

impl InternalKey {
    pub fn new(user_key: &[u8], sequence: SequenceNumber, kind: ValueKind) -> Self {
        Self(encode_internal_key(user_key, sequence, kind))
    }

    pub fn from_encoded(encoded: Vec<u8>) -> Self {
        Self(encoded)
    }

    pub fn encoded(&self) -> &[u8] {
        &self.0
    }

    pub fn user_key(&self) -> &[u8] {
        user_key(&self.0)
    }

    pub fn parsed(&self) -> Option<ParsedKey<'_>> {
        parse_internal_key(&self.0)
    }
}

impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_internal(&self.0, &other.0)
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Outcome of a point lookup that found an entry for the key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupResult {
    /// A live value
    Value(Vec<u8>),

    /// A tombstone (deleted key)
    Tombstone,
}

impl LookupResult {
    /// Interpret the value stored under an internal key
    pub fn from_entry(internal_key: &[u8], value: &[u8]) -> Option<Self> {
        let parsed = parse_internal_key(internal_key)?;
        Some(match parsed.kind {
            ValueKind::Value => LookupResult::Value(value.to_vec()),
            ValueKind::Deletion => LookupResult::Tombstone,
        })
    }

    pub fn into_value(self) -> Option<Vec<u8>> {
        match self {
            LookupResult::Value(value) => Some(value),
            LookupResult::Tombstone => None,
        }
    }
}

/// Render a key for diagnostics, escaping non-printable bytes
pub fn display_key(key: &[u8]) -> String {
    let mut out = String::with_capacity(key.len());
    for &b in key {
        if b.is_ascii_graphic() || b == b' ' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{:02x}", b));
        }
    }
    out
}
