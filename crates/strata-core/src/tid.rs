//! Temporal identifiers.
//!
//! A `TemporalId` is 16 bytes: a big-endian time prefix (seconds since the
//! Unix epoch, then a sub-second counter) followed by a random tail.
//! Lexicographic byte order equals temporal order, so the id doubles as the
//! primary key and the version axis of every stored record.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{CoreError, InvalidTid};

/// 16-byte time-prefixed identifier.
///
/// Bytes `[0..4]`: big-endian seconds since the Unix epoch.
/// Bytes `[4..8]`: big-endian sub-second counter (nanosecond-derived).
/// Bytes `[8..16]`: random tail.
///
/// The all-zero value is [`TemporalId::EMPTY`] and compares less than any
/// generated value.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TemporalId([u8; 16]);

impl TemporalId {
    /// The all-zero identifier, used as the root dataset id and as the
    /// "unsaved" sentinel on records.
    pub const EMPTY: TemporalId = TemporalId([0; 16]);

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CoreError> {
        let arr: [u8; 16] = bytes
            .try_into()
            .map_err(|_| InvalidTid::ByteLength { len: bytes.len() })?;
        Ok(Self(arr))
    }

    /// Identifier for a point in time: time prefix set, tail bytes zero.
    ///
    /// Sorts at or before every id generated at the same instant, which makes
    /// it the natural form for cutoff values.
    pub fn from_timestamp(at: OffsetDateTime) -> Self {
        let mut bytes = [0u8; 16];
        let seconds = at.unix_timestamp().max(0) as u32;
        bytes[0..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..8].copy_from_slice(&at.nanosecond().to_be_bytes());
        Self(bytes)
    }

    pub fn to_bytes(self) -> [u8; 16] {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self == Self::EMPTY
    }

    /// The time prefix, truncated to the resolution the id carries.
    pub fn timestamp(self) -> OffsetDateTime {
        let seconds = u32::from_be_bytes(self.0[0..4].try_into().expect("4 bytes"));
        let nanos = u32::from_be_bytes(self.0[4..8].try_into().expect("4 bytes"));
        OffsetDateTime::from_unix_timestamp(i64::from(seconds)).unwrap_or(OffsetDateTime::UNIX_EPOCH)
            + time::Duration::nanoseconds(i64::from(nanos))
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if s.len() != 32 {
            return Err(InvalidTid::Length {
                raw: s.to_string(),
                len: s.len(),
            }
            .into());
        }
        let bytes = hex::decode(s).map_err(|_| InvalidTid::Hex { raw: s.to_string() })?;
        Self::from_slice(&bytes)
    }
}

impl fmt::Display for TemporalId {
    /// 32 lowercase hex chars: the two 8-byte halves concatenated.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TemporalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TemporalId({})", self)
    }
}

impl FromStr for TemporalId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TemporalId {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<TemporalId> for String {
    fn from(id: TemporalId) -> String {
        id.to_string()
    }
}

impl Default for TemporalId {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Strictly monotonic id source.
///
/// Every id returned by one generator instance is strictly greater than the
/// previous one. Cross-process ordering holds only to one-second resolution
/// (the random tail breaks ties between processes probabilistically).
#[derive(Debug, Default)]
pub struct TidGenerator {
    prev: TemporalId,
}

impl TidGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last id handed out, [`TemporalId::EMPTY`] before the first call.
    pub fn prev(&self) -> TemporalId {
        self.prev
    }

    pub fn next_id(&mut self) -> TemporalId {
        let mut retried = false;
        loop {
            let candidate = Self::candidate();
            if candidate > self.prev {
                self.prev = candidate;
                return candidate;
            }
            if !retried {
                tracing::warn!(
                    candidate = %candidate,
                    prev = %self.prev,
                    "generated id did not exceed previous, regenerating"
                );
                retried = true;
            }
        }
    }

    fn candidate() -> TemporalId {
        let now = OffsetDateTime::now_utc();
        let mut bytes = [0u8; 16];
        bytes[0..4].copy_from_slice(&(now.unix_timestamp().max(0) as u32).to_be_bytes());
        bytes[4..8].copy_from_slice(&now.nanosecond().to_be_bytes());
        let tail: [u8; 8] = rand::thread_rng().gen();
        bytes[8..16].copy_from_slice(&tail);
        TemporalId::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_sorts_below_generated() {
        let mut generator = TidGenerator::new();
        let id = generator.next_id();
        assert!(TemporalId::EMPTY < id);
        assert!(!id.is_empty());
        assert!(TemporalId::EMPTY.is_empty());
    }

    #[test]
    fn generator_is_strictly_monotonic() {
        let mut generator = TidGenerator::new();
        let mut prev = TemporalId::EMPTY;
        for _ in 0..10_000 {
            let next = generator.next_id();
            assert!(next > prev);
            prev = next;
        }
    }

    #[test]
    fn string_form_round_trips() {
        let mut generator = TidGenerator::new();
        let id = generator.next_id();
        let text = id.to_string();
        assert_eq!(text.len(), 32);
        assert!(text.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(TemporalId::parse(&text).unwrap(), id);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(TemporalId::parse("abc").is_err());
        assert!(TemporalId::parse(&"g".repeat(32)).is_err());
        assert!(TemporalId::from_slice(&[0u8; 15]).is_err());
    }

    #[test]
    fn timestamp_prefix_orders_ids() {
        let early = TemporalId::from_timestamp(
            OffsetDateTime::from_unix_timestamp(1_600_000_000).unwrap(),
        );
        let late = TemporalId::from_timestamp(
            OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        );
        assert!(early < late);
        assert_eq!(early.timestamp().unix_timestamp(), 1_600_000_000);
        // Tail bytes of a timestamp id are zero.
        assert_eq!(&early.to_bytes()[8..], &[0u8; 8]);
    }

    #[test]
    fn byte_order_matches_text_order() {
        let a = TemporalId::from_bytes([0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 9]);
        let b = TemporalId::from_bytes([0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1]);
        assert!(a < b);
        assert!(a.to_string() < b.to_string());
    }
}
