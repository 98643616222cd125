//! Transcript fingerprinting.
//!
//! [`HashValue`] is the 64-bit fingerprint of a file's preprocessor-visible
//! contents, accumulated by a [`HashBuilder`] as the transcript streams
//! past. The hash is a fast non-cryptographic one (XXH64): the only
//! requirement is that a fixed event sequence produces a fixed value, so
//! that two translation units observing the same contents agree.
//!
//! A builder can optionally record its mix history (one row per mix with
//! the before/after state), which is the debugging tool for tracking down
//! non-deterministic hashes.

use std::fmt;
use std::hash::Hasher as _;

use serde::{Deserialize, Serialize};
use twox_hash::XxHash64;

/// Fixed seed so fingerprints are stable across runs and machines.
const TRANSCRIPT_SEED: u64 = 0x5ca1_ab1e;

// ---------------------------------------------------------------------------
// HashValue
// ---------------------------------------------------------------------------

/// A 64-bit content fingerprint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HashValue(pub u64);

impl fmt::Display for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

// ---------------------------------------------------------------------------
// History recording
// ---------------------------------------------------------------------------

/// One recorded mix operation. Serialized to YAML when dumping the history
/// of a file whose hash is being debugged.
#[derive(Clone, Debug, Serialize)]
pub struct HistoryRow {
    /// Hash state before the mix.
    #[serde(rename = "before-hash")]
    pub before: String,
    /// The value that was mixed in.
    #[serde(rename = "mixed-value")]
    pub mixed_value: String,
    /// What kind of event caused the mix (e.g. "self path", "macro define").
    #[serde(rename = "mix-context")]
    pub context: String,
    /// Event-specific detail (a path, a macro name).
    #[serde(rename = "context-data")]
    pub context_data: String,
    /// Hash state after the mix.
    #[serde(rename = "after-hash")]
    pub after: String,
}

// ---------------------------------------------------------------------------
// HashBuilder
// ---------------------------------------------------------------------------

/// Streaming accumulator for a single file's transcript hash.
///
/// Order-dependent by construction: `mix_bytes(a); mix_bytes(b)` is not the
/// same as mixing `b` then `a`.
pub struct HashBuilder {
    state: XxHash64,
    history: Option<Vec<HistoryRow>>,
}

impl HashBuilder {
    /// Create a builder; `record_history` arms per-mix logging.
    #[must_use]
    pub fn new(record_history: bool) -> Self {
        Self {
            state: XxHash64::with_seed(TRANSCRIPT_SEED),
            history: record_history.then(Vec::new),
        }
    }

    /// Whether this builder records its mix history.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.history.is_some()
    }

    /// Mix raw bytes into the hash.
    pub fn mix_bytes(&mut self, bytes: &[u8]) {
        self.state.write(bytes);
    }

    /// Mix a 64-bit value (little-endian) into the hash.
    pub fn mix_u64(&mut self, value: u64) {
        self.state.write(&value.to_le_bytes());
    }

    /// Mix bytes, recording a history row when armed.
    pub fn mix_with_context(&mut self, bytes: &[u8], context: &str, context_data: &str) {
        let before = self.peek();
        self.mix_bytes(bytes);
        let after = self.peek();
        if let Some(history) = &mut self.history {
            history.push(HistoryRow {
                before: before.to_string(),
                mixed_value: String::from_utf8_lossy(bytes).into_owned(),
                context: context.to_owned(),
                context_data: context_data.to_owned(),
                after: after.to_string(),
            });
        }
    }

    /// Current hash state without consuming the builder.
    #[must_use]
    pub fn peek(&self) -> HashValue {
        HashValue(self.state.finish())
    }

    /// Finalize, yielding the hash and any recorded history.
    #[must_use]
    pub fn finish(self) -> (HashValue, Option<Vec<HistoryRow>>) {
        (HashValue(self.state.finish()), self.history)
    }
}

/// Hash a standalone byte string with the transcript seed. Used for
/// signature disambiguators and synthetic file-name hashes, so those values
/// agree across workers.
#[must_use]
pub fn fingerprint(bytes: &[u8]) -> HashValue {
    let mut h = XxHash64::with_seed(TRANSCRIPT_SEED);
    h.write(bytes);
    HashValue(h.finish())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_sequences_are_stable() {
        let mut a = HashBuilder::new(false);
        a.mix_bytes(b"one");
        a.mix_u64(2);
        let mut b = HashBuilder::new(false);
        b.mix_bytes(b"one");
        b.mix_u64(2);
        assert_eq!(a.finish().0, b.finish().0);
    }

    #[test]
    fn order_matters() {
        let mut a = HashBuilder::new(false);
        a.mix_bytes(b"one");
        a.mix_bytes(b"two");
        let mut b = HashBuilder::new(false);
        b.mix_bytes(b"two");
        b.mix_bytes(b"one");
        assert_ne!(a.finish().0, b.finish().0);
    }

    #[test]
    fn history_records_each_mix() {
        let mut b = HashBuilder::new(true);
        b.mix_with_context(b"x", "macro define", "X");
        b.mix_with_context(b"y", "macro define", "Y");
        let (_, history) = b.finish();
        let rows = history.expect("history was armed");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].context_data, "X");
        assert_ne!(rows[0].before, rows[0].after);
    }
}
