//! Append-only hash chain. Every record commits to its predecessor's hash and
//! to its own payload, and appending requires a proof-of-work search for a
//! hash with a fixed number of leading hex zeros.

pub mod chain;
pub mod constants;
pub mod error;
pub mod mine;
pub mod shared;

pub use chain::{Chain, Violation, ViolationKind};
pub use error::{ChainError, Result};
pub use mine::Strategy;
pub use pow::Difficulty;
pub use shared::SharedChain;

use constants::{AMOUNT_FIELD, FROM_FIELD, GENESIS_SENTINEL, TO_FIELD};
use serde::{ser::Error as _, Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A single payload value. Closed set so the canonical encoding is fixed.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Text(String),
    Number(f64),
    Bool(bool),
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Value::Text(text) => serializer.serialize_str(text),
            Value::Number(n) if n.is_finite() => serializer.serialize_f64(*n),
            Value::Number(n) => Err(S::Error::custom(format!("non-finite number {n}"))),
            Value::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(text) => f.write_str(text),
            Value::Number(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// Field name to value mapping. Keys are kept in byte order, which is what
/// makes the JSON encoding canonical.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, Value>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// `{from, to, amount}` payload used by [`Chain::append`].
    pub fn transfer(from: &str, to: &str, amount: f64) -> Self {
        let mut payload = Self::new();
        payload.insert(FROM_FIELD, from);
        payload.insert(TO_FIELD, to);
        payload.insert(AMOUNT_FIELD, amount);
        payload
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Compact JSON with sorted keys, e.g. `{"amount":5.0,"from":"Alice","to":"Bob"}`.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}: {value}")?;
        }
        f.write_str("}")
    }
}

/// Milliseconds since the Unix epoch. The decimal count is the form that
/// goes into the hash preimage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0);
        Self(millis)
    }

    pub const fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub const fn as_millis(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub mod pow {
    use crate::constants::MAX_DIFFICULTY;
    use crate::error::{ChainError, Result};
    use serde::Serialize;
    use std::fmt;

    /// Number of leading `'0'` hex characters a mined hash must carry.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
    #[serde(transparent)]
    pub struct Difficulty(u32);

    impl Difficulty {
        pub const ZERO: Self = Self(0);

        pub fn new(zeros: u32) -> Result<Self> {
            if zeros > MAX_DIFFICULTY {
                return Err(ChainError::DifficultyTooHigh {
                    requested: zeros,
                    max: MAX_DIFFICULTY,
                });
            }
            Ok(Self(zeros))
        }

        pub const fn get(self) -> u32 {
            self.0
        }

        /// Zero difficulty accepts the first hash computed.
        pub const fn is_trivial(self) -> bool {
            self.0 == 0
        }

        pub fn prefix(self) -> String {
            "0".repeat(self.0 as usize)
        }
    }

    impl TryFrom<i64> for Difficulty {
        type Error = ChainError;

        fn try_from(value: i64) -> Result<Self> {
            if value < 0 {
                return Err(ChainError::NegativeDifficulty(value));
            }
            let zeros = u32::try_from(value).unwrap_or(u32::MAX);
            Self::new(zeros)
        }
    }

    impl fmt::Display for Difficulty {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    pub fn meets_difficulty(hash: &str, difficulty: Difficulty) -> bool {
        let zeros = difficulty.0 as usize;
        hash.len() >= zeros && hash.bytes().take(zeros).all(|b| b == b'0')
    }
}

/// One entry of the chain.
///
/// A record starts unmined (`nonce == 0`, empty hash). Mining fills in the
/// nonce and hash; after that any change to its fields shows up in
/// [`Chain::is_valid`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Record {
    pub(crate) payload: Payload,
    pub(crate) hash: String,
    pub(crate) previous_hash: String,
    pub(crate) timestamp: Timestamp,
    pub(crate) nonce: u64,
}

static NEVER_CANCELLED: AtomicBool = AtomicBool::new(false);

impl Record {
    pub fn new(payload: Payload, previous_hash: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            payload,
            hash: String::new(),
            previous_hash: previous_hash.into(),
            timestamp,
            nonce: 0,
        }
    }

    /// Root of trust: empty payload, sentinel hashes, never mined.
    pub fn genesis(timestamp: Timestamp) -> Self {
        Self {
            payload: Payload::new(),
            hash: GENESIS_SENTINEL.to_owned(),
            previous_hash: GENESIS_SENTINEL.to_owned(),
            timestamp,
            nonce: 0,
        }
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    pub fn is_mined(&self) -> bool {
        !self.hash.is_empty()
    }

    /// Everything in the preimage except the nonce.
    pub(crate) fn preimage_prefix(&self) -> Result<Vec<u8>> {
        let payload = self.payload.canonical_bytes()?;
        let timestamp = self.timestamp.to_string();
        let mut bytes =
            Vec::with_capacity(self.previous_hash.len() + payload.len() + timestamp.len());
        bytes.extend_from_slice(self.previous_hash.as_bytes());
        bytes.extend_from_slice(&payload);
        bytes.extend_from_slice(timestamp.as_bytes());
        Ok(bytes)
    }

    /// SHA-256 over `previous_hash ‖ payload ‖ timestamp ‖ nonce`, lowercase hex.
    pub fn compute_hash(&self) -> Result<String> {
        let base = Sha256::new_with_prefix(self.preimage_prefix()?);
        Ok(digest_with_nonce(&base, self.nonce))
    }

    pub fn mine(&mut self, difficulty: Difficulty) -> Result<()> {
        self.mine_until(difficulty, &NEVER_CANCELLED)
    }

    /// Like [`Record::mine`], but gives up once `cancel` is set. A cancelled
    /// record is put back into its unmined state.
    pub fn mine_until(&mut self, difficulty: Difficulty, cancel: &AtomicBool) -> Result<()> {
        let base = Sha256::new_with_prefix(self.preimage_prefix()?);
        if difficulty.is_trivial() {
            self.hash = digest_with_nonce(&base, self.nonce);
            return Ok(());
        }

        let start = self.nonce;
        loop {
            if cancel.load(Ordering::Relaxed) {
                self.nonce = start;
                self.hash.clear();
                return Err(ChainError::MiningCancelled);
            }
            self.nonce = self
                .nonce
                .checked_add(1)
                .ok_or(ChainError::NonceSpaceExhausted)?;
            let hash = digest_with_nonce(&base, self.nonce);
            if pow::meets_difficulty(&hash, difficulty) {
                self.hash = hash;
                return Ok(());
            }
        }
    }
}

pub(crate) fn digest_with_nonce(base: &Sha256, nonce: u64) -> String {
    let mut hasher = base.clone();
    hasher.update(nonce.to_string());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXED: Timestamp = Timestamp::from_millis(1_600_000_000_000);

    fn alice_to_bob() -> Record {
        Record::new(Payload::transfer("Alice", "Bob", 5.0), "0", FIXED)
    }

    #[test]
    fn canonical_payload_sorts_keys() {
        let payload = Payload::transfer("Alice", "Bob", 5.0);
        let json = String::from_utf8(payload.canonical_bytes().unwrap()).unwrap();
        assert_eq!(json, r#"{"amount":5.0,"from":"Alice","to":"Bob"}"#);
    }

    #[test]
    fn canonical_payload_independent_of_insert_order() {
        let mut a = Payload::new();
        a.insert("to", "Bob");
        a.insert("memo", true);
        a.insert("from", "Alice");
        let mut b = Payload::new();
        b.insert("from", "Alice");
        b.insert("to", "Bob");
        b.insert("memo", true);
        assert_eq!(a.canonical_bytes().unwrap(), b.canonical_bytes().unwrap());
    }

    #[test]
    fn empty_payload_is_empty_object() {
        assert_eq!(Payload::new().canonical_bytes().unwrap(), b"{}");
    }

    #[test]
    fn non_finite_number_is_rejected() {
        let payload = Payload::transfer("Alice", "Bob", f64::NAN);
        assert!(matches!(
            payload.canonical_bytes(),
            Err(ChainError::Serialization(_))
        ));
        let payload = Payload::transfer("Alice", "Bob", f64::INFINITY);
        assert!(payload.canonical_bytes().is_err());
    }

    #[test]
    fn new_record_is_unmined() {
        let record = alice_to_bob();
        assert_eq!(record.hash(), "");
        assert_eq!(record.nonce(), 0);
        assert!(!record.is_mined());
        assert_eq!(record.timestamp(), FIXED);
    }

    #[test]
    fn compute_hash_known_digest() {
        let record = alice_to_bob();
        assert_eq!(
            record.compute_hash().unwrap(),
            "169b7c3ca206c0c2678683502c76f9835538bcb4a2f6f8fa9f3e4b106445264e"
        );
    }

    #[test]
    fn compute_hash_is_deterministic() {
        let record = alice_to_bob();
        let first = record.compute_hash().unwrap();
        for _ in 0..10 {
            assert_eq!(record.compute_hash().unwrap(), first);
        }
        assert_eq!(first.len(), constants::HASH_HEX_SIZE);
        assert!(first.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
    }

    #[test]
    fn compute_hash_changes_with_each_input() {
        let base = alice_to_bob().compute_hash().unwrap();

        let mut record = alice_to_bob();
        record.nonce += 1;
        assert_ne!(record.compute_hash().unwrap(), base);

        let record = Record::new(Payload::transfer("Alice", "Bob", 5.0), "1", FIXED);
        assert_ne!(record.compute_hash().unwrap(), base);

        let record = Record::new(
            Payload::transfer("Alice", "Bob", 5.0),
            "0",
            Timestamp::from_millis(FIXED.as_millis() + 1),
        );
        assert_ne!(record.compute_hash().unwrap(), base);

        let record = Record::new(Payload::transfer("Alice", "Eve", 5.0), "0", FIXED);
        assert_ne!(record.compute_hash().unwrap(), base);
    }

    #[test]
    fn mine_finds_first_matching_nonce() {
        let mut record = alice_to_bob();
        record.mine(Difficulty::new(2).unwrap()).unwrap();
        assert_eq!(record.nonce(), 259);
        assert_eq!(
            record.hash(),
            "00a4f85d29a6e3b616016bec9e18c977703c3f8bc6a63783317736dec0ea3dbf"
        );

        let mut record = alice_to_bob();
        record.mine(Difficulty::new(3).unwrap()).unwrap();
        assert_eq!(record.nonce(), 4391);
        assert!(record.hash().starts_with("000"));
    }

    #[test]
    fn mine_satisfies_difficulty() {
        for zeros in 0..=4 {
            let difficulty = Difficulty::new(zeros).unwrap();
            let mut record = alice_to_bob();
            record.mine(difficulty).unwrap();
            assert!(record.hash().starts_with(&difficulty.prefix()));
            assert_eq!(record.hash(), record.compute_hash().unwrap());
        }
    }

    #[test]
    fn mine_zero_difficulty_keeps_nonce_zero() {
        let mut record = alice_to_bob();
        record.mine(Difficulty::ZERO).unwrap();
        assert_eq!(record.nonce(), 0);
        assert_eq!(record.hash(), record.compute_hash().unwrap());
        assert!(record.is_mined());
    }

    #[test]
    fn mine_only_touches_nonce_and_hash() {
        let mut record = alice_to_bob();
        let before = record.clone();
        record.mine(Difficulty::new(1).unwrap()).unwrap();
        assert_eq!(record.payload(), before.payload());
        assert_eq!(record.previous_hash(), before.previous_hash());
        assert_eq!(record.timestamp(), before.timestamp());
        assert_eq!(record.nonce(), 18);
    }

    #[test]
    fn mine_non_finite_payload_fails() {
        let mut record = Record::new(Payload::transfer("Alice", "Bob", f64::NAN), "0", FIXED);
        assert!(record.mine(Difficulty::new(1).unwrap()).is_err());
        assert!(!record.is_mined());
    }

    #[test]
    fn cancelled_mining_restores_unmined_state() {
        let cancel = AtomicBool::new(true);
        let mut record = alice_to_bob();
        let err = record
            .mine_until(Difficulty::new(4).unwrap(), &cancel)
            .unwrap_err();
        assert!(matches!(err, ChainError::MiningCancelled));
        assert_eq!(record.nonce(), 0);
        assert!(!record.is_mined());
    }

    #[test]
    fn genesis_uses_sentinels() {
        let genesis = Record::genesis(FIXED);
        assert_eq!(genesis.hash(), constants::GENESIS_SENTINEL);
        assert_eq!(genesis.previous_hash(), constants::GENESIS_SENTINEL);
        assert!(genesis.payload().is_empty());
        assert_eq!(genesis.nonce(), 0);
    }

    #[test]
    fn difficulty_bounds() {
        assert!(Difficulty::new(constants::MAX_DIFFICULTY).is_ok());
        assert!(matches!(
            Difficulty::new(constants::MAX_DIFFICULTY + 1),
            Err(ChainError::DifficultyTooHigh { .. })
        ));
        assert!(matches!(
            Difficulty::try_from(-1i64),
            Err(ChainError::NegativeDifficulty(-1))
        ));
        assert!(Difficulty::try_from(i64::MAX).is_err());
        assert_eq!(Difficulty::try_from(3i64).unwrap().get(), 3);
    }

    #[test]
    fn meets_difficulty_examples() {
        let two = Difficulty::new(2).unwrap();
        assert!(pow::meets_difficulty("00ab", two));
        assert!(!pow::meets_difficulty("0a0b", two));
        assert!(!pow::meets_difficulty("0", two));
        assert!(pow::meets_difficulty("", Difficulty::ZERO));
    }

    #[test]
    fn payload_display() {
        let payload = Payload::transfer("Alice", "Bob", 5.0);
        assert_eq!(payload.to_string(), "{amount: 5, from: Alice, to: Bob}");
    }

    #[test]
    fn record_serialization_example() {
        let mut record = alice_to_bob();
        record.mine(Difficulty::new(1).unwrap()).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["nonce"], 18);
        assert_eq!(json["timestamp"], 1_600_000_000_000u64);
        assert_eq!(json["payload"]["from"], "Alice");
        assert_eq!(json["payload"]["amount"], 5.0);
    }
}
