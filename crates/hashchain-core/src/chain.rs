use crate::{
    error::Result,
    mine::Strategy,
    pow::Difficulty,
    Payload, Record, Timestamp,
};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::AtomicBool;
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViolationKind {
    /// Stored hash no longer matches the record's fields.
    HashMismatch,
    /// `previous_hash` does not point at the preceding record.
    BrokenLink,
}

/// First place where validation failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Violation {
    pub index: usize,
    pub kind: ViolationKind,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ViolationKind::HashMismatch => {
                write!(f, "record {} hash does not match its contents", self.index)
            }
            ViolationKind::BrokenLink => write!(
                f,
                "record {} is not linked to record {}",
                self.index,
                self.index - 1
            ),
        }
    }
}

/// Ordered, append-only sequence of records with a fixed mining difficulty.
///
/// Index 0 is always the genesis record, so the chain is never empty.
#[derive(Clone, Debug, Serialize)]
pub struct Chain {
    records: Vec<Record>,
    difficulty: Difficulty,
}

impl Chain {
    /// Creates a chain holding only the genesis record.
    pub fn new(difficulty: u32) -> Result<Self> {
        Ok(Self::with_difficulty(Difficulty::new(difficulty)?))
    }

    pub fn with_difficulty(difficulty: Difficulty) -> Self {
        let genesis = Record::genesis(Timestamp::now());
        debug!("Created genesis record at {} with difficulty {}", genesis.timestamp, difficulty);
        Self {
            records: vec![genesis],
            difficulty,
        }
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Always false; kept alongside `len`.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn genesis(&self) -> &Record {
        &self.records[0]
    }

    pub fn tip(&self) -> &Record {
        &self.records[self.records.len() - 1]
    }

    /// Mines a `{from, to, amount}` record onto the tail. Blocks until a
    /// valid nonce is found.
    pub fn append(&mut self, from: &str, to: &str, amount: f64) -> Result<&Record> {
        self.append_payload(Payload::transfer(from, to, amount))
    }

    pub fn append_payload(&mut self, payload: Payload) -> Result<&Record> {
        self.append_with(payload, Strategy::Sequential, &AtomicBool::new(false))
    }

    pub fn append_parallel(&mut self, from: &str, to: &str, amount: f64) -> Result<&Record> {
        self.append_with(
            Payload::transfer(from, to, amount),
            Strategy::Parallel,
            &AtomicBool::new(false),
        )
    }

    pub fn append_cancellable(
        &mut self,
        from: &str,
        to: &str,
        amount: f64,
        cancel: &AtomicBool,
    ) -> Result<&Record> {
        self.append_with(Payload::transfer(from, to, amount), Strategy::Sequential, cancel)
    }

    /// Nothing is pushed unless mining succeeds.
    pub fn append_with(
        &mut self,
        payload: Payload,
        strategy: Strategy,
        cancel: &AtomicBool,
    ) -> Result<&Record> {
        let mut record = Record::new(payload, self.tip().hash.clone(), Timestamp::now());
        strategy.mine(&mut record, self.difficulty, cancel)?;

        info!(
            "Mined record {} with nonce {} and hash {}",
            self.records.len(),
            record.nonce,
            record.hash
        );
        self.records.push(record);
        Ok(self.tip())
    }

    pub fn is_valid(&self) -> bool {
        self.first_violation().is_none()
    }

    /// Walks adjacent pairs from index 1 and returns the first record whose
    /// hash or link fails to check out. Genesis itself is not re-hashed.
    pub fn first_violation(&self) -> Option<Violation> {
        let violation = self
            .records
            .windows(2)
            .enumerate()
            .find_map(|(i, pair)| {
                let (prev, cur) = (&pair[0], &pair[1]);
                let index = i + 1;
                let hash_matches = cur
                    .compute_hash()
                    .map(|hash| hash == cur.hash)
                    .unwrap_or(false);
                if !hash_matches {
                    return Some(Violation {
                        index,
                        kind: ViolationKind::HashMismatch,
                    });
                }
                if cur.previous_hash != prev.hash {
                    return Some(Violation {
                        index,
                        kind: ViolationKind::BrokenLink,
                    });
                }
                None
            });

        if let Some(violation) = violation {
            warn!("Chain validation failed: {}", violation);
        }
        violation
    }
}
