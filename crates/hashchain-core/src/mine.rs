use crate::{
    digest_with_nonce,
    error::{ChainError, Result},
    pow::{meets_difficulty, Difficulty},
    Record,
};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// How a record's nonce search is carried out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Strategy {
    /// Single thread, nonces tried in increasing order.
    #[default]
    Sequential,
    /// Disjoint nonce ranges searched across the rayon pool.
    Parallel,
}

impl Strategy {
    pub fn mine(self, record: &mut Record, difficulty: Difficulty, cancel: &AtomicBool) -> Result<()> {
        match self {
            Strategy::Sequential => record.mine_until(difficulty, cancel),
            Strategy::Parallel => mine_parallel_until(record, difficulty, cancel),
        }
    }
}

/// Searches nonces in parallel until a hash with the required prefix is found.
/// Any satisfying nonce may win, not necessarily the smallest one; all other
/// attempts are dropped.
pub fn mine_parallel(record: &mut Record, difficulty: Difficulty) -> Result<()> {
    mine_parallel_until(record, difficulty, &AtomicBool::new(false))
}

pub fn mine_parallel_until(
    record: &mut Record,
    difficulty: Difficulty,
    cancel: &AtomicBool,
) -> Result<()> {
    // Only the nonce varies per attempt.
    let base = Sha256::new_with_prefix(record.preimage_prefix()?);

    if difficulty.is_trivial() {
        record.hash = digest_with_nonce(&base, record.nonce);
        return Ok(());
    }

    let start = record
        .nonce
        .checked_add(1)
        .ok_or(ChainError::NonceSpaceExhausted)?;

    // Workers also stop on cancel; the flag is re-checked below to tell the
    // two outcomes apart.
    let found = (start..u64::MAX)
        .into_par_iter()
        .map(|nonce| (nonce, digest_with_nonce(&base, nonce)))
        .find_any(|(_, hash)| cancel.load(Ordering::Relaxed) || meets_difficulty(hash, difficulty));

    match found {
        Some((nonce, hash)) if meets_difficulty(&hash, difficulty) => {
            debug!("Found nonce {} with hash {} in parallel", nonce, hash);
            record.nonce = nonce;
            record.hash = hash;
            Ok(())
        }
        Some(_) => Err(ChainError::MiningCancelled),
        None => Err(ChainError::NonceSpaceExhausted),
    }
}
