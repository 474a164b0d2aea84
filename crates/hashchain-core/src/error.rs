use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChainError {
    #[error("payload cannot be canonically serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("difficulty {requested} exceeds the maximum of {max}")]
    DifficultyTooHigh { requested: u32, max: u32 },

    #[error("difficulty must be non-negative, got {0}")]
    NegativeDifficulty(i64),

    #[error("mining was cancelled before a valid nonce was found")]
    MiningCancelled,

    #[error("nonce space exhausted without meeting the difficulty")]
    NonceSpaceExhausted,

    #[error("chain lock poisoned by a panicked writer")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, ChainError>;
