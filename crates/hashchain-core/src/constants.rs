pub const HASH_SIZE: usize = 32;
pub const HASH_HEX_SIZE: usize = HASH_SIZE * 2;
/// Stored as both the previous hash and the hash of the genesis record.
pub const GENESIS_SENTINEL: &str = "0";
pub const DEFAULT_DIFFICULTY: u32 = 2;
/// Each extra hex zero multiplies the expected work by 16, so anything past
/// this is rejected at construction.
pub const MAX_DIFFICULTY: u32 = 8;
pub const FROM_FIELD: &str = "from";
pub const TO_FIELD: &str = "to";
pub const AMOUNT_FIELD: &str = "amount";
