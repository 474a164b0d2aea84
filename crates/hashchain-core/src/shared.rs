use crate::{
    chain::Chain,
    error::{ChainError, Result},
    mine::Strategy,
    Payload, Record,
};
use std::sync::{atomic::AtomicBool, Arc, Mutex, MutexGuard};

/// Clonable handle for appending to one chain from several threads.
///
/// The lock is held from reading the tail through mining to the push, so
/// appends are strictly serialized and each one links to the previous winner.
#[derive(Clone, Debug)]
pub struct SharedChain {
    inner: Arc<Mutex<Chain>>,
}

impl SharedChain {
    pub fn new(chain: Chain) -> Self {
        Self {
            inner: Arc::new(Mutex::new(chain)),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Chain>> {
        self.inner.lock().map_err(|_| ChainError::LockPoisoned)
    }

    pub fn append(&self, from: &str, to: &str, amount: f64) -> Result<Record> {
        self.lock()?.append(from, to, amount).cloned()
    }

    pub fn append_parallel(&self, from: &str, to: &str, amount: f64) -> Result<Record> {
        self.lock()?.append_parallel(from, to, amount).cloned()
    }

    pub fn append_cancellable(
        &self,
        from: &str,
        to: &str,
        amount: f64,
        cancel: &AtomicBool,
    ) -> Result<Record> {
        self.lock()?
            .append_cancellable(from, to, amount, cancel)
            .cloned()
    }

    pub fn append_with(
        &self,
        payload: Payload,
        strategy: Strategy,
        cancel: &AtomicBool,
    ) -> Result<Record> {
        self.lock()?.append_with(payload, strategy, cancel).cloned()
    }

    pub fn is_valid(&self) -> Result<bool> {
        Ok(self.lock()?.is_valid())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    /// Point-in-time copy of the whole chain.
    pub fn snapshot(&self) -> Result<Chain> {
        Ok(self.lock()?.clone())
    }
}

impl From<Chain> for SharedChain {
    fn from(chain: Chain) -> Self {
        Self::new(chain)
    }
}
